/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: decoded RGB24 frame → CapturedFrame → frame channel
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

/// 采集到的一帧 (采集线程 → 处理线程)
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub frame_id: u64,
    pub image: RgbImage,
}

/// 解码过滤器: 滤镜链已输出 rgb24, 这里只做去步长拷贝与投递
#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<CapturedFrame>,
    closed: Arc<AtomicBool>,
    next_id: u64,
    count: usize,
    last: Instant,
    pub current_fps: f64,
    pub dropped_frames: usize, // 队列满或损坏而丢弃
    pub total_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<CapturedFrame>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            next_id: 0,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    /// 接收端已断开 (克隆之间共享)
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn deliver(&mut self, captured: CapturedFrame) -> Result<(), String> {
        match self.tx.try_send(captured) {
            Ok(()) => Ok(()),
            // 处理线程跟不上时丢帧, 保证处理的总是较新的画面
            Err(TrySendError::Full(_)) => {
                self.dropped_frames += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.closed.store(true, Ordering::Release);
                warn!("🛑 处理线程已退出, 停止采集");
                Err("frame channel closed".to_string())
            }
        }
    }

    fn report_fps(&mut self) {
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed < 5.0 {
            return;
        }
        self.current_fps = self.count as f64 / elapsed;
        let drop_rate = self.dropped_frames as f64 / self.total_frames.max(1) as f64 * 100.0;
        debug!(
            "📺 采集统计: {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
            self.current_fps, self.total_frames, self.dropped_frames, drop_rate
        );
        self.last = Instant::now();
        self.count = 0;
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 摄像头解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;

        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let (w, h) = (raw.width, raw.height);
            let stride = raw.linesize[0];
            let data = raw.data[0];
            if w <= 0 || h <= 0 || data.is_null() || stride < w * 3 {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let (w, h, stride) = (w as usize, h as usize, stride as usize);
            let len = stride * (h - 1) + w * 3;
            let plane = std::slice::from_raw_parts(data, len);
            RgbImage::from_raw(w as u32, h as u32, pack_rgb_rows(plane, stride, w, h))
        };

        let Some(image) = image else {
            self.dropped_frames += 1;
            return Ok(None);
        };

        let captured = CapturedFrame {
            frame_id: self.next_id,
            image,
        };
        self.next_id += 1;
        self.count += 1;

        self.deliver(captured)?;
        self.report_fps();
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!("✅ 摄像头解码线程退出");
    }
}

/// 去掉行尾填充, 得到紧凑的 RGB24 数据
pub fn pack_rgb_rows(plane: &[u8], stride: usize, width: usize, height: usize) -> Vec<u8> {
    let row_bytes = width * 3;
    let mut out = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let start = y * stride;
        out.extend_from_slice(&plane[start..start + row_bytes]);
    }
    out
}
