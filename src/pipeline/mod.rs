/// 帧处理流水线 (Frame processing loop)
///
/// 采集线程 → 帧队列 → 处理线程:
/// 1. 事故模型检测, 最高置信度与阈值比较
/// 2. 新事故: 继续采集片段帧, 交给归档任务
/// 3. 事故持续: 车辆计数 → 预计疏通时间 → 重置倒计时
/// 4. 倒计时归零则清除事故
/// 5. 画框 + JPEG 编码, 发布为最新视频帧
pub mod annotate;

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::{DynamicImage, RgbImage};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::archive::ClipJob;
use crate::detection::{estimate_wait_minutes, AccidentDetector, Bbox, VehicleCounter};
use crate::error::Result;
use crate::incident::{GeoPoint, SharedIncident};
use crate::input::CapturedFrame;

/// 最新的 JPEG 帧 (None 表示尚未有画面)
pub type FrameSender = watch::Sender<Option<Bytes>>;
pub type FrameReceiver = watch::Receiver<Option<Bytes>>;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 事故位置 (固定摄像头位置)
    pub location: GeoPoint,
    /// 片段总帧数, 含触发帧
    pub clip_frames: usize,
    /// 采集片段时每帧最长等待
    pub frame_timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            location: GeoPoint::new(24.7136, 46.6753),
            clip_frames: 100,
            frame_timeout: Duration::from_secs(1),
            jpeg_quality: 80,
        }
    }
}

pub struct FrameProcessor {
    accident: AccidentDetector,
    counter: VehicleCounter,
    incident: SharedIncident,
    config: PipelineConfig,
    clips: mpsc::Sender<ClipJob>,
    stream: FrameSender,

    // 统计
    count: u64,
    last: Instant,
}

impl FrameProcessor {
    pub fn new(
        accident: AccidentDetector,
        counter: VehicleCounter,
        incident: SharedIncident,
        config: PipelineConfig,
        clips: mpsc::Sender<ClipJob>,
        stream: FrameSender,
    ) -> Self {
        Self {
            accident,
            counter,
            incident,
            config,
            clips,
            stream,
            count: 0,
            last: Instant::now(),
        }
    }

    /// 处理循环; 帧队列断开 (采集线程退出) 后返回
    pub fn run(mut self, rx: Receiver<CapturedFrame>) {
        info!("🔍 处理线程启动 (阈值 {:.2})", self.accident.threshold());
        while let Ok(frame) = rx.recv() {
            let frame_id = frame.frame_id;
            if let Err(e) = self.process(frame, &rx) {
                warn!("⚠️ 帧 #{} 处理失败: {}", frame_id, e);
            }
            self.report_fps();
        }
        info!("处理线程退出: 帧队列已关闭");
    }

    pub fn process(&mut self, frame: CapturedFrame, rx: &Receiver<CapturedFrame>) -> Result<()> {
        let mut current = DynamicImage::ImageRgb8(frame.image);
        let detections = self.accident.detect(&current)?;
        let threshold = self.accident.threshold();
        let mut marked: Vec<Bbox> = detections
            .bboxes()
            .iter()
            .filter(|b| b.confidence() > threshold)
            .cloned()
            .collect();

        if self.accident.is_accident(&detections) {
            // 倒计时与事件在同一次加锁中建立, 活动事件不会出现 0:00
            let minutes = self.estimate_wait(&current)?;
            let began = {
                let mut incident = self.incident.lock();
                let began = incident.begin(self.config.location, Local::now());
                incident.refresh(minutes);
                began
            };

            if began {
                warn!(
                    "🚨 检测到事故: 帧 #{} 置信度 {:.2}",
                    frame.frame_id,
                    detections.max_confidence().unwrap_or_default()
                );
                let clip = self.capture_clip(current.to_rgb8(), rx);
                let latest = match clip.last() {
                    Some(last) if clip.len() > 1 => Some(last.clone()),
                    _ => None,
                };
                self.submit_clip(clip);

                // 片段结束时按最新画面重新计数
                if let Some(latest) = latest {
                    current = DynamicImage::ImageRgb8(latest);
                    marked.clear();
                    let minutes = self.estimate_wait(&current)?;
                    self.incident.lock().refresh(minutes);
                }
            }
        }

        if self.incident.lock().expire_if_elapsed() {
            info!("✅ 事故倒计时结束, 状态已清除");
        }

        let mut image = current.into_rgb8();
        annotate::draw_boxes(&mut image, &marked);
        let jpeg = annotate::encode_jpeg(&image, self.config.jpeg_quality)?;
        self.stream.send_replace(Some(Bytes::from(jpeg)));
        Ok(())
    }

    fn estimate_wait(&mut self, image: &DynamicImage) -> Result<u32> {
        let vehicles = self.counter.count(image)?;
        let minutes = estimate_wait_minutes(vehicles);
        debug!("🚗 车辆数 {} → 预计 {} 分钟", vehicles, minutes);
        Ok(minutes)
    }

    /// 触发帧之后再读 clip_frames - 1 次; 超时的读取跳过, 队列断开则提前结束
    fn capture_clip(&self, first: RgbImage, rx: &Receiver<CapturedFrame>) -> Vec<RgbImage> {
        let mut frames = Vec::with_capacity(self.config.clip_frames.max(1));
        frames.push(first);
        for _ in 1..self.config.clip_frames {
            match rx.recv_timeout(self.config.frame_timeout) {
                Ok(frame) => frames.push(frame.image),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        frames
    }

    fn submit_clip(&self, frames: Vec<RgbImage>) {
        let job = ClipJob {
            frames,
            location: Some(self.config.location),
            captured_at: Local::now(),
        };
        if let Err(e) = self.clips.blocking_send(job) {
            error!("❌ 归档队列已关闭, 片段丢弃 ({}帧)", e.0.frames.len());
        }
    }

    fn report_fps(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 5.0 {
            debug!("⚡ 处理速度: {:.1}fps", self.count as f64 / elapsed);
            self.count = 0;
            self.last = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionResult, ObjectDetector};
    use std::collections::VecDeque;

    /// 依次返回预设的置信度; 用完后返回空结果
    struct Scripted(VecDeque<Vec<f32>>);

    impl ObjectDetector for Scripted {
        fn detect(&mut self, _image: &DynamicImage) -> Result<DetectionResult> {
            let confs = self.0.pop_front().unwrap_or_default();
            Ok(DetectionResult::new(
                confs
                    .into_iter()
                    .map(|c| Bbox::new(1., 1., 4., 4., 0, c))
                    .collect(),
            ))
        }
    }

    struct Cars(usize);

    impl ObjectDetector for Cars {
        fn detect(&mut self, _image: &DynamicImage) -> Result<DetectionResult> {
            Ok(DetectionResult::new(vec![Bbox::default(); self.0]))
        }
    }

    struct Harness {
        processor: FrameProcessor,
        incident: SharedIncident,
        clips: mpsc::Receiver<ClipJob>,
        stream: FrameReceiver,
    }

    fn harness(script: Vec<Vec<f32>>, cars: usize, clip_frames: usize) -> Harness {
        let accident = AccidentDetector::new(Box::new(Scripted(script.into())), 0.5);
        let counter = VehicleCounter::new(Box::new(Cars(cars)));
        let incident = SharedIncident::new();
        let (clip_tx, clips) = mpsc::channel(4);
        let (frame_tx, stream) = watch::channel(None);
        let config = PipelineConfig {
            clip_frames,
            frame_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let processor =
            FrameProcessor::new(accident, counter, incident.clone(), config, clip_tx, frame_tx);
        Harness {
            processor,
            incident,
            clips,
            stream,
        }
    }

    fn frame(id: u64) -> CapturedFrame {
        CapturedFrame {
            frame_id: id,
            image: RgbImage::new(16, 16),
        }
    }

    #[test]
    fn test_quiet_frame_only_streams() {
        let mut h = harness(vec![vec![0.3]], 0, 5);
        let (_tx, rx) = crossbeam_channel::bounded(4);

        h.processor.process(frame(0), &rx).unwrap();

        assert!(!h.incident.snapshot().active);
        assert!(h.clips.try_recv().is_err());
        let jpeg = h.stream.borrow().clone().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_accident_starts_event_and_captures_clip() {
        let mut h = harness(vec![vec![0.2, 0.9]], 12, 5);
        let (tx, rx) = crossbeam_channel::bounded(8);
        for id in 1..=4 {
            tx.send(frame(id)).unwrap();
        }

        h.processor.process(frame(0), &rx).unwrap();

        let state = h.incident.snapshot();
        assert!(state.active);
        assert_eq!(state.location, Some(GeoPoint::new(24.7136, 46.6753)));
        assert_eq!(state.wait_minutes, 10);
        assert_eq!(state.remaining_secs, 600);

        let job = h.clips.try_recv().unwrap();
        assert_eq!(job.frames.len(), 5);
        assert_eq!(job.location, state.location);
        assert!(rx.is_empty());
        assert!(h.stream.borrow().is_some());
    }

    #[test]
    fn test_countdown_set_while_clip_is_captured() {
        let mut h = harness(vec![vec![0.9]], 3, 5);
        h.processor.config.frame_timeout = Duration::from_millis(150);
        let (_tx, rx) = crossbeam_channel::bounded(4);

        // 片段采集期间 (约 600ms) 另一线程读取状态
        let incident = h.incident.clone();
        let observer = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..20 {
                let state = incident.snapshot();
                if state.active {
                    seen.push(state.remaining_secs);
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            seen
        });

        h.processor.process(frame(0), &rx).unwrap();
        let seen = observer.join().unwrap();

        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&secs| secs == 300));
        assert_eq!(h.clips.try_recv().unwrap().frames.len(), 1);
    }

    #[test]
    fn test_clip_skips_missing_frames() {
        let mut h = harness(vec![vec![0.8]], 0, 5);
        let (tx, rx) = crossbeam_channel::bounded(8);
        tx.send(frame(1)).unwrap();

        h.processor.process(frame(0), &rx).unwrap();
        // 队列仍连接: 其余读取超时后跳过
        assert_eq!(h.clips.try_recv().unwrap().frames.len(), 2);

        drop(tx);
        let mut h = harness(vec![vec![0.8]], 0, 5);
        h.processor.process(frame(0), &rx).unwrap();
        assert_eq!(h.clips.try_recv().unwrap().frames.len(), 1);
    }

    #[test]
    fn test_ongoing_accident_refreshes_without_new_clip() {
        let mut h = harness(vec![vec![0.9], vec![0.7]], 25, 1);
        let (_tx, rx) = crossbeam_channel::bounded(4);

        h.processor.process(frame(0), &rx).unwrap();
        let started = h.incident.snapshot().started_at;
        assert!(h.clips.try_recv().is_ok());

        h.incident.lock().remaining_secs = 7;
        h.processor.process(frame(1), &rx).unwrap();

        let state = h.incident.snapshot();
        assert_eq!(state.started_at, started);
        assert_eq!(state.wait_minutes, 15);
        assert_eq!(state.remaining_secs, 900);
        assert!(h.clips.try_recv().is_err());
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut h = harness(vec![vec![0.5]], 0, 1);
        let (_tx, rx) = crossbeam_channel::bounded(4);
        h.processor.process(frame(0), &rx).unwrap();
        assert!(!h.incident.snapshot().active);
    }

    #[test]
    fn test_elapsed_event_is_cleared() {
        let mut h = harness(vec![vec![0.9], vec![]], 3, 1);
        let (_tx, rx) = crossbeam_channel::bounded(4);

        h.processor.process(frame(0), &rx).unwrap();
        assert!(h.incident.snapshot().active);

        h.incident.lock().remaining_secs = 0;
        h.processor.process(frame(1), &rx).unwrap();
        assert!(!h.incident.snapshot().active);
        assert_eq!(h.incident.snapshot().location, None);
    }

    #[test]
    fn test_run_stops_when_camera_disconnects() {
        let h = harness(vec![vec![0.1], vec![0.1]], 0, 1);
        let stream = h.stream.clone();
        let (tx, rx) = crossbeam_channel::bounded(4);
        tx.send(frame(0)).unwrap();
        tx.send(frame(1)).unwrap();
        drop(tx);

        h.processor.run(rx);
        assert!(stream.borrow().is_some());
    }
}
