//! 摄像头输入模块
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use std::time::Duration;

use crossbeam_channel::Sender;
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use tracing::{error, info, warn};

use super::decode_filter::{CapturedFrame, DecodeFilter};
use crate::error::{Error, Result};

const MAX_RETRIES: usize = 3;

/// 摄像头参数
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device_index: usize,
    /// Windows dshow 需要设备名称; 为空时按索引查询
    pub device_name: Option<String>,
    /// 输入格式, 为空时按平台选择
    pub format: Option<String>,
    /// 例如 "1280x720"; 为空时由驱动协商
    pub video_size: Option<String>,
    pub framerate: u32,
}

/// 摄像头解码器
pub struct CameraDecoder {
    config: CameraConfig,
}

impl CameraDecoder {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    /// 启动摄像头解码 (阻塞, 在采集线程中调用)
    ///
    /// 返回时 `tx` 被丢弃, 处理线程随之结束
    pub fn run(&self, tx: Sender<CapturedFrame>) -> Result<()> {
        let name = match &self.config.device_name {
            Some(name) => name.clone(),
            None => get_camera_devices()
                .into_iter()
                .find(|(index, _)| *index == self.config.device_index)
                .map(|(_, name)| name)
                .unwrap_or_default(),
        };
        let url = format_camera_url(self.config.device_index, &name);
        let format = self
            .config
            .format
            .clone()
            .unwrap_or_else(|| default_format().to_string());

        info!(
            "📷 摄像头: [{}] {} | 格式: {} | URL: {}",
            self.config.device_index, name, format, url
        );

        let filter = DecodeFilter::new(tx);
        let mut retry_count = 0;
        loop {
            match self.decode(&url, &format, filter.clone()) {
                Ok(()) => {
                    info!("📹 摄像头解码循环结束");
                    return Ok(());
                }
                // 处理线程已退出, 摄像头本身正常
                Err(_) if filter.is_closed() => {
                    info!("📹 帧队列已关闭, 停止采集");
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        error!("❌ 摄像头打开失败 (重试{}次): {}", MAX_RETRIES, e);
                        return Err(e);
                    }
                    warn!(
                        "⚠️ 摄像头忙或无法打开, 1秒后重试... ({}/{}): {}",
                        retry_count, MAX_RETRIES, e
                    );
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }

    fn decode(&self, url: &str, format: &str, filter: DecodeFilter) -> Result<()> {
        // 构建帧处理管线
        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("capture", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let framerate = self.config.framerate.to_string();
        let mut opts = vec![("framerate", framerate.as_str())];
        if let Some(size) = &self.config.video_size {
            opts.push(("video_size", size.as_str()));
        }
        let input = Input::new(url)
            .set_format(format)
            .set_input_opts(opts.into_iter().collect());

        let ctx = FfmpegContext::builder()
            .input(input)
            .filter_descs(["format=rgb24"].into())
            .output(out)
            .build()
            .map_err(|e| Error::Camera(format!("构建失败: {}", e)))?;

        let sch = ctx
            .start()
            .map_err(|e| Error::Camera(format!("启动失败: {}", e)))?;
        info!("✅ 摄像头连接成功,开始解码!");

        sch.wait()
            .map_err(|e| Error::Camera(format!("解码中断: {}", e)))
    }
}

/// 平台默认采集格式
pub fn default_format() -> &'static str {
    if cfg!(target_os = "windows") {
        "dshow"
    } else if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "v4l2"
    }
}

/// 格式化摄像头URL - 根据平台选择
pub fn format_camera_url(index: usize, name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("video={}", name)
    } else if cfg!(target_os = "macos") {
        format!("{}", index)
    } else {
        format!("/dev/video{}", index)
    }
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
