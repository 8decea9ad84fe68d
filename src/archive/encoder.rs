/// 视频片段编码
/// Encodes captured frames into an MP4 container (MPEG-4 Part 2 / mp4v)
use std::path::{Path, PathBuf};

use ez_ffmpeg::{FfmpegContext, Input, Output};
use image::{ImageFormat, RgbImage};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// 帧序列 → 视频文件
pub trait ClipEncoder: Send + Sync {
    fn encode(&self, frames: &[RgbImage], fps: u32, path: &Path) -> Result<()>;
}

/// 基于 FFmpeg 的编码器
///
/// 先把帧写成 JPEG 序列, 再用 image2 输入编码为 mp4, 最后删除中间文件
#[derive(Debug, Clone)]
pub struct FfmpegClipEncoder {
    codec: String,
}

impl Default for FfmpegClipEncoder {
    fn default() -> Self {
        Self {
            codec: "mpeg4".to_string(),
        }
    }
}

impl FfmpegClipEncoder {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
        }
    }

    fn staging_dir(path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "clip".to_string());
        path.with_file_name(format!(".{}.frames", stem))
    }

    fn mux(&self, pattern: &str, fps: u32, path: &Path) -> Result<()> {
        let framerate = fps.to_string();
        let input = Input::new(pattern)
            .set_format("image2")
            .set_input_opts([("framerate", framerate.as_str())].into());
        let out_path = path.to_string_lossy().to_string();
        let output = Output::from(out_path.as_str()).set_video_codec(self.codec.as_str());

        let sch = FfmpegContext::builder()
            .input(input)
            .output(output)
            .build()
            .map_err(|e| Error::Encode(format!("构建失败: {}", e)))?
            .start()
            .map_err(|e| Error::Encode(format!("启动失败: {}", e)))?;
        sch.wait()
            .map_err(|e| Error::Encode(format!("编码失败: {}", e)))
    }
}

impl ClipEncoder for FfmpegClipEncoder {
    fn encode(&self, frames: &[RgbImage], fps: u32, path: &Path) -> Result<()> {
        if frames.is_empty() {
            return Err(Error::Encode("no frames to encode".to_string()));
        }

        let staging = Self::staging_dir(path);
        std::fs::create_dir_all(&staging)?;
        for (i, frame) in frames.iter().enumerate() {
            frame.save_with_format(staging.join(format!("frame_{:04}.jpg", i)), ImageFormat::Jpeg)?;
        }
        debug!("🎞️ {} 帧写入 {}", frames.len(), staging.display());

        let pattern = staging.join("frame_%04d.jpg");
        let result = self.mux(&pattern.to_string_lossy(), fps, path);
        finish(result, std::fs::remove_dir_all(&staging), &staging)
    }
}

/// 清理中间文件失败只记录日志, 以编码结果为准
fn finish(result: Result<()>, cleanup: std::io::Result<()>, staging: &Path) -> Result<()> {
    if let Err(e) = cleanup {
        warn!("⚠️ 中间帧目录清理失败 {}: {}", staging.display(), e);
    }
    result
}
