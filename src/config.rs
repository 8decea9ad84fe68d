/// 运行参数 (命令行 / 环境变量)
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};
use crate::incident::GeoPoint;
use crate::input::CameraConfig;
use crate::models::YOLOv8Config;
use crate::pipeline::PipelineConfig;
use crate::OrtEP;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Nabeeh - 道路事故监测", long_about = None)]
pub struct Args {
    /// HTTP 监听地址
    #[arg(long, env = "NABEEH_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// 摄像头索引
    #[arg(long, env = "NABEEH_CAMERA", default_value_t = 0)]
    pub camera: usize,

    /// 摄像头设备名称 (Windows dshow)
    #[arg(long, env = "NABEEH_CAMERA_NAME")]
    pub camera_name: Option<String>,

    /// 输入格式 (dshow / avfoundation / v4l2)
    #[arg(long)]
    pub camera_format: Option<String>,

    /// 采集分辨率, 例如 1280x720
    #[arg(long)]
    pub video_size: Option<String>,

    #[arg(long, default_value_t = 30)]
    pub framerate: u32,

    /// 事故检测模型
    #[arg(long, env = "NABEEH_ACCIDENT_MODEL", default_value = "models/bestlast.onnx")]
    pub accident_model: PathBuf,

    /// 车辆计数模型
    #[arg(long, env = "NABEEH_COUNT_MODEL", default_value = "models/count.onnx")]
    pub count_model: PathBuf,

    /// 事故判定阈值 (置信度严格大于该值)
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,

    /// 模型输出框的最低置信度
    #[arg(long, default_value_t = 0.25)]
    pub conf: f32,

    #[arg(long, default_value_t = 0.45)]
    pub iou: f32,

    /// 模型输入尺寸 (为空时读取模型)
    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    /// CUDA 推理
    #[arg(long)]
    pub cuda: bool,

    /// TensorRT 推理
    #[arg(long)]
    pub trt: bool,

    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 事故片段帧数 (含触发帧)
    #[arg(long, default_value_t = 100)]
    pub clip_frames: usize,

    #[arg(long, default_value_t = 20)]
    pub clip_fps: u32,

    #[arg(long, env = "NABEEH_CLIP_DIR", default_value = "accident_videos")]
    pub clip_dir: PathBuf,

    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    #[arg(long, env = "NABEEH_DATABASE", default_value = "accident_db1")]
    pub database: String,

    /// Google Maps API Key
    #[arg(long, env = "GOOGLE_MAPS_API_KEY", default_value = "", hide_env_values = true)]
    pub maps_api_key: String,

    /// 摄像头位置 (纬度)
    #[arg(long, default_value_t = 24.7136, allow_negative_numbers = true)]
    pub lat: f64,

    /// 摄像头位置 (经度)
    #[arg(long, default_value_t = 46.6753, allow_negative_numbers = true)]
    pub lng: f64,

    /// 倒计时周期 (毫秒)
    #[arg(long, default_value_t = 1000)]
    pub countdown_ms: u64,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        let ratios = [
            ("threshold", self.threshold),
            ("conf", self.conf),
            ("iou", self.iou),
        ];
        for (name, value) in ratios {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::Config(format!("{} 必须在 (0, 1) 之间: {}", name, value)));
            }
        }
        // conf 是模型输出框的下限, 不能高于事故阈值
        if self.conf > self.threshold {
            return Err(Error::Config(format!(
                "conf ({}) 不能大于事故阈值 threshold ({})",
                self.conf, self.threshold
            )));
        }
        if self.clip_frames == 0 {
            return Err(Error::Config("clip_frames 不能为 0".to_string()));
        }
        if self.clip_fps == 0 || self.framerate == 0 {
            return Err(Error::Config("帧率不能为 0".to_string()));
        }
        if self.countdown_ms == 0 {
            return Err(Error::Config("countdown_ms 不能为 0".to_string()));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::Config(format!("坐标无效: ({}, {})", self.lat, self.lng)));
        }
        Ok(())
    }

    pub fn ep(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    pub fn accident_model_config(&self) -> YOLOv8Config {
        self.model_config(&self.accident_model)
    }

    pub fn count_model_config(&self) -> YOLOv8Config {
        self.model_config(&self.count_model)
    }

    fn model_config(&self, path: &std::path::Path) -> YOLOv8Config {
        YOLOv8Config {
            model: path.to_string_lossy().to_string(),
            ep: self.ep(),
            width: self.width,
            height: self.height,
            conf: self.conf,
            iou: self.iou,
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device_index: self.camera,
            device_name: self.camera_name.clone(),
            format: self.camera_format.clone(),
            video_size: self.video_size.clone(),
            framerate: self.framerate,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            location: self.location(),
            clip_frames: self.clip_frames,
            ..Default::default()
        }
    }

    pub fn countdown_period(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["nabeeh"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.threshold, 0.5);
        assert_eq!(args.clip_frames, 100);
        assert_eq!(args.clip_fps, 20);
        assert_eq!(args.clip_dir, PathBuf::from("accident_videos"));
        assert_eq!(args.location(), GeoPoint::new(24.7136, 46.6753));
        assert_eq!(args.countdown_period(), Duration::from_secs(1));
        assert!(matches!(args.ep(), OrtEP::CPU));
    }

    #[test]
    fn test_execution_provider() {
        assert!(matches!(parse(&["--cuda", "--device-id", "1"]).ep(), OrtEP::CUDA(1)));
        assert!(matches!(parse(&["--cuda", "--trt"]).ep(), OrtEP::Trt(0)));
    }

    #[test]
    fn test_model_configs() {
        let args = parse(&["--count-model", "m/cars.onnx", "--width", "640"]);
        let count = args.count_model_config();
        assert_eq!(count.model, "m/cars.onnx");
        assert_eq!(count.width, Some(640));
        assert_eq!(count.height, None);
        assert_eq!(args.accident_model_config().model, "models/bestlast.onnx");
    }

    #[test]
    fn test_validate_conf_not_above_threshold() {
        assert!(parse(&["--conf", "0.6"]).validate().is_err());
        assert!(parse(&["--conf", "0.6", "--threshold", "0.7"]).validate().is_ok());
        assert!(parse(&["--conf", "0.5", "--threshold", "0.5"]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&["--threshold", "1.5"]).validate().is_err());
        assert!(parse(&["--threshold", "0"]).validate().is_err());
        assert!(parse(&["--clip-frames", "0"]).validate().is_err());
        assert!(parse(&["--clip-fps", "0"]).validate().is_err());
        assert!(parse(&["--lat", "-95"]).validate().is_err());
        assert!(parse(&["--lng", "181"]).validate().is_err());
        assert!(parse(&["--lat", "-33.86", "--lng", "151.2"]).validate().is_ok());
    }
}
