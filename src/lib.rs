// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod archive; // 事故片段归档 (本地 mp4 + GridFS)
pub mod config; // 运行参数
pub mod detection; // 事故检测与车辆计数
pub mod error;
pub mod incident; // 事故状态与倒计时
pub mod input; // 摄像头输入
pub mod models; // 模型接口与具体实现
pub mod ort_backend;
pub mod pipeline; // 帧处理流水线
pub mod routes; // 备选路线
pub mod server; // HTTP 服务

pub use crate::config::Args;
pub use crate::error::{Error, Result};
pub use crate::models::{Model, YOLOv8, YOLOv8Config};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
