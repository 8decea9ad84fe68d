/// 视频输入系统 (Video Input System)
///
/// 独立工作线程,负责摄像头解码
/// - CameraDecoder: 本地摄像头解码器 (DirectShow/AVFoundation/V4L2)
/// - DecodeFilter:  RGB24帧 → 有界队列 (队列满时丢帧)
pub mod camera;
pub mod decode_filter;

pub use camera::{
    default_format, format_camera_url, get_camera_devices, CameraConfig, CameraDecoder,
};
pub use decode_filter::{CapturedFrame, DecodeFilter};
