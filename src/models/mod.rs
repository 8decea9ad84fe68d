/// 模型统一接口与实现
///
/// ## Model Trait
/// 统一的模型接口,定义标准流程: preprocess → run → postprocess
///
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run (ONNX Runtime)
///          ↓
///     原始输出 → postprocess → 检测结果
/// ```
///
/// 事故模型与车辆计数模型都是 ultralytics 导出的 YOLOv8 检测模型,
/// 只是权重不同, 因此共用 `YOLOv8` 实现。
use image::DynamicImage;
use ndarray::{Array, IxDyn};

use crate::detection::DetectionResult;
use crate::error::Result;

pub trait Model {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[DynamicImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播, 返回原始输出
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>>;

    /// 后处理: 原始输出 → 检测结果 (原图坐标)
    fn postprocess(
        &self,
        xs: Array<f32, IxDyn>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[DynamicImage]) -> Result<Vec<DetectionResult>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images)
    }

    /// 打印模型信息
    fn summary(&self);
}

pub mod yolov8;

pub use yolov8::{YOLOv8, YOLOv8Config};
