// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

// YOLOv8 检测模型实现
// 包含: 模型加载、预处理(letterbox)、推理、后处理(解码 + NMS)

use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, Axis, IxDyn};
use tracing::info;

use crate::detection::{non_max_suppression, Bbox, DetectionResult, ObjectDetector};
use crate::error::{Error, Result};
use crate::{OrtBackend, OrtConfig, OrtEP};

const CXYWH_OFFSET: usize = 4;

/// letterbox 填充值
const PAD_VALUE: f32 = 144.0 / 255.0;

/// YOLOv8 模型参数
#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: String,
    pub ep: OrtEP,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// 输出框的最低置信度
    pub conf: f32,
    pub iou: f32,
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    height: u32,
    width: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            image_size: (config.height, config.width),
        })?;

        let (height, width) = (engine.height(), engine.width());
        let names = engine
            .names()
            .map(|n| n.to_vec())
            .unwrap_or_else(|| vec!["Unknown".to_string()]);

        Ok(Self {
            engine,
            height,
            width,
            conf: config.conf,
            iou: config.iou,
            names,
        })
    }

    /// 等比缩放后的 (比例, 新宽, 新高)
    fn scale_wh(&self, w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
        let r = (w1 / w0).min(h1 / h0);
        (r, (w0 * r).round(), (h0 * r).round())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn conf(&self) -> f32 {
        self.conf
    }

    pub fn iou(&self) -> f32 {
        self.iou
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl super::Model for YOLOv8 {
    fn preprocess(&mut self, xs: &[DynamicImage]) -> Result<Array<f32, IxDyn>> {
        let mut ys = Array::from_elem(
            (xs.len(), 3, self.height as usize, self.width as usize),
            PAD_VALUE,
        )
        .into_dyn();

        for (idx, x) in xs.iter().enumerate() {
            let (w0, h0) = x.dimensions();
            let (_, w_new, h_new) =
                self.scale_wh(w0 as f32, h0 as f32, self.width as f32, self.height as f32);
            let img = x
                .resize_exact(
                    (w_new as u32).max(1),
                    (h_new as u32).max(1),
                    image::imageops::FilterType::Triangle,
                )
                .to_rgb8();

            for (x, y, rgb) in img.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                let [r, g, b] = rgb.0;
                ys[[idx, 0, y, x]] = (r as f32) / 255.0;
                ys[[idx, 1, y, x]] = (g as f32) / 255.0;
                ys[[idx, 2, y, x]] = (b as f32) / 255.0;
            }
        }

        Ok(ys)
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        self.engine.run(xs)
    }

    /// 输出形状: [batch, 4 + nc, anchors]
    fn postprocess(
        &self,
        xs: Array<f32, IxDyn>,
        xs0: &[DynamicImage],
    ) -> Result<Vec<DetectionResult>> {
        let sizes: Vec<(u32, u32)> = xs0.iter().map(|x| x.dimensions()).collect();
        decode_predictions(&xs, &sizes, (self.width, self.height), self.conf, self.iou)
    }

    fn summary(&self) {
        info!(
            "\nSummary:\n\
            > EP: {:?}\n\
            > Height: {}, Width: {}\n\
            > nc: {} ({}), conf: {}, iou: {}\n",
            self.engine.ep(),
            self.height,
            self.width,
            self.names.len(),
            self.names.join(", "),
            self.conf,
            self.iou,
        );
    }
}

impl ObjectDetector for YOLOv8 {
    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionResult> {
        let mut ys = super::Model::forward(self, std::slice::from_ref(image))?;
        Ok(ys.pop().unwrap_or_default())
    }
}

/// 解码原始输出: cxcywh → 原图坐标, 置信度过滤, NMS
///
/// `sizes` 为每张原图的 (宽, 高), `input` 为模型输入的 (宽, 高)
pub fn decode_predictions(
    xs: &Array<f32, IxDyn>,
    sizes: &[(u32, u32)],
    input: (u32, u32),
    conf: f32,
    iou: f32,
) -> Result<Vec<DetectionResult>> {
    if xs.ndim() != 3 || xs.shape()[1] <= CXYWH_OFFSET {
        return Err(Error::Model(format!(
            "unexpected detection output shape {:?}",
            xs.shape()
        )));
    }
    let nc = xs.shape()[1] - CXYWH_OFFSET;

    let mut ys = Vec::with_capacity(sizes.len());
    for (anchor, &(w0, h0)) in xs.axis_iter(Axis(0)).zip(sizes) {
        let width_original = w0 as f32;
        let height_original = h0 as f32;
        let ratio = (input.0 as f32 / width_original).min(input.1 as f32 / height_original);

        let mut data: Vec<Bbox> = Vec::new();
        for pred in anchor.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

            let Some((id, &confidence)) = clss
                .iter()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max })
            else {
                continue;
            };

            if confidence < conf {
                continue;
            }

            let cx = bbox[0] / ratio;
            let cy = bbox[1] / ratio;
            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let x = cx - w / 2.;
            let y = cy - h / 2.;
            data.push(Bbox::new(
                x.max(0.0).min(width_original),
                y.max(0.0).min(height_original),
                w,
                h,
                id,
                confidence,
            ));
        }

        non_max_suppression(&mut data, iou);
        ys.push(DetectionResult::new(data));
    }

    Ok(ys)
}
