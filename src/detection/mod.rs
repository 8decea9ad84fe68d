/// 检测系统 (Detection System)
///
/// 两个预训练模型:
/// - AccidentDetector: 事故检测, 取最高置信度与阈值比较
/// - VehicleCounter:   车辆计数, 计数映射为预计疏通时间
pub mod types;

use image::DynamicImage;

pub use types::{non_max_suppression, Bbox, DetectionResult};

use crate::error::Result;

/// 单张图片目标检测
pub trait ObjectDetector: Send {
    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionResult>;
}

/// 事故检测器
pub struct AccidentDetector {
    model: Box<dyn ObjectDetector>,
    threshold: f32,
}

impl AccidentDetector {
    pub fn new(model: Box<dyn ObjectDetector>, threshold: f32) -> Self {
        Self { model, threshold }
    }

    pub fn detect(&mut self, image: &DynamicImage) -> Result<DetectionResult> {
        self.model.detect(image)
    }

    /// 置信度严格大于阈值才算事故
    pub fn is_accident(&self, result: &DetectionResult) -> bool {
        result
            .max_confidence()
            .is_some_and(|conf| conf > self.threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// 车辆计数器
pub struct VehicleCounter {
    model: Box<dyn ObjectDetector>,
}

impl VehicleCounter {
    pub fn new(model: Box<dyn ObjectDetector>) -> Self {
        Self { model }
    }

    pub fn count(&mut self, image: &DynamicImage) -> Result<usize> {
        Ok(self.model.detect(image)?.len())
    }
}

/// 车辆数 → 预计等待时间(分钟)
pub fn estimate_wait_minutes(vehicle_count: usize) -> u32 {
    match vehicle_count {
        0..=9 => 5,
        10..=19 => 10,
        _ => 15,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    impl ObjectDetector for Fixed {
        fn detect(&mut self, _image: &DynamicImage) -> Result<DetectionResult> {
            Ok(DetectionResult::new(
                self.0
                    .iter()
                    .map(|&c| Bbox::new(0., 0., 10., 10., 0, c))
                    .collect(),
            ))
        }
    }

    #[test]
    fn test_wait_time_table() {
        for count in 0..10 {
            assert_eq!(estimate_wait_minutes(count), 5);
        }
        for count in 10..20 {
            assert_eq!(estimate_wait_minutes(count), 10);
        }
        for count in [20, 21, 50, 1000] {
            assert_eq!(estimate_wait_minutes(count), 15);
        }
    }

    #[test]
    fn test_accident_threshold_is_strict() {
        let image = DynamicImage::new_rgb8(4, 4);
        let mut at = AccidentDetector::new(Box::new(Fixed(vec![0.5])), 0.5);
        let result = at.detect(&image).unwrap();
        assert!(!at.is_accident(&result));

        let mut above = AccidentDetector::new(Box::new(Fixed(vec![0.2, 0.51])), 0.5);
        let result = above.detect(&image).unwrap();
        assert!(above.is_accident(&result));

        let mut none = AccidentDetector::new(Box::new(Fixed(vec![])), 0.5);
        let result = none.detect(&image).unwrap();
        assert!(!none.is_accident(&result));
    }

    #[test]
    fn test_vehicle_count() {
        let image = DynamicImage::new_rgb8(4, 4);
        let mut counter = VehicleCounter::new(Box::new(Fixed(vec![0.3; 12])));
        assert_eq!(counter.count(&image).unwrap(), 12);
    }
}
