/// 画面标注与 JPEG 编码
/// Draws detection boxes onto a frame and encodes it for the MJPEG stream
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detection::Bbox;
use crate::error::Result;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 3;

/// 在原图上画框 (线宽向内收缩, 越界部分由 imageproc 裁掉)
pub fn draw_boxes(image: &mut RgbImage, bboxes: &[Bbox]) {
    for bbox in bboxes {
        for t in 0..BOX_THICKNESS {
            let w = bbox.width().round() as i32 - 2 * t;
            let h = bbox.height().round() as i32 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(bbox.xmin().round() as i32 + t, bbox.ymin().round() as i32 + t)
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(buf)
}
