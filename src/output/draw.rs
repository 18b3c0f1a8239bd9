// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::model::{DetectResult, WithLabel};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 80;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 标注绘制工具
///
/// 未加载字体时只绘制边框，不绘制标签文字。
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(None)
  }
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    // 每个类别一种颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }

  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    info!("加载标签字体: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(Self::new(Some(font)))
  }

  fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  // 在图像上绘制边框与标签，bbox 为像素坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    label: &str,
    color: Rgb<u8>,
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 || bbox.iter().any(|v| !v.is_finite()) {
      return;
    }

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..BOX_THICKNESS {
      let box_w = x_max - x_min + 1 - 2 * t;
      let box_h = y_max - y_min + 1 - 2 * t;
      if box_w <= 0 || box_h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(box_w as u32, box_h as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let (text_w, text_h) = text_size(self.font_scale, font, label);
    let label_h = text_h as i32 + 2 * LABEL_PADDING;
    let label_w = (text_w as i32 + 2 * LABEL_PADDING).min(w - x_min);
    let label_y = (y_min - label_h).max(0);

    if label_w > 0 && label_h > 0 {
      let rect = Rect::at(x_min, label_y).of_size(label_w as u32, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        x_min + LABEL_PADDING,
        label_y + LABEL_PADDING,
        self.font_scale,
        font,
        label,
      );
    }
  }
}

pub trait DrawDetectionOnImage<T: WithLabel> {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>);

  /// 返回一张新的标注图，不修改输入图像
  fn draw_detections(&self, image: &RgbImage, result: &DetectResult<T>) -> RgbImage {
    let mut annotated = image.clone();
    self.draw_detections_on_image(&mut annotated, result);
    annotated
  }
}

impl<T: WithLabel> DrawDetectionOnImage<T> for Draw {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>) {
    for item in result.iter() {
      let label = format!("{} {:.2}", item.class_name(), item.score);
      self.draw_bbox_with_label(image, &item.bbox, &label, self.color_of(item.class_id()));
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{CocoLabel, DetectItem};

  fn result(items: Vec<DetectItem<CocoLabel>>) -> DetectResult<CocoLabel> {
    items.into()
  }

  fn item(bbox: [f32; 4]) -> DetectItem<CocoLabel> {
    DetectItem {
      kind: CocoLabel::from_label_id(0),
      score: 0.5,
      bbox,
    }
  }

  #[test]
  fn no_detections_leaves_image_untouched() {
    let image = RgbImage::from_fn(16, 16, |x, y| Rgb([x as u8, y as u8, 7]));
    let annotated = Draw::default().draw_detections(&image, &result(vec![]));
    assert_eq!(annotated, image);
  }

  #[test]
  fn box_outline_is_drawn_on_a_copy() {
    let image = RgbImage::new(32, 32);
    let draw = Draw::default();
    let annotated = draw.draw_detections(&image, &result(vec![item([4.0, 4.0, 20.0, 20.0])]));

    let color = draw.color_of(0);
    assert_eq!(*annotated.get_pixel(4, 4), color);
    assert_eq!(*annotated.get_pixel(5, 12), color);
    assert_eq!(*annotated.get_pixel(20, 20), color);
    // 框内部保持原样
    assert_eq!(*annotated.get_pixel(12, 12), Rgb([0, 0, 0]));
    assert_eq!(image, RgbImage::new(32, 32));
  }

  #[test]
  fn out_of_bounds_and_degenerate_boxes_do_not_panic() {
    let image = RgbImage::new(10, 10);
    let draw = Draw::default();
    let annotated = draw.draw_detections(
      &image,
      &result(vec![
        item([-50.0, -50.0, 500.0, 500.0]),
        item([5.0, 5.0, 5.0, 5.0]),
        item([f32::NAN, 0.0, 3.0, 3.0]),
      ]),
    );
    assert_eq!(*annotated.get_pixel(0, 0), draw.color_of(0));
    assert_eq!(*annotated.get_pixel(5, 5), Rgb([0, 0, 0]));
  }

  #[test]
  fn palette_cycles_by_class() {
    let draw = Draw::default();
    assert_eq!(draw.color_of(3), draw.color_of(83));
    assert_ne!(draw.color_of(0), draw.color_of(40));
  }
}
