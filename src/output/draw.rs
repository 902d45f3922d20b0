// 该文件是 Alertic 项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{detect::Detection, frame::RgbNhwcFrame, model::CocoLabel};

const LABEL_FONT_SIZE: f32 = 18.0;
const COUNTER_FONT_SIZE: f32 = 24.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const TEXT_COLOR: [u8; 3] = [255, 255, 255];
const PERSON_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const CAT_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const PALETTE_SIZE: u32 = 80;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  FontIoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在帧上绘制检测框。没有字体时只画框，不画文字。
#[derive(Clone, Default)]
pub struct Draw {
  font: Option<FontArc>,
}

impl Draw {
  pub fn new(font: Option<FontArc>) -> Self {
    Self { font }
  }

  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载字体: {}", path.as_ref().display());
    Ok(Self::new(Some(font)))
  }

  /// 读取输出 URL 中的 `font` 参数
  pub fn from_url(url: &Url) -> Result<Self, DrawError> {
    match url.query_pairs().find(|(key, _)| key == "font") {
      Some((_, path)) => Self::with_font_file(path.as_ref()),
      None => Ok(Self::default()),
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn annotate<const W: u32, const H: u32>(
    &self,
    frame: &RgbNhwcFrame<W, H>,
    detections: &[Detection],
  ) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections(&mut image, detections);
    image
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }

    if let Some(font) = self.font.as_ref() {
      let persons = count_label(detections, CocoLabel::PERSON);
      let cats = count_label(detections, CocoLabel::CAT);
      let text = format!("Persons: {} | Cats: {}", persons, cats);
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        10,
        10,
        PxScale::from(COUNTER_FONT_SIZE),
        font,
        &text,
      );
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let [x_min, y_min, x_max, y_max] = detection.bbox;
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = class_color(detection.class_id);
    let (width, height) = ((x_max - x_min) as u32 + 1, (y_max - y_min) as u32 + 1);

    // 边框加粗为2像素
    draw_hollow_rect_mut(image, Rect::at(x_min, y_min).of_size(width, height), color);
    if width > 2 && height > 2 {
      draw_hollow_rect_mut(
        image,
        Rect::at(x_min + 1, y_min + 1).of_size(width - 2, height - 2),
        color,
      );
    }

    let Some(font) = self.font.as_ref() else {
      return;
    };

    let label = format!("{} {:.2}", detection.class_name, detection.confidence);
    let scale = PxScale::from(LABEL_FONT_SIZE);
    let (text_width, text_height) = text_size(scale, font, &label);
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不够时贴着图像顶部
    let label_y = (y_min - label_height).max(0);
    let label_width = text_width.min(image.width().saturating_sub(x_min as u32));
    if label_width == 0 {
      return;
    }

    draw_filled_rect_mut(
      image,
      Rect::at(x_min, label_y).of_size(label_width, label_height as u32),
      color,
    );
    draw_text_mut(
      image,
      Rgb(TEXT_COLOR),
      x_min,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

fn count_label(detections: &[Detection], label: CocoLabel) -> usize {
  detections
    .iter()
    .filter(|d| d.class_id == label.id())
    .count()
}

/// 人用绿色，猫用蓝色，其余类别按色相环取色
pub fn class_color(class_id: u32) -> Rgb<u8> {
  match CocoLabel::from_id(class_id) {
    CocoLabel::PERSON => Rgb(PERSON_COLOR),
    CocoLabel::CAT => Rgb(CAT_COLOR),
    _ => {
      let hue = (class_id % PALETTE_SIZE) as f32 / PALETTE_SIZE as f32 * 360.0;
      hsv_to_rgb(hue, 0.8, 0.9)
    }
  }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = match h {
    h if h < 60.0 => (c, x, 0.0),
    h if h < 120.0 => (x, c, 0.0),
    h if h < 180.0 => (0.0, c, x),
    h if h < 240.0 => (0.0, x, c),
    h if h < 300.0 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
