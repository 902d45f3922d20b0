// 该文件是 Alertic 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{RgbImage, imageops::FilterType};

use crate::input::AsNhwcFrame;

const RGB_CHANNELS: usize = 3;

/// 固定尺寸的 RGB 帧，按 HWC 顺序存储
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  const LEN: usize = RGB_CHANNELS * W as usize * H as usize;

  pub fn height(&self) -> u32 {
    H
  }

  pub fn width(&self) -> u32 {
    W
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 将任意尺寸的图像缩放为帧尺寸
  pub fn from_rgb_image(image: &RgbImage) -> Self {
    let data = if image.dimensions() == (W, H) {
      image.as_raw().clone()
    } else {
      image::imageops::resize(image, W, H, FilterType::Triangle).into_raw()
    };

    Self {
      data: data.into_boxed_slice(),
    }
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    // 长度在构造时已经校验过
    RgbImage::from_raw(W, H, self.data.to_vec()).unwrap_or_else(|| RgbImage::new(W, H))
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    let data = vec![0u8; Self::LEN].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

/// 采集到的一帧：保留原始分辨率的图像，同时带上缩放后的模型输入
#[derive(Debug, Clone)]
pub struct CapturedFrame<const W: u32, const H: u32> {
  source: RgbImage,
  frame: RgbNhwcFrame<W, H>,
}

impl<const W: u32, const H: u32> CapturedFrame<W, H> {
  pub fn new(source: RgbImage) -> Self {
    let frame = RgbNhwcFrame::from_rgb_image(&source);
    Self { source, frame }
  }

  /// 原始分辨率图像，用于快照
  pub fn source(&self) -> &RgbImage {
    &self.source
  }

  /// 模型输入尺寸的帧
  pub fn frame(&self) -> &RgbNhwcFrame<W, H> {
    &self.frame
  }
}

impl<const W: u32, const H: u32> From<RgbNhwcFrame<W, H>> for CapturedFrame<W, H> {
  fn from(frame: RgbNhwcFrame<W, H>) -> Self {
    Self {
      source: frame.to_rgb_image(),
      frame,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn image_round_trip_keeps_pixels() {
    let mut image = RgbImage::new(4, 2);
    image.put_pixel(3, 1, Rgb([10, 20, 30]));

    let frame = RgbNhwcFrame::<4, 2>::from_rgb_image(&image);
    assert_eq!(&frame.as_nhwc()[21..24], &[10, 20, 30]);
    assert_eq!(frame.to_rgb_image(), image);
  }

  #[test]
  fn scales_other_sizes() {
    let image = RgbImage::from_pixel(8, 8, Rgb([200, 100, 50]));
    let frame = RgbNhwcFrame::<4, 2>::from_rgb_image(&image);
    assert_eq!(frame.as_nhwc().len(), 24);
    assert_eq!(&frame.as_nhwc()[0..3], &[200, 100, 50]);
  }

  #[test]
  fn captured_frame_keeps_source_resolution() {
    let mut image = RgbImage::from_pixel(16, 4, Rgb([9, 9, 9]));
    image.put_pixel(15, 3, Rgb([1, 2, 3]));

    let captured = CapturedFrame::<4, 2>::new(image.clone());
    assert_eq!(captured.source(), &image);
    assert_eq!(captured.frame().as_nhwc().len(), 24);
  }
}
