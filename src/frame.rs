// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - BGR 帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

pub const BGR_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("帧尺寸无效: {width}x{height}")]
  InvalidShape { width: u32, height: u32 },
}

/// 原始尺寸的视频帧，按 HWC 排列，通道顺序为 BGR
///
/// 采集设备普遍输出 BGR，预处理时由 `swap_rb` 决定是否交换为 RGB。
#[derive(Debug, Clone, PartialEq)]
pub struct BgrFrame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
}

impl BgrFrame {
  pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidShape { width, height });
    }

    let expected = BGR_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
    })
  }

  /// 全黑帧
  pub fn with_shape(width: u32, height: u32) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidShape { width, height });
    }

    let size = BGR_CHANNELS * width as usize * height as usize;
    Ok(Self {
      data: vec![0u8; size].into_boxed_slice(),
      width,
      height,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    BGR_CHANNELS
  }

  pub fn as_bgr(&self) -> &[u8] {
    &self.data
  }

  /// 转为 RGB 图像，用于绘制与保存
  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * self.width as usize + x as usize) * BGR_CHANNELS;
      Rgb([self.data[idx + 2], self.data[idx + 1], self.data[idx]])
    })
  }
}

impl AsMut<[u8]> for BgrFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<&RgbImage> for BgrFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut data = Vec::with_capacity(BGR_CHANNELS * width as usize * height as usize);
    for pixel in image.pixels() {
      data.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
    }

    Self {
      data: data.into_boxed_slice(),
      width,
      height,
    }
  }
}

impl From<RgbImage> for BgrFrame {
  fn from(image: RgbImage) -> Self {
    BgrFrame::from(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_wrong_length() {
    let err = BgrFrame::new(2, 2, vec![0u8; 11]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 12,
        actual: 11
      }
    );
  }

  #[test]
  fn rejects_empty_shape() {
    let err = BgrFrame::new(0, 4, Vec::new()).unwrap_err();
    assert_eq!(err, FrameError::InvalidShape { width: 0, height: 4 });
  }

  #[test]
  fn blank_frame_rejects_empty_shape() {
    assert_eq!(
      BgrFrame::with_shape(3, 0).unwrap_err(),
      FrameError::InvalidShape { width: 3, height: 0 }
    );
    let frame = BgrFrame::with_shape(3, 2).unwrap();
    assert_eq!(frame.as_bgr().len(), 18);
  }

  #[test]
  fn rgb_round_trip_swaps_channels() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([10, 20, 30]));
    image.put_pixel(1, 0, Rgb([40, 50, 60]));

    let frame = BgrFrame::from(&image);
    assert_eq!(frame.as_bgr(), &[30, 20, 10, 60, 50, 40]);
    assert_eq!(frame.to_rgb_image(), image);
  }
}
