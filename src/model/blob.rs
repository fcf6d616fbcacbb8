// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/blob.rs - 网络输入预处理
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

use image::{ImageBuffer, Rgb, imageops::FilterType};
use tracing::debug;

use crate::{
  config::PreprocessConfig,
  frame::{BGR_CHANNELS, BgrFrame},
};

/// NCHW 排列的归一化输入张量，形状为 `[1, 3, S, S]`
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
  data: Box<[f32]>,
  size: u32,
}

impl Blob {
  /// 将帧直接缩放为正方形（不做等比填充），按需交换 R/B，乘以缩放系数
  pub fn from_frame(frame: &BgrFrame, config: &PreprocessConfig) -> Self {
    let size = config.input_size;
    let plane = size as usize * size as usize;

    // 缩放只关心像素值，不关心通道含义
    let resized = match ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(
      frame.width(),
      frame.height(),
      frame.as_bgr(),
    ) {
      Some(view) if (frame.width(), frame.height()) != (size, size) => {
        image::imageops::resize(&view, size, size, FilterType::Triangle).into_raw()
      }
      _ => frame.as_bgr().to_vec(),
    };

    let mut data = vec![0f32; BGR_CHANNELS * plane];
    for c in 0..BGR_CHANNELS {
      let src_c = if config.swap_rb {
        BGR_CHANNELS - 1 - c
      } else {
        c
      };
      let dst = &mut data[c * plane..(c + 1) * plane];
      for (value, pixel) in dst.iter_mut().zip(resized.chunks_exact(BGR_CHANNELS)) {
        *value = pixel[src_c] as f32 * config.scale;
      }
    }

    debug!(
      "预处理: {}x{} -> {}x{}, swap_rb={}",
      frame.width(),
      frame.height(),
      size,
      size,
      config.swap_rb
    );

    Self {
      data: data.into_boxed_slice(),
      size,
    }
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn shape(&self) -> [usize; 4] {
    let size = self.size as usize;
    [1, BGR_CHANNELS, size, size]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame_2x2() -> BgrFrame {
    // 每个像素 BGR = (10, 20, 30)
    BgrFrame::new(2, 2, [10u8, 20, 30].repeat(4)).unwrap()
  }

  #[test]
  fn swaps_to_rgb_planes() {
    let config = PreprocessConfig {
      input_size: 2,
      scale: 1.0,
      swap_rb: true,
    };
    let blob = Blob::from_frame(&frame_2x2(), &config);
    assert_eq!(blob.shape(), [1, 3, 2, 2]);
    assert_eq!(&blob.as_slice()[0..4], &[30.0; 4]);
    assert_eq!(&blob.as_slice()[4..8], &[20.0; 4]);
    assert_eq!(&blob.as_slice()[8..12], &[10.0; 4]);
  }

  #[test]
  fn keeps_order_without_swap() {
    let config = PreprocessConfig {
      input_size: 2,
      scale: 1.0,
      swap_rb: false,
    };
    let blob = Blob::from_frame(&frame_2x2(), &config);
    assert_eq!(&blob.as_slice()[0..4], &[10.0; 4]);
    assert_eq!(&blob.as_slice()[8..12], &[30.0; 4]);
  }

  #[test]
  fn scales_and_resizes_to_square() {
    let frame = BgrFrame::new(4, 2, vec![255u8; 24]).unwrap();
    let blob = Blob::from_frame(&frame, &PreprocessConfig::default());
    assert_eq!(blob.size(), 416);
    assert_eq!(blob.as_slice().len(), 3 * 416 * 416);
    assert!(
      blob
        .as_slice()
        .iter()
        .all(|v| (v - 1.0).abs() <= 1.0 / 255.0 + 1e-6)
    );
  }
}
