// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/v4l_input.rs - V4L2 摄像头输入
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

//! 直接通过 V4L2 读取摄像头，URL 形如 `v4l:///dev/video0?width=640&height=480`。
//!
//! 优先请求 MJPG，设备不支持时接受驱动协商出的 YUYV、RGB3 或 BGR3。

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  prelude::*,
  video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{BGR_CHANNELS, BgrFrame, FrameError},
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const BUFFER_COUNT: u32 = 4;
const CAPTURE_RETRIES: usize = 3;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("V4L 设备错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("图像解码错误: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Mjpg,
  Yuyv,
  Rgb3,
  Bgr3,
}

impl PixelFormat {
  fn from_fourcc(fourcc: FourCC) -> Result<Self, V4lInputError> {
    match &fourcc.repr {
      b"MJPG" => Ok(PixelFormat::Mjpg),
      b"YUYV" => Ok(PixelFormat::Yuyv),
      b"RGB3" => Ok(PixelFormat::Rgb3),
      b"BGR3" => Ok(PixelFormat::Bgr3),
      _ => Err(V4lInputError::UnsupportedPixelFormat(fourcc.to_string())),
    }
  }
}

pub struct V4lInput {
  // 保持设备打开直到流释放
  _device: Device,
  stream: Stream<'static>,
  format: PixelFormat,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemeMismatch);
    }

    let path = crate::url_path(url);
    let path = if path.is_empty() || path == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      path
    };
    let query = |key: &str| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse::<u32>().ok())
    };

    Self::open(&path, query("width"), query("height"))
  }
}

impl V4lInput {
  pub fn open(path: &str, width: Option<u32>, height: Option<u32>) -> Result<Self, V4lInputError> {
    info!("打开摄像头: {}", path);
    let device = Device::with_path(path)?;

    let mut requested = device.format()?;
    if let Some(width) = width {
      requested.width = width;
    }
    if let Some(height) = height {
      requested.height = height;
    }
    requested.fourcc = FourCC::new(b"MJPG");
    let actual = device.set_format(&requested)?;
    let format = PixelFormat::from_fourcc(actual.fourcc)?;
    info!(
      "摄像头格式: {}x{} {}",
      actual.width, actual.height, actual.fourcc
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;

    Ok(Self {
      _device: device,
      stream,
      format,
      width: actual.width,
      height: actual.height,
    })
  }

  fn capture(&mut self) -> Result<BgrFrame, V4lInputError> {
    let (buffer, meta) = self.stream.next()?;
    let used = (meta.bytesused as usize).min(buffer.len());
    let data = if used == 0 { buffer } else { &buffer[..used] };
    decode(self.format, data, self.width, self.height)
  }
}

impl Iterator for V4lInput {
  type Item = BgrFrame;

  fn next(&mut self) -> Option<Self::Item> {
    for attempt in 1..=CAPTURE_RETRIES {
      match self.capture() {
        Ok(frame) => return Some(frame),
        Err(e) => warn!("第 {} 次采集失败: {}", attempt, e),
      }
    }
    error!("连续 {} 次采集失败，结束输入", CAPTURE_RETRIES);
    None
  }
}

fn decode(format: PixelFormat, data: &[u8], width: u32, height: u32) -> Result<BgrFrame, V4lInputError> {
  let pixels = width as usize * height as usize;
  let check = |expected: usize| {
    if data.len() < expected {
      Err(V4lInputError::BufferSizeMismatch {
        expected,
        actual: data.len(),
      })
    } else {
      Ok(())
    }
  };

  match format {
    PixelFormat::Mjpg => {
      let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?;
      Ok(BgrFrame::from(image.to_rgb8()))
    }
    PixelFormat::Bgr3 => {
      check(pixels * BGR_CHANNELS)?;
      let mut frame = BgrFrame::with_shape(width, height)?;
      frame.as_mut().copy_from_slice(&data[..pixels * BGR_CHANNELS]);
      Ok(frame)
    }
    PixelFormat::Rgb3 => {
      check(pixels * BGR_CHANNELS)?;
      let mut frame = BgrFrame::with_shape(width, height)?;
      for (d, s) in frame
        .as_mut()
        .chunks_exact_mut(BGR_CHANNELS)
        .zip(data.chunks_exact(BGR_CHANNELS))
      {
        d.copy_from_slice(&[s[2], s[1], s[0]]);
      }
      Ok(frame)
    }
    PixelFormat::Yuyv => {
      check(pixels * 2)?;
      let mut frame = BgrFrame::with_shape(width, height)?;
      for (d, s) in frame
        .as_mut()
        .chunks_exact_mut(BGR_CHANNELS * 2)
        .zip(data.chunks_exact(4))
      {
        let (u, v) = (s[1] as f32 - 128.0, s[3] as f32 - 128.0);
        d[..3].copy_from_slice(&yuv_to_bgr(s[0] as f32, u, v));
        d[3..].copy_from_slice(&yuv_to_bgr(s[2] as f32, u, v));
      }
      Ok(frame)
    }
  }
}

fn yuv_to_bgr(y: f32, u: f32, v: f32) -> [u8; 3] {
  let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
  let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
  let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
  [b, g, r]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rgb3_is_swapped_to_bgr() {
    let frame = decode(PixelFormat::Rgb3, &[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
    assert_eq!(frame.as_bgr(), &[3, 2, 1, 6, 5, 4]);
  }

  #[test]
  fn yuyv_grey_maps_to_grey() {
    let frame = decode(PixelFormat::Yuyv, &[100, 128, 200, 128], 2, 1).unwrap();
    assert_eq!(frame.as_bgr(), &[100, 100, 100, 200, 200, 200]);
  }

  #[test]
  fn short_buffer_is_rejected() {
    assert!(matches!(
      decode(PixelFormat::Bgr3, &[0; 5], 2, 1),
      Err(V4lInputError::BufferSizeMismatch {
        expected: 6,
        actual: 5
      })
    ));
  }

  #[test]
  fn unknown_fourcc_is_rejected() {
    assert!(PixelFormat::from_fourcc(FourCC::new(b"H264")).is_err());
  }
}
