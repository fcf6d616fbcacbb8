// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频输入
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

//! # GStreamer 视频输入
//!
//! 支持两类来源：
//!
//! - `gst://camera/dev/video0?width=640&height=480&fps=30`：V4L2 摄像头
//! - `gst://file/path/to/video.mp4`：视频文件
//!
//! 可选参数 `rotate` 取 `90`、`180`、`270`。管道末端统一转换为 BGR，
//! 帧保持原始分辨率，缩放留给预处理。
//!
//! 需要系统安装 GStreamer 开发库，并启用 `gstreamer_input` 特性。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{BGR_CHANNELS, BgrFrame, FrameError},
};

const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 15;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("不支持的来源类型: {0}")]
  UnknownSource(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("元素无法转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

enum PipelineItem {
  FileSource(String),
  CameraSource {
    device: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  VideoFlip(u32),
  TargetFormat(&'static str),
}

impl PipelineItem {
  fn to_pipeline(&self) -> String {
    match self {
      PipelineItem::FileSource(path) => format!("filesrc location=\"{}\" ! decodebin", path),
      PipelineItem::CameraSource {
        device,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          device, io_mode, format, width, height, fps
        )
      }
      PipelineItem::VideoFlip(method) => format!("videoflip method={}", method),
      PipelineItem::TargetFormat(format) => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// 由 URL 构建输入管道
pub struct GStreamerInputPipelineBuilder {
  items: Vec<PipelineItem>,
}

impl GStreamerInputPipelineBuilder {
  fn camera(path: &str, query: &HashMap<String, String>) -> Self {
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = vec![PipelineItem::CameraSource {
      device: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      format: query
        .get("format")
        .cloned()
        .unwrap_or_else(|| "YUY2".to_string()),
      width: parse("width", DEFAULT_CAMERA_WIDTH),
      height: parse("height", DEFAULT_CAMERA_HEIGHT),
      fps: parse("fps", DEFAULT_CAMERA_FPS),
    }];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    Self { items }
  }

  fn file(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![PipelineItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    Self { items }
  }

  fn video_flip(rotate: Option<&str>) -> Option<PipelineItem> {
    match rotate? {
      "90" => Some(PipelineItem::VideoFlip(1)),
      "180" => Some(PipelineItem::VideoFlip(2)),
      "270" => Some(PipelineItem::VideoFlip(3)),
      other => {
        warn!("忽略不支持的旋转角度: {}", other);
        None
      }
    }
  }

  pub fn description(&self) -> String {
    let basic = self
      .items
      .iter()
      .map(PipelineItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!("{} ! appsink max-buffers=2 drop=true name=sink", basic)
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = self.description();
    info!("GStreamer 输入管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = crate::url_path(url);

    let mut builder = match url.host_str() {
      Some("camera") => Self::camera(&path, &query),
      Some("file") => Self::file(&path, &query),
      other => {
        return Err(GStreamerInputError::UnknownSource(
          other.unwrap_or_default().to_string(),
        ));
      }
    };
    builder.items.push(PipelineItem::TargetFormat("BGR"));

    Ok(builder)
  }
}

pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl FromUrl for GStreamerInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    GStreamerInputPipelineBuilder::from_url(url)?.build()
  }
}

impl Iterator for GStreamerInput {
  type Item = BgrFrame;

  fn next(&mut self) -> Option<Self::Item> {
    // 取样失败（EOS 或设备断开）即视为流结束
    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(e) => {
        info!("GStreamer 输入结束: {}", e);
        return None;
      }
    };

    convert_sample(&sample)
      .map_err(|e| {
        error!("帧转换失败: {}", e);
        e
      })
      .ok()
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<BgrFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  let swap = match video_info.format() {
    gst_video::VideoFormat::Bgr => false,
    gst_video::VideoFormat::Rgb => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width as usize * BGR_CHANNELS;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e))
  })?;
  let data = map.as_slice();

  let expected = stride * (height as usize).saturating_sub(1) + row_bytes;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut frame = BgrFrame::with_shape(width, height)?;
  for (dst, src) in frame
    .as_mut()
    .chunks_exact_mut(row_bytes)
    .zip(data.chunks(stride))
  {
    if swap {
      for (d, s) in dst
        .chunks_exact_mut(BGR_CHANNELS)
        .zip(src.chunks_exact(BGR_CHANNELS))
      {
        d.copy_from_slice(&[s[2], s[1], s[0]]);
      }
    } else {
      dst.copy_from_slice(&src[..row_bytes]);
    }
  }

  Ok(frame)
}
