// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/gstreamer_display_output.rs - GStreamer 窗口显示
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

//! 在窗口中实时显示绘制后的帧，`gst://display?fps=30`。
//!
//! 帧尺寸在收到第一帧时确定。窗口被关闭或管道出错后 [`Render::is_closed`]
//! 返回 `true`，任务循环据此退出。

use std::sync::{
  OnceLock,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::BgrFrame,
  geometry::DetectResult,
  output::{
    Render,
    draw::{Draw, DrawError},
  },
};

const DEFAULT_FPS: i32 = 30;

#[derive(Error, Debug)]
pub enum GStreamerDisplayOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("找不到 appsrc 元素")]
  AppSrcNotFound,
  #[error("元素无法转换为 appsrc")]
  AppSrcConversionFailed,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
}

pub struct GStreamerDisplayOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  draw: Draw,
  fps: i32,
  shape: OnceLock<(u32, u32)>,
  frame_count: AtomicU64,
  closed: AtomicBool,
}

impl FromUrlWithScheme for GStreamerDisplayOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with(url, Draw::default())
  }
}

impl GStreamerDisplayOutput {
  pub fn from_url_with(url: &Url, draw: Draw) -> Result<Self, GStreamerDisplayOutputError> {
    if url.scheme() != Self::SCHEME || url.host_str() != Some("display") {
      error!("显示输出的 URL 必须为 gst://display, 实际为 {}", url);
      return Err(GStreamerDisplayOutputError::SchemeMismatch);
    }

    gst::init()?;

    let fps = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse().ok())
      .unwrap_or(DEFAULT_FPS);

    let description = "appsrc name=src is-live=true ! videoconvert ! autovideosink sync=false";
    info!("GStreamer 显示管道: {}", description);

    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerDisplayOutputError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayOutputError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsrc,
      draw,
      fps,
      shape: OnceLock::new(),
      frame_count: AtomicU64::new(0),
      closed: AtomicBool::new(false),
    })
  }

  fn ensure_caps(&self, width: u32, height: u32) -> Result<(), GStreamerDisplayOutputError> {
    let shape = *self.shape.get_or_init(|| {
      let caps = gst::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .field("width", width as i32)
        .field("height", height as i32)
        .field("framerate", gst::Fraction::new(self.fps, 1))
        .build();
      self.appsrc.set_caps(Some(&caps));
      info!("显示窗口尺寸: {}x{} @ {} fps", width, height, self.fps);
      (width, height)
    });

    if shape != (width, height) {
      return Err(GStreamerDisplayOutputError::PipelineError(format!(
        "帧尺寸变化: {}x{} -> {}x{}",
        shape.0, shape.1, width, height
      )));
    }
    Ok(())
  }

  fn push_frame(&self, data: Vec<u8>) -> Result<(), GStreamerDisplayOutputError> {
    let index = self.frame_count.fetch_add(1, Ordering::Relaxed);
    let duration = 1_000_000_000 / self.fps.max(1) as u64;

    let mut buffer = gst::Buffer::from_mut_slice(data);
    if let Some(buffer) = buffer.get_mut() {
      buffer.set_pts(gst::ClockTime::from_nseconds(index * duration));
      buffer.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerDisplayOutputError::PipelineError(format!("推送缓冲区失败: {:?}", e))
    })?;
    Ok(())
  }
}

impl Drop for GStreamerDisplayOutput {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 显示管道失败: {}", e);
    }
    info!(
      "显示输出关闭，共显示 {} 帧",
      self.frame_count.load(Ordering::Relaxed)
    );
  }
}

impl Render<BgrFrame, DetectResult> for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn render_result(&self, frame: &BgrFrame, result: &DetectResult) -> Result<(), Self::Error> {
    self.ensure_caps(frame.width(), frame.height())?;
    let image = self.draw.draw_detections(frame, result)?;
    self.push_frame(image.into_raw())
  }

  fn is_closed(&self) -> bool {
    if self.closed.load(Ordering::Relaxed) {
      return true;
    }

    let Some(bus) = self.pipeline.bus() else {
      return false;
    };
    match bus.pop_filtered(&[gst::MessageType::Eos, gst::MessageType::Error]) {
      Some(msg) => {
        match msg.view() {
          gst::MessageView::Error(err) => error!("显示管道错误: {}", err.error()),
          _ => info!("显示窗口已关闭"),
        }
        self.closed.store(true, Ordering::Relaxed);
        true
      }
      None => false,
    }
  }
}
