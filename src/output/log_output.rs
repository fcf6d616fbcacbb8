// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::BgrFrame,
  geometry::DetectResult,
  labels::{ClassNames, LabelError},
  output::{Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("标签错误: {0}")]
  LabelError(#[from] LabelError),
}

/// 只把检测结果写入日志，不产生图像，`log://`
pub struct LogOutput {
  labels: Arc<ClassNames>,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with(uri, Draw::default())
  }
}

impl LogOutput {
  pub fn new(labels: Arc<ClassNames>) -> Self {
    Self { labels }
  }

  pub fn from_url_with(uri: &Url, draw: Draw) -> Result<Self, LogOutputError> {
    if uri.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(Self::new(draw.labels().clone()))
  }
}

impl Render<BgrFrame, DetectResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, frame: &BgrFrame, result: &DetectResult) -> Result<(), Self::Error> {
    info!(
      "{}x{} 帧检测到 {} 个目标",
      frame.width(),
      frame.height(),
      result.len()
    );
    for detection in result {
      let label = self.labels.label(detection)?;
      let bbox = detection.bbox();
      info!(
        "  {} @ ({:.1}, {:.1}, {:.1}, {:.1})",
        label, bbox.x, bbox.y, bbox.width, bbox.height
      );
    }
    Ok(())
  }
}
