// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::BgrFrame, geometry::DetectResult};

pub trait Render<Frame, Output>: Sized {
  type Error;

  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  /// 渲染端是否已关闭（例如显示窗口被关掉），关闭后任务应停止
  fn is_closed(&self) -> bool {
    false
  }
}

pub mod draw;

mod directory_record;
mod log_output;
mod save_image_file;

pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};
pub use self::draw::{Draw, DrawError, Record};
pub use self::log_output::{LogOutput, LogOutputError};
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_display_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_display_output::{GStreamerDisplayOutput, GStreamerDisplayOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("日志输出错误: {0}")]
  LogOutputError(#[from] LogOutputError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 显示输出错误: {0}")]
  GStreamerDisplayOutputError(#[from] GStreamerDisplayOutputError),
  #[error("不支持的输出方案 '{0}'")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  SaveImageFile(SaveImageFileOutput),
  DirectoryRecord(DirectoryRecordOutput),
  Log(LogOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerDisplay(GStreamerDisplayOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with(url, draw::Draw::default())
  }
}

impl OutputWrapper {
  /// 按 URL 方案选择输出，绘制方式（类别名称、字体）由 `draw` 给出
  pub fn from_url_with(url: &Url, draw: draw::Draw) -> Result<Self, OutputError> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFile(
        SaveImageFileOutput::from_url_with(url, draw)?,
      )),
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url_with(url, draw)?,
      )),
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url_with(url, draw)?)),
      #[cfg(feature = "gstreamer_output")]
      GStreamerDisplayOutput::SCHEME => Ok(OutputWrapper::GStreamerDisplay(
        GStreamerDisplayOutput::from_url_with(url, draw)?,
      )),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<BgrFrame, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &BgrFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFile(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::Log(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerDisplay(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn is_closed(&self) -> bool {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerDisplay(output) => output.is_closed(),
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selects_output_by_scheme() {
    let url = Url::parse("log://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Log(_))
    ));

    let url = Url::parse("image:///tmp/kanjian-out.png").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::SaveImageFile(_))
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://0.0.0.0:8554/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
