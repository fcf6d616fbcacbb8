// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::{path::PathBuf, sync::Arc};

use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  config::DetectorConfig,
  labels::{ClassNames, LabelError},
  model::NmsMode,
  output::{Draw, DrawError},
};

/// 各个可执行程序共用的参数
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
  /// 模型路径，例如 onnx:///data/yolov7-tiny.onnx?size=416 或 replay:///data/outputs.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///a.jpg、folder:///frames、gst://camera/dev/video0、v4l:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 image:///out.png、folder:///records?record=name、log://、gst://display
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 标签字体（TTF/OTF），不提供时使用内嵌字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 置信度阈值，覆盖模型 URL 中的 conf
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值，覆盖模型 URL 中的 nms
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,
  /// 网络输入边长，覆盖模型 URL 中的 size
  #[arg(long, value_name = "PIXELS")]
  pub input_size: Option<u32>,
  /// 只在同类别之间做 NMS
  #[arg(long)]
  pub per_class_nms: bool,
}

impl CommonArgs {
  /// 模型 URL 查询串之上再叠加命令行参数
  pub fn detector_config(&self) -> Result<DetectorConfig, crate::config::ConfigError> {
    let mut config = DetectorConfig::default().apply_query(&self.model)?;
    if let Some(conf) = self.confidence {
      config = config.conf_threshold(conf);
    }
    if let Some(nms) = self.nms_threshold {
      config = config.nms_threshold(nms);
    }
    if let Some(size) = self.input_size {
      config = config.input_size(size);
    }
    if self.per_class_nms {
      config = config.nms_mode(NmsMode::PerClass);
    }
    config.validate()?;
    info!("检测参数: {:?}", config);
    Ok(config)
  }

  pub fn load_labels(&self) -> Result<ClassNames, LabelError> {
    match &self.labels {
      Some(path) => ClassNames::from_file(path),
      None => {
        info!("未提供类别名称文件，标签只显示置信度");
        Ok(ClassNames::default())
      }
    }
  }

  pub fn build_draw(&self, labels: Arc<ClassNames>) -> Result<Draw, DrawError> {
    let draw = Draw::new(labels);
    match &self.font {
      Some(path) => Ok(draw.with_font(Draw::load_font(path)?)),
      None => Ok(draw),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct TestArgs {
    #[command(flatten)]
    common: CommonArgs,
  }

  #[test]
  fn command_line_overrides_url_query() {
    let args = TestArgs::parse_from([
      "test",
      "--model",
      "replay:///tmp/out.json?conf=0.3&size=320",
      "--input",
      "image:///tmp/a.png",
      "--output",
      "log://",
      "--confidence",
      "0.6",
      "--per-class-nms",
    ]);
    let config = args.common.detector_config().unwrap();
    assert_eq!(config.conf_threshold, 0.6);
    assert_eq!(config.preprocess.input_size, 320);
    assert_eq!(config.nms_mode, NmsMode::PerClass);
  }

  #[test]
  fn out_of_range_threshold_is_rejected() {
    let args = TestArgs::parse_from([
      "test",
      "--model",
      "replay:///tmp/out.json",
      "--input",
      "image:///tmp/a.png",
      "--output",
      "log://",
      "--nms-threshold",
      "1.5",
    ]);
    assert!(args.common.detector_config().is_err());
  }

  #[test]
  fn missing_labels_give_empty_table() {
    let args = TestArgs::parse_from([
      "test",
      "--model",
      "replay:///tmp/out.json",
      "--input",
      "image:///tmp/a.png",
      "--output",
      "log://",
    ]);
    assert!(args.common.load_labels().unwrap().is_empty());
  }
}
