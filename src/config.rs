// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 检测参数配置
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

//! 检测流程的全部可调参数。
//!
//! 参数可以通过模型 URL 的查询串给出，例如
//! `onnx:///data/yolov7-tiny.onnx?conf=0.5&nms=0.4&size=416&swap_rb=1&nms_mode=agnostic`，
//! 命令行参数会在此基础上再覆盖一次。

use std::str::FromStr;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::model::{NmsMode, NmsModeError, NmsParams};

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_INPUT_SIZE: u32 = 416;
pub const DEFAULT_SCALE: f32 = 1.0 / 255.0;
pub const DEFAULT_SWAP_RB: bool = true;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("参数 {name} 超出范围: {value}")]
  OutOfRange { name: &'static str, value: f32 },
  #[error("网络输入尺寸必须大于 0")]
  ZeroInputSize,
  #[error("NMS 模式错误: {0}")]
  NmsMode(#[from] NmsModeError),
}

/// 输入张量的预处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
  /// 网络输入边长，帧直接缩放为该尺寸的正方形
  pub input_size: u32,
  /// 像素缩放系数
  pub scale: f32,
  /// 是否交换 R/B 通道
  pub swap_rb: bool,
}

impl Default for PreprocessConfig {
  fn default() -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      scale: DEFAULT_SCALE,
      swap_rb: DEFAULT_SWAP_RB,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  /// 置信度阈值，严格大于才保留
  pub conf_threshold: f32,
  /// NMS IoU 阈值，严格大于才抑制
  pub nms_threshold: f32,
  pub nms_mode: NmsMode,
  /// 每帧最多保留的检测数
  pub top_k: Option<usize>,
  pub preprocess: PreprocessConfig,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      nms_mode: NmsMode::default(),
      top_k: None,
      preprocess: PreprocessConfig::default(),
    }
  }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
  match value {
    "" | "1" | "true" | "yes" => Ok(true),
    "0" | "false" | "no" => Ok(false),
    _ => Err(ConfigError::InvalidValue {
      key: key.to_string(),
      value: value.to_string(),
    }),
  }
}

impl DetectorConfig {
  pub fn conf_threshold(mut self, threshold: f32) -> Self {
    self.conf_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn nms_mode(mut self, mode: NmsMode) -> Self {
    self.nms_mode = mode;
    self
  }

  pub fn top_k(mut self, top_k: Option<usize>) -> Self {
    self.top_k = top_k;
    self
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.preprocess.input_size = size;
    self
  }

  /// 抑制阶段的参数，得分阈值沿用置信度阈值
  pub fn nms_params(&self) -> NmsParams {
    NmsParams {
      score_threshold: self.conf_threshold,
      nms_threshold: self.nms_threshold,
      mode: self.nms_mode,
      top_k: self.top_k,
    }
  }

  /// 用 URL 查询串覆盖参数，未知的键保持不变
  pub fn apply_query(mut self, url: &Url) -> Result<Self, ConfigError> {
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "conf" => self.conf_threshold = parse_value(&key, &value)?,
        "nms" => self.nms_threshold = parse_value(&key, &value)?,
        "nms_mode" => self.nms_mode = value.parse::<NmsMode>()?,
        "top_k" => self.top_k = Some(parse_value(&key, &value)?),
        "size" => self.preprocess.input_size = parse_value(&key, &value)?,
        "scale" => self.preprocess.scale = parse_value(&key, &value)?,
        "swap_rb" => self.preprocess.swap_rb = parse_flag(&key, &value)?,
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }
    self.validate()?;
    Ok(self)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.conf_threshold) {
      return Err(ConfigError::OutOfRange {
        name: "conf_threshold",
        value: self.conf_threshold,
      });
    }
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      return Err(ConfigError::OutOfRange {
        name: "nms_threshold",
        value: self.nms_threshold,
      });
    }
    if self.preprocess.input_size == 0 {
      return Err(ConfigError::ZeroInputSize);
    }
    if !(self.preprocess.scale > 0.0) {
      return Err(ConfigError::OutOfRange {
        name: "scale",
        value: self.preprocess.scale,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_reference_network() {
    let config = DetectorConfig::default();
    assert_eq!(config.conf_threshold, 0.5);
    assert_eq!(config.nms_threshold, 0.4);
    assert_eq!(config.nms_mode, NmsMode::ClassAgnostic);
    assert_eq!(config.preprocess.input_size, 416);
    assert!(config.preprocess.swap_rb);
    assert!((config.preprocess.scale - 1.0 / 255.0).abs() < f32::EPSILON);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn query_overrides_fields() {
    let url =
      Url::parse("onnx:///m.onnx?conf=0.25&nms=0.45&size=640&swap_rb=0&nms_mode=per-class&top_k=100")
        .unwrap();
    let config = DetectorConfig::default().apply_query(&url).unwrap();
    assert_eq!(config.conf_threshold, 0.25);
    assert_eq!(config.nms_threshold, 0.45);
    assert_eq!(config.preprocess.input_size, 640);
    assert!(!config.preprocess.swap_rb);
    assert_eq!(config.nms_mode, NmsMode::PerClass);
    assert_eq!(config.top_k, Some(100));
  }

  #[test]
  fn query_rejects_garbage() {
    let url = Url::parse("onnx:///m.onnx?conf=abc").unwrap();
    let err = DetectorConfig::default().apply_query(&url).unwrap_err();
    assert_eq!(
      err,
      ConfigError::InvalidValue {
        key: "conf".to_string(),
        value: "abc".to_string()
      }
    );
  }

  #[test]
  fn unknown_nms_mode_is_typed() {
    let url = Url::parse("onnx:///m.onnx?nms_mode=soft").unwrap();
    let err = DetectorConfig::default().apply_query(&url).unwrap_err();
    assert_eq!(
      err,
      ConfigError::NmsMode(NmsModeError::Unknown("soft".to_string()))
    );
  }

  #[test]
  fn thresholds_out_of_range_are_rejected() {
    let err = DetectorConfig::default()
      .nms_threshold(1.5)
      .validate()
      .unwrap_err();
    assert_eq!(
      err,
      ConfigError::OutOfRange {
        name: "nms_threshold",
        value: 1.5
      }
    );
    assert_eq!(
      DetectorConfig::default().input_size(0).validate(),
      Err(ConfigError::ZeroInputSize)
    );
  }

  #[test]
  fn nms_params_reuse_confidence_threshold() {
    let params = DetectorConfig::default().conf_threshold(0.3).nms_params();
    assert_eq!(params.score_threshold, 0.3);
    assert_eq!(params.nms_threshold, 0.4);
    assert_eq!(params.top_k, None);
  }
}
