// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型与检测后处理
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
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{ConfigError, DetectorConfig},
  frame::BgrFrame,
  geometry::DetectResult,
};

mod blob;
mod decode;
mod filter;
mod nms;
#[cfg(feature = "onnx")]
mod onnx;
mod replay;
mod tensor;

pub use self::blob::Blob;
pub use self::nms::{NmsMode, NmsModeError, NmsParams, SuppressionStep, suppress, suppress_with_trace};
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxEngine;
pub use self::replay::{RecordedFrame, RecordedTensor, Recording, ReplayEngine};
pub use self::tensor::{BOX_FIELDS, RawOutputTensor, TensorError};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 外部推理引擎
///
/// 输入为归一化的正方形张量，输出为一个或多个原始输出张量（取决于网络的输出头数量）。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 输出层名称，在加载模型时一次性确定
  fn output_names(&self) -> &[String];

  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawOutputTensor>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("推理引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("输出张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("录制文件解析错误: {0}")]
  RecordingError(#[from] serde_json::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[cfg(feature = "onnx")]
  #[error("ONNX Runtime 错误: {0}")]
  OnnxError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 解码全部输出张量，按置信度筛选，再做非极大值抑制
///
/// 输出按置信度降序排列。
pub fn postprocess(
  outputs: &[RawOutputTensor],
  frame_width: u32,
  frame_height: u32,
  config: &DetectorConfig,
) -> DetectResult {
  let candidates = decode::decode_all(outputs, frame_width, frame_height);
  let detections = filter::filter_by_confidence(candidates, config.conf_threshold);
  let keep = suppress(&detections, &config.nms_params());

  debug!(
    "后处理: {} 个输出张量, {} 个候选通过阈值, 保留 {} 个",
    outputs.len(),
    detections.len(),
    keep.len()
  );

  keep.into_iter().map(|idx| detections[idx]).collect()
}

/// 单帧检测流程：预处理、推理、解码、筛选、抑制
///
/// 帧与帧之间不保留任何状态。
pub struct Detector<E> {
  engine: E,
  config: DetectorConfig,
}

impl<E: InferenceEngine> Detector<E> {
  pub fn new(engine: E, config: DetectorConfig) -> Result<Self, ModelError> {
    config.validate()?;
    debug!("模型输出层: {:?}", engine.output_names());
    Ok(Self { engine, config })
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }
}

impl<E: InferenceEngine> Model for Detector<E> {
  type Input = BgrFrame;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&mut self, frame: &Self::Input) -> Result<Self::Output, Self::Error> {
    let blob = Blob::from_frame(frame, &self.config.preprocess);

    debug!("执行模型推理");
    let outputs = self
      .engine
      .forward(&blob)
      .map_err(|e| ModelError::Engine(Box::new(e)))?;

    let result = postprocess(&outputs, frame.width(), frame.height(), &self.config);
    debug!("检测结果: {:?}", result);
    Ok(result)
  }
}

/// 按 URL 方案选择的推理引擎
pub enum EngineWrapper {
  #[cfg(feature = "onnx")]
  Onnx(OnnxEngine),
  Replay(ReplayEngine),
}

impl FromUrl for EngineWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "onnx")]
    {
      if url.scheme() == OnnxEngine::SCHEME {
        return Ok(EngineWrapper::Onnx(OnnxEngine::from_url(url)?));
      }
    }

    if url.scheme() == ReplayEngine::SCHEME {
      return Ok(EngineWrapper::Replay(ReplayEngine::from_url(url)?));
    }

    Err(ModelError::SchemeMismatch(format!(
      "不支持的模型方案 '{}'",
      url.scheme()
    )))
  }
}

impl InferenceEngine for EngineWrapper {
  type Error = ModelError;

  fn output_names(&self) -> &[String] {
    match self {
      #[cfg(feature = "onnx")]
      EngineWrapper::Onnx(engine) => engine.output_names(),
      EngineWrapper::Replay(engine) => engine.output_names(),
    }
  }

  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawOutputTensor>, Self::Error> {
    match self {
      #[cfg(feature = "onnx")]
      EngineWrapper::Onnx(engine) => engine.forward(blob),
      EngineWrapper::Replay(engine) => engine.forward(blob),
    }
  }
}

impl Detector<EngineWrapper> {
  /// 由模型 URL 加载引擎，使用给定的配置
  pub fn from_url_with(url: &Url, config: DetectorConfig) -> Result<Self, ModelError> {
    let engine = EngineWrapper::from_url(url)?;
    Detector::new(engine, config)
  }
}

impl FromUrl for Detector<EngineWrapper> {
  type Error = ModelError;

  /// 查询串中的参数覆盖默认配置
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let config = DetectorConfig::default().apply_query(url)?;
    Detector::from_url_with(url, config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(cx: f32, cy: f32, w: f32, h: f32, scores: &[f32]) -> Vec<f32> {
    let mut row = vec![cx, cy, w, h, 1.0];
    row.extend_from_slice(scores);
    row
  }

  #[test]
  fn postprocess_runs_decode_filter_suppress() {
    let mut data = row(0.5, 0.5, 0.5, 0.5, &[0.9, 0.1]);
    data.extend(row(0.5, 0.5, 0.5, 0.45, &[0.1, 0.8]));
    data.extend(row(0.1, 0.1, 0.1, 0.1, &[0.3, 0.2]));
    let tensor = RawOutputTensor::new(data, 3, 7).unwrap();

    let result = postprocess(&[tensor], 100, 100, &DetectorConfig::default());
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].class_id(), 0);
    assert_eq!(result.items[0].confidence(), 0.9);
  }

  #[test]
  fn postprocess_without_outputs_is_empty() {
    let result = postprocess(&[], 640, 480, &DetectorConfig::default());
    assert!(result.is_empty());
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("tflite:///model.tflite").unwrap();
    assert!(matches!(
      EngineWrapper::from_url(&url),
      Err(ModelError::SchemeMismatch(_))
    ));
  }
}
