// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 录制输出回放引擎
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

//! 回放事先录制的网络输出，不做真实推理。
//!
//! 录制文件为 JSON：
//!
//! ```json
//! {
//!   "output_names": ["yolo_16", "yolo_23"],
//!   "frames": [
//!     { "outputs": [ { "shape": [1, 85], "data": [0.5, 0.5, 0.2, 0.4, 0.9, 0.1] } ] }
//!   ]
//! }
//! ```
//!
//! 每次前向推理按顺序取一帧，取完后从头循环。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Blob, InferenceEngine, ModelError, RawOutputTensor},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedTensor {
  pub shape: Vec<i64>,
  pub data: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedFrame {
  pub outputs: Vec<RecordedTensor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
  #[serde(default)]
  pub output_names: Vec<String>,
  pub frames: Vec<RecordedFrame>,
}

pub struct ReplayEngine {
  output_names: Vec<String>,
  frames: Vec<Vec<RawOutputTensor>>,
  cursor: usize,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = crate::url_path(url);
    info!("加载录制文件: {}", path);
    let content = std::fs::read_to_string(&path)?;
    let recording: Recording = serde_json::from_str(&content)?;
    Self::from_recording(recording)
  }
}

impl ReplayEngine {
  pub fn new(output_names: Vec<String>, frames: Vec<Vec<RawOutputTensor>>) -> Self {
    Self {
      output_names,
      frames,
      cursor: 0,
    }
  }

  pub fn from_recording(recording: Recording) -> Result<Self, ModelError> {
    let frames = recording
      .frames
      .into_iter()
      .map(|frame| {
        frame
          .outputs
          .into_iter()
          .map(|t| RawOutputTensor::from_shape(&t.shape, t.data))
          .collect::<Result<Vec<_>, _>>()
      })
      .collect::<Result<Vec<_>, _>>()?;

    info!("录制文件包含 {} 帧输出", frames.len());
    Ok(Self::new(recording.output_names, frames))
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ModelError;

  fn output_names(&self) -> &[String] {
    &self.output_names
  }

  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawOutputTensor>, Self::Error> {
    if self.frames.is_empty() {
      return Ok(Vec::new());
    }

    let index = self.cursor % self.frames.len();
    self.cursor = self.cursor.wrapping_add(1);
    debug!("回放第 {} 帧输出 (输入尺寸 {})", index, blob.size());
    Ok(self.frames[index].clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::PreprocessConfig, frame::BgrFrame};

  fn blob() -> Blob {
    let config = PreprocessConfig {
      input_size: 4,
      ..PreprocessConfig::default()
    };
    Blob::from_frame(&BgrFrame::with_shape(4, 4).unwrap(), &config)
  }

  #[test]
  fn replays_frames_cyclically() {
    let a = RawOutputTensor::new(vec![0.0; 6], 1, 6).unwrap();
    let b = RawOutputTensor::new(vec![0.0; 12], 2, 6).unwrap();
    let mut engine = ReplayEngine::new(vec!["out".into()], vec![vec![a], vec![b]]);

    let rows: Vec<usize> = (0..3)
      .map(|_| engine.forward(&blob()).unwrap()[0].rows())
      .collect();
    assert_eq!(rows, vec![1, 2, 1]);
  }

  #[test]
  fn empty_recording_yields_no_outputs() {
    let mut engine = ReplayEngine::new(Vec::new(), Vec::new());
    assert!(engine.forward(&blob()).unwrap().is_empty());
  }

  #[test]
  fn parses_recording_json() {
    let json = r#"{
      "output_names": ["yolo_16"],
      "frames": [{ "outputs": [{ "shape": [1, 1, 6], "data": [0.5, 0.5, 0.2, 0.2, 1.0, 0.9] }] }]
    }"#;
    let recording: Recording = serde_json::from_str(json).unwrap();
    let engine = ReplayEngine::from_recording(recording).unwrap();
    assert_eq!(engine.output_names(), &["yolo_16".to_string()]);
    assert_eq!(engine.len(), 1);
  }

  #[test]
  fn malformed_tensor_shape_is_rejected() {
    let recording = Recording {
      output_names: Vec::new(),
      frames: vec![RecordedFrame {
        outputs: vec![RecordedTensor {
          shape: vec![2, 6],
          data: vec![0.0; 6],
        }],
      }],
    };
    assert!(matches!(
      ReplayEngine::from_recording(recording),
      Err(ModelError::Tensor(_))
    ));
  }
}
