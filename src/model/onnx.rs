// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

use ort::session::Session;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Blob, InferenceEngine, ModelError, RawOutputTensor},
};

fn onnx_error(e: ort::Error) -> ModelError {
  ModelError::OnnxError(e.to_string())
}

pub struct OnnxEngine {
  session: Session,
  input_name: String,
  output_names: Vec<String>,
}

impl FromUrlWithScheme for OnnxEngine {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxEngine {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = crate::url_path(url);
    let threads = url
      .query_pairs()
      .find(|(k, _)| k == "threads")
      .and_then(|(_, v)| v.parse::<usize>().ok());

    info!("加载 ONNX 模型: {}", path);
    let mut builder = Session::builder().map_err(onnx_error)?;
    if let Some(threads) = threads {
      builder = builder.with_intra_threads(threads).map_err(onnx_error)?;
    }
    let session = builder.commit_from_file(&path).map_err(onnx_error)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| ModelError::ModelInvalid("模型没有输入层".to_string()))?;
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    if output_names.is_empty() {
      return Err(ModelError::ModelInvalid("模型没有输出层".to_string()));
    }

    info!("模型输入: {}, 输出: {:?}", input_name, output_names);
    Ok(Self {
      session,
      input_name,
      output_names,
    })
  }
}

impl InferenceEngine for OnnxEngine {
  type Error = ModelError;

  fn output_names(&self) -> &[String] {
    &self.output_names
  }

  fn forward(&mut self, blob: &Blob) -> Result<Vec<RawOutputTensor>, Self::Error> {
    let shape = blob.shape();
    let input = ort::value::Value::from_array((shape.as_slice(), blob.as_slice().to_vec()))
      .map_err(onnx_error)?;

    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => input])
      .map_err(onnx_error)?;

    let mut tensors = Vec::with_capacity(self.output_names.len());
    for name in &self.output_names {
      let (dims, data) = outputs[name.as_str()]
        .try_extract_tensor::<f32>()
        .map_err(onnx_error)?;
      let dims: Vec<i64> = dims.iter().copied().collect();
      debug!("输出 {} 形状: {:?}", name, dims);
      tensors.push(RawOutputTensor::from_shape(&dims, data.to_vec())?);
    }

    Ok(tensors)
  }
}
