// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/tensor.rs - 网络原始输出张量
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

/// 每行前 5 个值: cx, cy, w, h, objectness
pub const BOX_FIELDS: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("输出张量列数 {cols} 不足，至少需要 {min} 列")]
  TooFewColumns { cols: usize, min: usize },
  #[error("张量数据长度 {len} 与形状 {rows}x{cols} 不匹配")]
  ShapeMismatch { len: usize, rows: usize, cols: usize },
  #[error("不支持的张量形状: {0:?}")]
  UnsupportedShape(Vec<i64>),
}

/// 一个输出头的全部锚框预测，行优先存储
///
/// 每行长度为 `5 + 类别数`，坐标相对网络输入归一化到 [0, 1]。
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutputTensor {
  data: Box<[f32]>,
  rows: usize,
  cols: usize,
}

impl RawOutputTensor {
  pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> Result<Self, TensorError> {
    if cols <= BOX_FIELDS {
      return Err(TensorError::TooFewColumns {
        cols,
        min: BOX_FIELDS + 1,
      });
    }
    if rows.checked_mul(cols) != Some(data.len()) {
      return Err(TensorError::ShapeMismatch {
        len: data.len(),
        rows,
        cols,
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      rows,
      cols,
    })
  }

  /// 从推理引擎给出的形状构造
  ///
  /// 接受 `[N, C]`，以及前导维度全为 1 的 `[1, N, C]`、`[1, 1, N, C]`。
  pub fn from_shape(shape: &[i64], data: Vec<f32>) -> Result<Self, TensorError> {
    let unsupported = || TensorError::UnsupportedShape(shape.to_vec());

    let [leading @ .., rows, cols] = shape else {
      return Err(unsupported());
    };
    if leading.iter().any(|&d| d != 1) || *rows < 0 || *cols < 0 {
      return Err(unsupported());
    }

    Self::new(data, *rows as usize, *cols as usize)
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn num_classes(&self) -> usize {
    self.cols - BOX_FIELDS
  }

  pub fn row(&self, index: usize) -> &[f32] {
    let start = index * self.cols;
    &self.data[start..start + self.cols]
  }

  /// 按固定步长切分的行迭代器，不产生额外分配
  pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, f32> {
    self.data.chunks_exact(self.cols)
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}
