// 该文件是 Kanjian （看见） 项目的一部分。
// src/labels.rs - 类别名称表
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

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::geometry::Detection;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取类别文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("类别编号 {class_id} 超出类别表范围 (共 {len} 类)")]
  OutOfRange { class_id: usize, len: usize },
}

/// 按类别编号索引的名称表，每行一个名称
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
  names: Box<[String]>,
}

impl ClassNames {
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let names = Self::from_lines(&content);
    info!("从 {} 加载了 {} 个类别名称", path.display(), names.len());
    Ok(names)
  }

  pub fn from_lines(content: &str) -> Self {
    Self {
      names: content.lines().map(String::from).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: usize) -> Result<&str, LabelError> {
    self
      .names
      .get(class_id)
      .map(String::as_str)
      .ok_or(LabelError::OutOfRange {
        class_id,
        len: self.names.len(),
      })
  }

  /// 生成显示用标签
  ///
  /// 名称表为空时只显示置信度；非空时类别编号越界视为错误。
  pub fn label(&self, detection: &Detection) -> Result<String, LabelError> {
    let score = format!("{:.2}", detection.confidence());
    if self.is_empty() {
      return Ok(score);
    }
    let name = self.name(detection.class_id())?;
    Ok(format!("{}: {}", name, score))
  }
}

impl<S: Into<String>> FromIterator<S> for ClassNames {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}
