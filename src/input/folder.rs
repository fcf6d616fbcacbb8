// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/folder.rs - 图像目录输入
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

//! 按文件名顺序逐张读取目录中的图像，把一组静态图像当作视频流处理。
//!
//! 某张图像解码失败时视为流结束，与摄像头掉线的处理一致。

use std::{
  path::{Path, PathBuf},
  vec::IntoIter,
};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::BgrFrame};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum FolderInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无法读取目录 {path}: {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

pub struct FolderInput {
  files: IntoIter<PathBuf>,
}

impl FromUrlWithScheme for FolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderInput {
  type Error = FolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FolderInputError::SchemeMismatch);
    }
    Self::open(crate::url_path(url))
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let ext = ext.to_ascii_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

impl FolderInput {
  pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, FolderInputError> {
    let dir = dir.as_ref();
    let read_dir = |source| FolderInputError::ReadDir {
      path: dir.to_path_buf(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir)? {
      let path = entry.map_err(read_dir)?.path();
      if path.is_file() && is_image(&path) {
        files.push(path);
      }
    }
    files.sort();

    info!("目录 {} 中共有 {} 张图像", dir.display(), files.len());
    Ok(Self {
      files: files.into_iter(),
    })
  }

  /// 剩余未读取的图像数量
  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

impl Iterator for FolderInput {
  type Item = BgrFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    debug!("读取图像: {}", path.display());

    let decoded = ImageReader::open(&path)
      .map_err(image::ImageError::IoError)
      .and_then(|reader| reader.decode());
    match decoded {
      Ok(image) => Some(BgrFrame::from(image.to_rgb8())),
      Err(e) => {
        error!("图像 {} 读取失败，结束输入: {}", path.display(), e);
        self.files = Vec::new().into_iter();
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn reads_images_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

    let input = FolderInput::open(dir.path()).unwrap();
    assert_eq!(input.remaining(), 2);

    let sizes: Vec<u32> = input.map(|frame| frame.width()).collect();
    assert_eq!(sizes, vec![2, 4]);
  }

  #[test]
  fn broken_image_ends_stream() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(2, 2).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("b.png"), b"not a png").unwrap();
    RgbImage::new(2, 2).save(dir.path().join("c.png")).unwrap();

    let input = FolderInput::open(dir.path()).unwrap();
    assert_eq!(input.count(), 1);
  }

  #[test]
  fn missing_directory_is_error() {
    assert!(matches!(
      FolderInput::open("/nonexistent/kanjian/frames"),
      Err(FolderInputError::ReadDir { .. })
    ));
  }
}
