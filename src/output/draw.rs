// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::{path::Path, sync::Arc};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::{
  frame::BgrFrame,
  geometry::{DetectResult, Detection},
  labels::{ClassNames, LabelError},
};

const LABEL_FONT_SIZE: f32 = 20.0;
const BOX_THICKNESS: i32 = 3;
// RGB，对应 BGR (255, 178, 50)
const BOX_COLOR: [u8; 3] = [50, 178, 255];
const LABEL_BACKGROUND: [u8; 3] = [255, 255, 255];
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

/// 内嵌的默认字体
pub fn default_font() -> FontArc {
  FontArc::try_from_slice(DEFAULT_FONT).expect("无法加载嵌入的字体文件")
}

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("标签错误: {0}")]
  Label(#[from] LabelError),
  #[error("无法读取字体文件 {path}: {source}")]
  FontIo {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
  #[error("无法写入记录文件 {path}: {source}")]
  RecordIo {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// 在帧上绘制检测框与标签
///
/// 默认使用内嵌字体，可用 `with_font` 替换。
#[derive(Clone)]
pub struct Draw {
  labels: Arc<ClassNames>,
  font: FontArc,
  font_size: f32,
  box_color: [u8; 3],
  thickness: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(Arc::new(ClassNames::default()))
  }
}

impl Draw {
  pub fn new(labels: Arc<ClassNames>) -> Self {
    Self {
      labels,
      font: default_font(),
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = font;
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn labels(&self) -> &Arc<ClassNames> {
    &self.labels
  }

  pub fn load_font<P: AsRef<Path>>(path: P) -> Result<FontArc, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| DrawError::FontIo {
      path: path.display().to_string(),
      source,
    })?;
    let font =
      FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.display().to_string()))?;
    info!("加载字体: {}", path.display());
    Ok(font)
  }

  /// 复制一份 RGB 图像并绘制全部检测结果
  pub fn draw_detections(
    &self,
    frame: &BgrFrame,
    result: &DetectResult,
  ) -> Result<RgbImage, DrawError> {
    let mut image = frame.to_rgb_image();
    for detection in result {
      let label = self.labels.label(detection)?;
      self.draw_box(&mut image, detection);
      self.draw_label(&mut image, detection, &label);
    }
    Ok(image)
  }

  fn draw_box(&self, image: &mut RgbImage, detection: &Detection) {
    let bbox = detection.bbox();
    let left = bbox.x.round() as i32;
    let top = bbox.y.round() as i32;
    let width = bbox.width.round() as i32;
    let height = bbox.height.round() as i32;

    for inset in 0..self.thickness {
      let w = width - 2 * inset;
      let h = height - 2 * inset;
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at(left + inset, top + inset).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  // 标签放在框的上沿，靠近图像顶部时下移以保持可见
  fn draw_label(&self, image: &mut RgbImage, detection: &Detection, label: &str) {
    let font = &self.font;
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, label);
    if text_width == 0 || text_height == 0 {
      return;
    }

    let left = detection.bbox().x.round() as i32;
    let top = (detection.bbox().y.round() as i32).max(text_height as i32);
    let label_top = top - text_height as i32;

    let background = Rect::at(left, label_top).of_size(text_width, text_height);
    draw_filled_rect_mut(image, background, Rgb(LABEL_BACKGROUND));
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      left,
      label_top,
      scale,
      font,
      label,
    );
  }
}

/// 以文本形式记录检测结果，每行一个检测
///
/// 格式：`名称或编号, 置信度, left, top, width, height`
pub struct Record {
  labels: Arc<ClassNames>,
  label_with_name: bool,
}

impl Record {
  pub fn new(labels: Arc<ClassNames>, label_with_name: bool) -> Self {
    Self {
      labels,
      label_with_name,
    }
  }

  pub fn lines(&self, result: &DetectResult) -> Result<Vec<String>, LabelError> {
    result
      .iter()
      .map(|item| {
        let name = if self.label_with_name && !self.labels.is_empty() {
          self.labels.name(item.class_id())?.to_string()
        } else {
          item.class_id().to_string()
        };
        let bbox = item.bbox();
        Ok(format!(
          "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
          name,
          item.confidence(),
          bbox.x,
          bbox.y,
          bbox.width,
          bbox.height
        ))
      })
      .collect()
  }

  /// 写入与图像同名的 `.txt` 文件
  pub fn record(&self, result: &DetectResult, path: &Path) -> Result<(), DrawError> {
    let lines = self.lines(result)?;
    let path = path.with_extension("txt");
    std::fs::write(&path, lines.join("\n")).map_err(|source| DrawError::RecordIo {
      path: path.display().to_string(),
      source,
    })
  }
}
