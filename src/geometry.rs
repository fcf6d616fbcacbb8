// 该文件是 Kanjian （看见） 项目的一部分。
// src/geometry.rs - 边界框与检测结果定义
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

/// 像素坐标系下的轴对齐边界框
///
/// 原点在左上角。`x`、`y` 可以为负，也可以超出画面范围，核心流程不做裁剪。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
  /// 左上角 x 坐标
  pub x: f32,
  /// 左上角 y 坐标
  pub y: f32,
  /// 宽度
  pub width: f32,
  /// 高度
  pub height: f32,
}

impl BBox {
  pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由中心点格式转换为左上角格式
  pub fn from_center(center_x: f32, center_y: f32, width: f32, height: f32) -> Self {
    Self {
      x: center_x - width / 2.0,
      y: center_y - height / 2.0,
      width,
      height,
    }
  }

  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.y + self.height
  }

  /// 面积，宽或高为负时按 0 计
  pub fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }

  pub fn intersection_area(&self, other: &BBox) -> f32 {
    let left = self.x.max(other.x);
    let top = self.y.max(other.y);
    let right = self.right().min(other.right());
    let bottom = self.bottom().min(other.bottom());

    (right - left).max(0.0) * (bottom - top).max(0.0)
  }

  /// 交并比 (IoU)，并集为 0 时返回 0
  pub fn iou(&self, other: &BBox) -> f32 {
    let intersection = self.intersection_area(other);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 单个检测结果
///
/// 构造后不可修改，生命周期限于一帧。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  bbox: BBox,
  class_id: usize,
  confidence: f32,
}

impl Detection {
  pub fn new(bbox: BBox, class_id: usize, confidence: f32) -> Self {
    Self {
      bbox,
      class_id,
      confidence,
    }
  }

  pub fn bbox(&self) -> &BBox {
    &self.bbox
  }

  pub fn class_id(&self) -> usize {
    self.class_id
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }
}

/// 一帧的最终检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl FromIterator<Detection> for DetectResult {
  fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
    iter.into_iter().collect::<Vec<_>>().into()
  }
}

impl<'a> IntoIterator for &'a DetectResult {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn derived_edges_and_area() {
    let bbox = BBox::new(-10.0, 5.0, 30.0, 20.0);
    assert_eq!(bbox.right(), 20.0);
    assert_eq!(bbox.bottom(), 25.0);
    assert_eq!(bbox.area(), 600.0);
  }

  #[test]
  fn center_format_conversion() {
    let bbox = BBox::from_center(320.0, 240.0, 128.0, 192.0);
    assert_eq!(bbox, BBox::new(256.0, 144.0, 128.0, 192.0));
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(a.iou(&a), 1.0);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(20.0, 20.0, 10.0, 10.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_of_nested_boxes() {
    let a = BBox::new(0.0, 0.0, 100.0, 100.0);
    let b = BBox::new(0.0, 0.0, 100.0, 70.0);
    assert!((a.iou(&b) - 0.7).abs() < 1e-6);
    assert_eq!(a.iou(&b), b.iou(&a));
  }

  #[test]
  fn zero_area_boxes_never_overlap() {
    let a = BBox::new(5.0, 5.0, 0.0, 0.0);
    let b = BBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(a.iou(&b), 0.0);
    assert_eq!(a.iou(&a), 0.0);
  }

  #[test]
  fn detect_result_collects_in_order() {
    let result: DetectResult = (0..3)
      .map(|i| Detection::new(BBox::default(), i, 0.9))
      .collect();
    assert_eq!(result.len(), 3);
    let ids: Vec<usize> = result.iter().map(Detection::class_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
  }
}
