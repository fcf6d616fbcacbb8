// 该文件是 Kanjian （看见） 项目的一部分。
// tests/postprocess_tests.rs - 解码、筛选与 NMS 的场景测试
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

use kanjian::{
  config::DetectorConfig,
  geometry::{BBox, Detection},
  model::{NmsParams, RawOutputTensor, postprocess, suppress},
};

fn approx(a: f32, b: f32) -> bool {
  (a - b).abs() < 1e-3
}

fn det(x: f32, y: f32, w: f32, h: f32, class_id: usize, confidence: f32) -> Detection {
  Detection::new(BBox::new(x, y, w, h), class_id, confidence)
}

// 关闭抑制，只看解码与筛选
fn no_suppression() -> DetectorConfig {
  DetectorConfig::default().nms_threshold(1.0)
}

#[test]
fn single_row_is_denormalized_to_frame_size() {
  let tensor = RawOutputTensor::new(vec![0.5, 0.5, 0.2, 0.4, 0.9, 0.1, 0.7, 0.2], 1, 8).unwrap();
  let result = postprocess(&[tensor], 640, 480, &no_suppression());

  assert_eq!(result.len(), 1);
  let item = &result.items[0];
  assert_eq!(item.class_id(), 1);
  assert_eq!(item.confidence(), 0.7);
  assert!(approx(item.bbox().x, 256.0));
  assert!(approx(item.bbox().y, 144.0));
  assert!(approx(item.bbox().width, 128.0));
  assert!(approx(item.bbox().height, 192.0));
}

#[test]
fn confidence_equal_to_threshold_is_dropped() {
  let tensor = RawOutputTensor::new(vec![0.5, 0.5, 0.2, 0.2, 1.0, 0.5, 0.1], 1, 7).unwrap();
  assert!(postprocess(&[tensor], 100, 100, &no_suppression()).is_empty());
}

#[test]
fn negative_box_size_is_rejected() {
  let tensor = RawOutputTensor::new(vec![0.5, 0.5, -0.2, -0.4, 1.0, 0.9], 1, 6).unwrap();
  assert!(postprocess(&[tensor], 640, 480, &DetectorConfig::default()).is_empty());
}

#[test]
fn low_scores_produce_nothing() {
  let tensor = RawOutputTensor::new(vec![0.5, 0.5, 0.2, 0.2, 0.99, 0.3, 0.1, 0.2], 1, 8).unwrap();
  assert!(postprocess(&[tensor], 100, 100, &no_suppression()).is_empty());
}

#[test]
fn zero_output_tensors_produce_nothing() {
  assert!(postprocess(&[], 640, 480, &DetectorConfig::default()).is_empty());
}

#[test]
fn multiple_output_heads_are_merged() {
  let small = RawOutputTensor::new(vec![0.2, 0.2, 0.1, 0.1, 1.0, 0.9, 0.0], 1, 7).unwrap();
  let large = RawOutputTensor::new(vec![0.8, 0.8, 0.1, 0.1, 1.0, 0.0, 0.6], 1, 7).unwrap();
  let result = postprocess(&[small, large], 100, 100, &DetectorConfig::default());

  let classes: Vec<usize> = result.iter().map(Detection::class_id).collect();
  assert_eq!(classes, vec![0, 1]);
}

#[test]
fn overlapping_same_class_keeps_best() {
  let dets = [
    det(0.0, 0.0, 100.0, 100.0, 0, 0.9),
    det(0.0, 0.0, 100.0, 70.0, 0, 0.6),
  ];
  assert_eq!(suppress(&dets, &NmsParams::default()), vec![0]);
}

#[test]
fn overlapping_different_classes_are_suppressed_across_classes() {
  let dets = [
    det(0.0, 0.0, 100.0, 100.0, 2, 0.8),
    det(0.0, 0.0, 100.0, 90.0, 7, 0.7),
  ];
  assert_eq!(suppress(&dets, &NmsParams::default()), vec![0]);
}

#[test]
fn iou_equal_to_threshold_is_not_suppressed() {
  let dets = [
    det(0.0, 0.0, 100.0, 100.0, 0, 0.9),
    det(0.0, 0.0, 100.0, 40.0, 0, 0.8),
  ];
  assert_eq!(suppress(&dets, &NmsParams::default()), vec![0, 1]);
}

#[test]
fn per_class_config_keeps_overlapping_classes() {
  let mut data = vec![0.5, 0.5, 0.5, 0.5, 1.0, 0.9, 0.1];
  data.extend([0.5, 0.5, 0.5, 0.45, 1.0, 0.1, 0.8]);
  let tensor = RawOutputTensor::new(data, 2, 7).unwrap();

  let agnostic = postprocess(&[tensor.clone()], 100, 100, &DetectorConfig::default());
  assert_eq!(agnostic.len(), 1);

  let per_class = DetectorConfig::default().nms_mode(kanjian::model::NmsMode::PerClass);
  assert_eq!(postprocess(&[tensor], 100, 100, &per_class).len(), 2);
}
