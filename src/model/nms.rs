// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

//! 贪心非极大值抑制。
//!
//! 候选按置信度降序稳定排序（置信度相同保持原有顺序），每次取剩余中置信度最高者保留，
//! 并丢弃与其 IoU 严格大于阈值的其余候选。默认不区分类别：一个类别的框可以抑制另一个
//! 类别的框；`PerClass` 模式只在同类之间抑制。

use std::str::FromStr;

use thiserror::Error;

use crate::geometry::Detection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NmsModeError {
  #[error("未知的 NMS 模式: {0}")]
  Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NmsMode {
  /// 跨类别抑制
  #[default]
  ClassAgnostic,
  /// 仅同类别之间抑制
  PerClass,
}

impl FromStr for NmsMode {
  type Err = NmsModeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "agnostic" | "class-agnostic" => Ok(NmsMode::ClassAgnostic),
      "per-class" | "class" => Ok(NmsMode::PerClass),
      other => Err(NmsModeError::Unknown(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsParams {
  /// 得分严格大于该值的候选才参与抑制
  pub score_threshold: f32,
  /// IoU 严格大于该值时抑制
  pub nms_threshold: f32,
  pub mode: NmsMode,
  /// 最多保留的数量
  pub top_k: Option<usize>,
}

impl Default for NmsParams {
  fn default() -> Self {
    Self {
      score_threshold: 0.0,
      nms_threshold: crate::config::DEFAULT_NMS_THRESHOLD,
      mode: NmsMode::default(),
      top_k: None,
    }
  }
}

/// 贪心过程中的一次抑制
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressionStep {
  /// 保留者在输入中的下标
  pub kept: usize,
  /// 被抑制者在输入中的下标
  pub suppressed: usize,
  pub iou: f32,
}

/// 返回保留下来的输入下标，按置信度降序
pub fn suppress(detections: &[Detection], params: &NmsParams) -> Vec<usize> {
  run(detections, params, None)
}

/// 同 [`suppress`]，额外返回每一次抑制的记录
pub fn suppress_with_trace(
  detections: &[Detection],
  params: &NmsParams,
) -> (Vec<usize>, Vec<SuppressionStep>) {
  let mut trace = Vec::new();
  let kept = run(detections, params, Some(&mut trace));
  (kept, trace)
}

fn run(
  detections: &[Detection],
  params: &NmsParams,
  mut trace: Option<&mut Vec<SuppressionStep>>,
) -> Vec<usize> {
  let mut order: Vec<usize> = (0..detections.len())
    .filter(|&i| detections[i].confidence() > params.score_threshold)
    .collect();
  // sort_by 为稳定排序
  order.sort_by(|&a, &b| {
    detections[b]
      .confidence()
      .total_cmp(&detections[a].confidence())
  });

  let mut removed = vec![false; detections.len()];
  let mut kept = Vec::new();

  for (pos, &i) in order.iter().enumerate() {
    if removed[i] {
      continue;
    }
    kept.push(i);
    if params.top_k.is_some_and(|k| kept.len() >= k) {
      break;
    }

    let best = &detections[i];
    for &j in &order[pos + 1..] {
      if removed[j] {
        continue;
      }
      let other = &detections[j];
      if params.mode == NmsMode::PerClass && other.class_id() != best.class_id() {
        continue;
      }
      let iou = best.bbox().iou(other.bbox());
      if iou > params.nms_threshold {
        removed[j] = true;
        if let Some(trace) = trace.as_deref_mut() {
          trace.push(SuppressionStep {
            kept: i,
            suppressed: j,
            iou,
          });
        }
      }
    }
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BBox;

  fn det(x: f32, y: f32, w: f32, h: f32, class_id: usize, confidence: f32) -> Detection {
    Detection::new(BBox::new(x, y, w, h), class_id, confidence)
  }

  #[test]
  fn empty_input_empty_output() {
    assert!(suppress(&[], &NmsParams::default()).is_empty());
  }

  #[test]
  fn output_is_sorted_by_confidence() {
    let dets = [
      det(0.0, 0.0, 10.0, 10.0, 0, 0.6),
      det(100.0, 0.0, 10.0, 10.0, 0, 0.9),
      det(200.0, 0.0, 10.0, 10.0, 0, 0.7),
    ];
    assert_eq!(suppress(&dets, &NmsParams::default()), vec![1, 2, 0]);
  }

  #[test]
  fn ties_keep_input_order() {
    let dets = [
      det(0.0, 0.0, 10.0, 10.0, 0, 0.8),
      det(0.0, 0.0, 10.0, 10.0, 1, 0.8),
    ];
    assert_eq!(suppress(&dets, &NmsParams::default()), vec![0]);
  }

  #[test]
  fn score_threshold_excludes_low_scores() {
    let dets = [det(0.0, 0.0, 10.0, 10.0, 0, 0.5)];
    let params = NmsParams {
      score_threshold: 0.5,
      ..NmsParams::default()
    };
    assert!(suppress(&dets, &params).is_empty());
  }

  #[test]
  fn per_class_mode_keeps_other_classes() {
    let dets = [
      det(0.0, 0.0, 100.0, 100.0, 0, 0.8),
      det(0.0, 0.0, 100.0, 90.0, 1, 0.7),
    ];
    let params = NmsParams {
      mode: NmsMode::PerClass,
      ..NmsParams::default()
    };
    assert_eq!(suppress(&dets, &params), vec![0, 1]);
  }

  #[test]
  fn top_k_limits_survivors() {
    let dets: Vec<Detection> = (0..5)
      .map(|i| det(i as f32 * 50.0, 0.0, 10.0, 10.0, 0, 0.5 + i as f32 * 0.1))
      .collect();
    let params = NmsParams {
      top_k: Some(2),
      ..NmsParams::default()
    };
    assert_eq!(suppress(&dets, &params), vec![4, 3]);
  }

  #[test]
  fn trace_records_suppressions() {
    let dets = [
      det(0.0, 0.0, 100.0, 100.0, 0, 0.9),
      det(0.0, 0.0, 100.0, 70.0, 0, 0.6),
    ];
    let (kept, trace) = suppress_with_trace(&dets, &NmsParams::default());
    assert_eq!(kept, vec![0]);
    assert_eq!(trace.len(), 1);
    assert_eq!((trace[0].kept, trace[0].suppressed), (0, 1));
    assert!((trace[0].iou - 0.7).abs() < 1e-6);
  }

  #[test]
  fn parses_modes() {
    assert_eq!("agnostic".parse::<NmsMode>(), Ok(NmsMode::ClassAgnostic));
    assert_eq!("per-class".parse::<NmsMode>(), Ok(NmsMode::PerClass));
    assert_eq!(
      "greedy".parse::<NmsMode>(),
      Err(NmsModeError::Unknown("greedy".to_string()))
    );
  }
}
