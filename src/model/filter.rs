// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/filter.rs - 置信度筛选
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

use crate::{geometry::Detection, model::decode::Candidate};

/// 保留置信度严格大于阈值的候选，顺序与解码顺序一致
///
/// 宽或高为负的框不参与后续抑制。
pub(crate) fn filter_by_confidence<I>(candidates: I, threshold: f32) -> Vec<Detection>
where
  I: IntoIterator<Item = Candidate>,
{
  candidates
    .into_iter()
    .filter(|c| c.confidence > threshold)
    .filter(|c| c.bbox.width >= 0.0 && c.bbox.height >= 0.0)
    .map(|c| Detection::new(c.bbox, c.class_id, c.confidence))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BBox;

  fn candidate(class_id: usize, confidence: f32) -> Candidate {
    Candidate {
      bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
      class_id,
      confidence,
    }
  }

  #[test]
  fn threshold_is_strict() {
    let kept = filter_by_confidence([candidate(0, 0.5), candidate(1, 0.5001)], 0.5);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].class_id(), 1);
  }

  #[test]
  fn negative_sizes_are_dropped() {
    let sized = |width, height| Candidate {
      bbox: BBox::new(0.0, 0.0, width, height),
      class_id: 0,
      confidence: 0.9,
    };
    let kept = filter_by_confidence(
      [sized(-1.0, 1.0), sized(1.0, -1.0), sized(0.0, 0.0), sized(2.0, 3.0)],
      0.5,
    );
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|d| d.bbox().width >= 0.0 && d.bbox().height >= 0.0));
  }

  #[test]
  fn keeps_decode_order() {
    let kept = filter_by_confidence(
      [
        candidate(0, 0.6),
        candidate(1, 0.3),
        candidate(2, 0.9),
        candidate(3, 0.7),
      ],
      0.5,
    );
    let ids: Vec<usize> = kept.iter().map(Detection::class_id).collect();
    assert_eq!(ids, vec![0, 2, 3]);
  }

  #[test]
  fn nan_scores_are_dropped() {
    assert!(filter_by_confidence([candidate(0, f32::NAN)], 0.0).is_empty());
  }
}
