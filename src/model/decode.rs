// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/decode.rs - 输出张量解码
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

use crate::{
  geometry::BBox,
  model::tensor::{BOX_FIELDS, RawOutputTensor},
};

/// 解码得到的候选框，类别与置信度尚未经过阈值筛选
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
  pub bbox: BBox,
  pub class_id: usize,
  pub confidence: f32,
}

/// 最大类别得分及其编号，相等时取靠前者
fn argmax(scores: &[f32]) -> (usize, f32) {
  let mut best = (0usize, scores[0]);
  for (idx, &score) in scores.iter().enumerate().skip(1) {
    if score > best.1 {
      best = (idx, score);
    }
  }
  best
}

/// 单行预测解码，坐标按原始帧尺寸反归一化
fn decode_row(row: &[f32], frame_width: f32, frame_height: f32) -> Candidate {
  let center_x = row[0] * frame_width;
  let center_y = row[1] * frame_height;
  let width = row[2] * frame_width;
  let height = row[3] * frame_height;
  let (class_id, confidence) = argmax(&row[BOX_FIELDS..]);

  Candidate {
    bbox: BBox::from_center(center_x, center_y, width, height),
    class_id,
    confidence,
  }
}

/// 惰性解码一个输出张量的每一行
pub(crate) fn decode(
  tensor: &RawOutputTensor,
  frame_width: u32,
  frame_height: u32,
) -> impl Iterator<Item = Candidate> + '_ {
  let (w, h) = (frame_width as f32, frame_height as f32);
  tensor.iter_rows().map(move |row| decode_row(row, w, h))
}

/// 按张量顺序、行顺序解码一次前向推理的全部输出
pub(crate) fn decode_all(
  tensors: &[RawOutputTensor],
  frame_width: u32,
  frame_height: u32,
) -> impl Iterator<Item = Candidate> + '_ {
  tensors
    .iter()
    .flat_map(move |tensor| decode(tensor, frame_width, frame_height))
}
