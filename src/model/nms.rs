// 该文件是 Alertic 项目的一部分。
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

use crate::model::{DetectItem, WithLabel};

/// 按类别的非极大值抑制，结果按置信度降序排列
pub fn non_max_suppression<T: WithLabel>(
  mut items: Vec<DetectItem<T>>,
  iou_threshold: f32,
) -> Vec<DetectItem<T>> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem<T>> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept.iter().any(|best| {
      best.kind.to_label_id() == item.kind.to_label_id()
        && iou(&best.bbox, &item.bbox) >= iou_threshold
    });
    if !suppressed {
      kept.push(item);
    }
  }

  kept
}

/// 计算两个 [x_min, y_min, x_max, y_max] 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::CocoLabel;

  fn item(kind: CocoLabel, score: f32, bbox: [f32; 4]) -> DetectItem<CocoLabel> {
    DetectItem { kind, score, bbox }
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 0.5, 0.5];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[0.6, 0.6, 0.9, 0.9]), 0.0);
  }

  #[test]
  fn suppresses_overlapping_boxes_of_the_same_class() {
    let items = vec![
      item(CocoLabel::CAT, 0.6, [0.1, 0.1, 0.5, 0.5]),
      item(CocoLabel::CAT, 0.9, [0.12, 0.1, 0.5, 0.52]),
      item(CocoLabel::PERSON, 0.7, [0.1, 0.1, 0.5, 0.5]),
    ];

    let kept = non_max_suppression(items, 0.45);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].kind, CocoLabel::CAT);
    assert!((kept[0].score - 0.9).abs() < 1e-6);
    assert_eq!(kept[1].kind, CocoLabel::PERSON);
  }
}
