// 该文件是 Alertic 项目的一部分。
// src/detect.rs - 检测结果过滤
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

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
  frame::RgbNhwcFrame,
  model::{DetectResult, Model, WithLabel},
};

/// 单次推理得到的一个检测记录，边界框为帧像素坐标
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// [x_min, y_min, x_max, y_max]
  pub bbox: [i32; 4],
  pub confidence: f32,
  pub class_id: u32,
  pub class_name: String,
}

/// 按类别集合和置信度阈值过滤模型输出，保持输入顺序
pub fn filter_detections<T: WithLabel>(
  result: &DetectResult<T>,
  confidence_threshold: f32,
  accepted: &BTreeSet<u32>,
  width: u32,
  height: u32,
) -> Vec<Detection> {
  let (w, h) = (width as f32, height as f32);
  let (max_x, max_y) = (width.saturating_sub(1) as i32, height.saturating_sub(1) as i32);

  result
    .items
    .iter()
    .filter(|item| accepted.contains(&item.kind.to_label_id()))
    .filter(|item| item.score >= confidence_threshold)
    .map(|item| Detection {
      bbox: [
        ((item.bbox[0] * w).floor() as i32).clamp(0, max_x),
        ((item.bbox[1] * h).floor() as i32).clamp(0, max_y),
        ((item.bbox[2] * w).ceil() as i32).clamp(0, max_x),
        ((item.bbox[3] * h).ceil() as i32).clamp(0, max_y),
      ],
      confidence: item.score,
      class_id: item.kind.to_label_id(),
      class_name: item.kind.to_label_str(),
    })
    .collect()
}

/// 按类别名称统计检测数量
pub fn count_by_class(detections: &[Detection]) -> BTreeMap<&str, usize> {
  let mut counts = BTreeMap::new();
  for detection in detections {
    *counts.entry(detection.class_name.as_str()).or_insert(0) += 1;
  }
  counts
}

/// 包装模型，只保留关心的类别
pub struct Detector<M> {
  model: M,
  confidence_threshold: f32,
  accepted: BTreeSet<u32>,
}

impl<M> Detector<M> {
  pub fn new(model: M, confidence_threshold: f32, accepted: impl IntoIterator<Item = u32>) -> Self {
    Self {
      model,
      confidence_threshold,
      accepted: accepted.into_iter().collect(),
    }
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.confidence_threshold
  }

  pub fn accepted(&self) -> &BTreeSet<u32> {
    &self.accepted
  }

  pub fn detect<const W: u32, const H: u32, T>(
    &self,
    frame: &RgbNhwcFrame<W, H>,
  ) -> Result<Vec<Detection>, M::Error>
  where
    T: WithLabel,
    M: Model<Input = RgbNhwcFrame<W, H>, Output = DetectResult<T>>,
  {
    let raw = self.model.infer(frame)?;
    let detections = filter_detections(&raw, self.confidence_threshold, &self.accepted, W, H);
    debug!("原始检测 {} 个, 过滤后 {} 个", raw.len(), detections.len());
    Ok(detections)
  }
}
