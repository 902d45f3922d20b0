// 该文件是 Alertic 项目的一部分。
// src/model/onnx.rs - 基于 tract 的 ONNX YOLO 模型
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

//! YOLOv8 / YOLO11 导出的 ONNX 模型。
//!
//! 模型输入为 `[1, 3, H, W]` 的 `f32` 张量（0~1），
//! 输出为 `[1, 4 + 类别数, 锚点数]`，前四行为输入像素坐标下的 `cx, cy, w, h`。
//!
//! URL 形式：`onnx:///path/to/yolo11n.onnx?threshold=0.25&iou=0.45`

use std::collections::HashMap;

use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  model::{CocoLabel, DetectItem, DetectResult, Model, WithLabel, non_max_suppression},
};

const ONNX_DEFAULT_OBJECT_THRESH: f32 = 0.25;
const ONNX_DEFAULT_NMS_THRESH: f32 = 0.45;
const ONNX_BOX_CHANNELS: usize = 4;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Error, Debug)]
pub enum OnnxYoloError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("tract 错误: {0}")]
  TractError(#[from] TractError),
  #[error("模型输出形状无效: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("模型没有输出")]
  NoOutput,
}

pub struct OnnxYoloBuilder<const W: u32, const H: u32> {
  model_path: String,
  object_threshold: f32,
  nms_threshold: f32,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for OnnxYoloBuilder<W, H> {
  const SCHEME: &'static str = "onnx";
}

impl<const W: u32, const H: u32> FromUrl for OnnxYoloBuilder<W, H> {
  type Error = OnnxYoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxYoloError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    if url.path().is_empty() {
      return Err(OnnxYoloError::ModelPathError(url.to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    Ok(OnnxYoloBuilder {
      model_path: url.path().to_string(),
      object_threshold: query
        .get("threshold")
        .and_then(|v| v.parse().ok())
        .unwrap_or(ONNX_DEFAULT_OBJECT_THRESH),
      nms_threshold: query
        .get("iou")
        .and_then(|v| v.parse().ok())
        .unwrap_or(ONNX_DEFAULT_NMS_THRESH),
    })
  }
}

impl<const W: u32, const H: u32> OnnxYoloBuilder<W, H> {
  /// 后端阈值不高于 `confidence`，低分检测留给 [`crate::detect::Detector`] 过滤
  pub fn confidence_floor(mut self, confidence: f32) -> Self {
    self.object_threshold = self.object_threshold.min(confidence);
    self
  }

  pub fn build(self) -> Result<OnnxYolo<W, H>, OnnxYoloError> {
    info!("加载模型文件: {}", self.model_path);
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, H as usize, W as usize)),
      )?
      .into_optimized()?
      .into_runnable()?;
    info!("模型加载完成");

    Ok(OnnxYolo {
      plan,
      object_threshold: self.object_threshold,
      nms_threshold: self.nms_threshold,
    })
  }
}

pub struct OnnxYolo<const W: u32, const H: u32> {
  plan: OnnxPlan,
  object_threshold: f32,
  nms_threshold: f32,
}

impl<const W: u32, const H: u32> OnnxYolo<W, H> {
  fn build_input(frame: &RgbNhwcFrame<W, H>) -> Tensor {
    let pixels = frame.as_nhwc();
    let width = W as usize;
    tract_ndarray::Array4::from_shape_fn((1, 3, H as usize, width), |(_, channel, y, x)| {
      pixels[(y * width + x) * 3 + channel] as f32 / 255.0
    })
    .into_tensor()
  }
}

impl<const W: u32, const H: u32> Model for OnnxYolo<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectResult<CocoLabel>;
  type Error = OnnxYoloError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("执行模型推理");
    let outputs = self.plan.run(tvec!(Self::build_input(input).into()))?;
    let output = outputs.first().ok_or(OnnxYoloError::NoOutput)?;
    let view = output.to_array_view::<f32>()?;
    let shape = view.shape().to_vec();
    let view = view
      .into_dimensionality::<tract_ndarray::Ix3>()
      .map_err(|_| OnnxYoloError::OutputShape(shape.clone()))?;
    if shape[0] != 1 || shape[1] <= ONNX_BOX_CHANNELS {
      return Err(OnnxYoloError::OutputShape(shape));
    }

    let (channels, anchors) = (shape[1], shape[2]);
    let rows: Vec<Vec<f32>> = (0..channels)
      .map(|c| (0..anchors).map(|a| view[[0, c, a]]).collect())
      .collect();

    let items = decode_yolo_rows::<W, H>(&rows, self.object_threshold);
    let items = non_max_suppression(items, self.nms_threshold);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::from(items))
  }
}

/// 解码 `[4 + 类别数][锚点数]` 的输出矩阵，坐标归一化到 0~1
fn decode_yolo_rows<const W: u32, const H: u32>(
  rows: &[Vec<f32>],
  object_threshold: f32,
) -> Vec<DetectItem<CocoLabel>> {
  let anchors = rows.first().map(Vec::len).unwrap_or(0);
  let (w_in, h_in) = (W as f32, H as f32);
  let mut items = Vec::new();

  for a in 0..anchors {
    let (class_id, score) = rows[ONNX_BOX_CHANNELS..]
      .iter()
      .enumerate()
      .map(|(c, row)| (c, row[a]))
      .fold((0usize, f32::MIN), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if score < object_threshold {
      continue;
    }

    let (cx, cy, bw, bh) = (rows[0][a], rows[1][a], rows[2][a], rows[3][a]);
    let bbox = [
      ((cx - bw / 2.0) / w_in).clamp(0.0, 1.0),
      ((cy - bh / 2.0) / h_in).clamp(0.0, 1.0),
      ((cx + bw / 2.0) / w_in).clamp(0.0, 1.0),
      ((cy + bh / 2.0) / h_in).clamp(0.0, 1.0),
    ];

    items.push(DetectItem {
      kind: CocoLabel::from_label_id(class_id as u32),
      score,
      bbox,
    });
  }

  items
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_best_class_per_anchor() {
    // 两个锚点，三个类别
    let rows = vec![
      vec![320.0, 100.0],
      vec![320.0, 100.0],
      vec![64.0, 20.0],
      vec![128.0, 20.0],
      vec![0.9, 0.1],
      vec![0.05, 0.1],
      vec![0.2, 0.2],
    ];

    let items = decode_yolo_rows::<640, 640>(&rows, 0.25);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, CocoLabel::PERSON);
    assert!((items[0].bbox[0] - 0.45).abs() < 1e-6);
    assert!((items[0].bbox[1] - 0.4).abs() < 1e-6);
    assert!((items[0].bbox[2] - 0.55).abs() < 1e-6);
    assert!((items[0].bbox[3] - 0.6).abs() < 1e-6);
  }

  #[test]
  fn builder_reads_query() {
    let url = Url::parse("onnx:///models/yolo11n.onnx?threshold=0.3&iou=0.5").unwrap();
    let builder = OnnxYoloBuilder::<640, 640>::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/models/yolo11n.onnx");
    assert!((builder.object_threshold - 0.3).abs() < 1e-6);
    assert!((builder.nms_threshold - 0.5).abs() < 1e-6);
  }

  #[test]
  fn low_confidence_reaches_filter() {
    use crate::detect::filter_detections;
    use std::collections::BTreeSet;

    let rows = vec![
      vec![100.0, 400.0],
      vec![100.0, 400.0],
      vec![50.0, 50.0],
      vec![50.0, 50.0],
      vec![0.22, 0.25],
    ];
    let url = Url::parse("onnx:///models/yolo11n.onnx").unwrap();
    let builder = OnnxYoloBuilder::<640, 640>::from_url(&url)
      .unwrap()
      .confidence_floor(0.2);
    assert!((builder.object_threshold - 0.2).abs() < 1e-6);

    let raw = DetectResult::from(decode_yolo_rows::<640, 640>(
      &rows,
      builder.object_threshold,
    ));
    assert_eq!(raw.len(), 2);
    let accepted = BTreeSet::from([CocoLabel::PERSON.id()]);
    assert_eq!(filter_detections(&raw, 0.2, &accepted, 640, 640).len(), 2);
  }

  #[test]
  fn floor_never_raises_threshold() {
    let url = Url::parse("onnx:///models/yolo11n.onnx?threshold=0.1").unwrap();
    let builder = OnnxYoloBuilder::<640, 640>::from_url(&url)
      .unwrap()
      .confidence_floor(0.5);
    assert!((builder.object_threshold - 0.1).abs() < 1e-6);
  }

  #[test]
  fn score_at_threshold_is_kept() {
    let rows = vec![
      vec![320.0],
      vec![320.0],
      vec![64.0],
      vec![64.0],
      vec![0.25],
    ];
    assert_eq!(decode_yolo_rows::<640, 640>(&rows, 0.25).len(), 1);
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("yolo26:///models/yolo.rknn").unwrap();
    assert!(matches!(
      OnnxYoloBuilder::<640, 640>::from_url(&url),
      Err(OnnxYoloError::SchemeMismatch(_))
    ));
  }
}
