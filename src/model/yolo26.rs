// 该文件是 Alertic 项目的一部分。
// src/model/yolo26.rs - RKNPU 上的 YOLO26 模型
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

use rknpu::{Context, InitFlags, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::AsNhwcFrame,
  model::{CocoLabel, DetectItem, DetectResult, Model, WithLabel},
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = 80;
const YOLO26_INPUT_W: f32 = 640.0;
const YOLO26_INPUT_H: f32 = 640.0;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
const YOLO26_OBJECT_THRESH: f32 = 0.25;

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl Yolo26Error {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: String,
  object_threshold: f32,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let object_threshold = url
      .query_pairs()
      .find(|(key, _)| key == "threshold")
      .and_then(|(_, value)| value.parse().ok())
      .unwrap_or(YOLO26_OBJECT_THRESH);

    Ok(Yolo26Builder {
      model_path: url.path().to_string(),
      object_threshold,
    })
  }
}

impl Yolo26Builder {
  /// 后端阈值不高于 `confidence`
  pub fn confidence_floor(mut self, confidence: f32) -> Self {
    self.object_threshold = self.object_threshold.min(confidence);
    self
  }

  pub fn build<Frame>(self) -> Result<Yolo26<Frame>, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, InitFlags::default())?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(Yolo26 {
      context,
      object_threshold: self.object_threshold,
      _phantom: std::marker::PhantomData,
    })
  }
}

pub struct Yolo26<Frame> {
  context: Context,
  object_threshold: f32,
  _phantom: std::marker::PhantomData<Frame>,
}

impl<Frame: AsNhwcFrame> Model for Yolo26<Frame> {
  type Input = Frame;
  type Output = DetectResult<CocoLabel>;
  type Error = Yolo26Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.context.set_input(
      0,
      input.as_nhwc(),
      rknpu::TensorFormat::NHWC,
      TensorType::UInt8,
    )?;
    self.context.run()?;
    let output = self.context.get_outputs()?;

    Ok(Self::postprocess(output, self.object_threshold))
  }
}

impl<Frame> Yolo26<Frame> {
  fn postprocess(output: rknpu::Output, object_threshold: f32) -> DetectResult<CocoLabel> {
    let mut items = Vec::new();

    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let reg_expected = 4 * spatial;
      let cls_expected = YOLO26_CLASS_NUM * spatial;

      let (Ok(t1), Ok(t2)) = (
        output.get_f32(head_idx * 2),
        output.get_f32(head_idx * 2 + 1),
      ) else {
        error!("检测头 {} 的输出获取失败", head_idx);
        continue;
      };

      // RKNN 输出顺序不固定，按张量大小区分回归与分类
      let (reg, cls) = if t1.len() == reg_expected && t2.len() == cls_expected {
        (t1, t2)
      } else if t1.len() == cls_expected && t2.len() == reg_expected {
        (t2, t1)
      } else {
        error!(
          "检测头 {}: 输出大小不匹配 ({}, {})",
          head_idx,
          t1.len(),
          t2.len()
        );
        continue;
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;

          let (class_id, logit) = (0..YOLO26_CLASS_NUM)
            .map(|c| (c, cls[c * spatial + idx]))
            .fold((0usize, f32::MIN), |best, cur| {
              if cur.1 > best.1 { cur } else { best }
            });
          let score = sigmoid(logit);
          if score < object_threshold {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;
          let xmin = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymin = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);
          let xmax = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_W);
          let ymax = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO26_INPUT_H);

          items.push(DetectItem {
            kind: CocoLabel::from_label_id(class_id as u32),
            score,
            bbox: [
              xmin / YOLO26_INPUT_W,
              ymin / YOLO26_INPUT_H,
              xmax / YOLO26_INPUT_W,
              ymax / YOLO26_INPUT_H,
            ],
          });
        }
      }
    }

    debug!("检测到 {} 个物体", items.len());
    DetectResult::from(items)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threshold_from_query_and_floor() {
    let url = Url::parse("yolo26:///models/yolo26n.rknn?threshold=0.4").unwrap();
    let builder = Yolo26Builder::from_url(&url).unwrap();
    assert!((builder.object_threshold - 0.4).abs() < 1e-6);
    let builder = builder.confidence_floor(0.3);
    assert!((builder.object_threshold - 0.3).abs() < 1e-6);

    let url = Url::parse("yolo26:///models/yolo26n.rknn").unwrap();
    let builder = Yolo26Builder::from_url(&url).unwrap().confidence_floor(0.6);
    assert!((builder.object_threshold - YOLO26_OBJECT_THRESH).abs() < 1e-6);
  }
}
