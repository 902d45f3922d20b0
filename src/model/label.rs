// 该文件是 Alertic 项目的一部分。
// src/model/label.rs - COCO 类别标签
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

use std::fmt;

use crate::model::WithLabel;

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CocoLabel(u32);

impl CocoLabel {
  pub const PERSON: CocoLabel = CocoLabel(0);
  pub const CAT: CocoLabel = CocoLabel(15);

  /// 按名称查找类别，忽略大小写
  pub fn from_name(name: &str) -> Option<Self> {
    let name = name.trim();
    COCO_CLASSES
      .iter()
      .position(|n| n.eq_ignore_ascii_case(name))
      .map(|idx| CocoLabel(idx as u32))
  }

  pub const fn from_id(id: u32) -> Self {
    CocoLabel(id)
  }

  pub fn id(&self) -> u32 {
    self.0
  }

  pub fn name(&self) -> &'static str {
    COCO_CLASSES.get(self.0 as usize).copied().unwrap_or("unknown")
  }
}

impl fmt::Display for CocoLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl WithLabel for CocoLabel {
  fn to_label_str(&self) -> String {
    self.name().to_string()
  }

  fn to_label_id(&self) -> u32 {
    self.0
  }

  fn from_label_id(id: u32) -> Self {
    CocoLabel(id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn well_known_ids() {
    assert_eq!(CocoLabel::PERSON.name(), "person");
    assert_eq!(CocoLabel::CAT.name(), "cat");
    assert_eq!(CocoLabel::from_name("Cat"), Some(CocoLabel::CAT));
    assert_eq!(CocoLabel::from_name(" person "), Some(CocoLabel::PERSON));
    assert_eq!(CocoLabel::from_name("teddy bear").map(|l| l.id()), Some(77));
  }

  #[test]
  fn unknown_labels() {
    assert_eq!(CocoLabel::from_name("unicorn"), None);
    assert_eq!(CocoLabel::from_label_id(200).to_label_str(), "unknown");
  }
}
