// 该文件是 Alertic 项目的一部分。
// tests/alert_pipeline.rs - 从图片输入到快照与通知的完整流程
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

#![cfg(all(feature = "read_image_file", feature = "save_image_file"))]

use std::{cell::RefCell, convert::Infallible, rc::Rc};

use image::{Rgb, RgbImage};
use url::Url;

use alertic::{
  FromUrl,
  config::AlerticConfig,
  detect::Detector,
  frame::RgbNhwcFrame,
  input::InputWrapper,
  model::{CocoLabel, DetectItem, DetectResult, Model},
  notify::{DirectorySnapshotStore, Notification, NotificationHandler, Notifier},
  output::OutputWrapper,
  task::{AlertTask, Task},
};

/// 固定输出一个人和一个低置信度的猫
struct PersonModel;

impl Model for PersonModel {
  type Input = RgbNhwcFrame<64, 64>;
  type Output = DetectResult<CocoLabel>;
  type Error = std::io::Error;

  fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(DetectResult::from(vec![
      DetectItem {
        kind: CocoLabel::PERSON,
        score: 0.82,
        bbox: [0.25, 0.25, 0.75, 0.75],
      },
      DetectItem {
        kind: CocoLabel::CAT,
        score: 0.3,
        bbox: [0.0, 0.0, 0.2, 0.2],
      },
    ]))
  }
}

#[derive(Clone, Default)]
struct Inbox(Rc<RefCell<Vec<Notification>>>);

impl Notifier for Inbox {
  type Error = Infallible;

  fn notify(&self, notification: &Notification) -> Result<(), Self::Error> {
    self.0.borrow_mut().push(notification.clone());
    Ok(())
  }
}

#[test]
fn still_image_triggers_person_alert() {
  let dir = tempfile::tempdir().unwrap();
  let picture = dir.path().join("porch.png");
  RgbImage::from_pixel(128, 96, Rgb([40, 80, 120]))
    .save(&picture)
    .unwrap();
  let snapshots = dir.path().join("detections");
  let latest = dir.path().join("latest.png");

  let config = AlerticConfig::from_json("{}", None).unwrap();
  let input =
    InputWrapper::<64, 64>::from_url(&Url::parse(&format!("image://{}", picture.display())).unwrap())
      .unwrap();
  let output =
    OutputWrapper::<64, 64>::from_url(&Url::parse(&format!("image://{}", latest.display())).unwrap())
      .unwrap();
  let detector = Detector::new(
    PersonModel,
    config.confidence_threshold,
    config.accepted_classes(),
  );

  let inbox = Inbox::default();
  let handler = NotificationHandler::from_alerts(
    &config.alerts,
    inbox.clone(),
    Some(DirectorySnapshotStore::new(&snapshots)),
  );
  AlertTask::new(handler)
    .run_task(input, detector, Some(output))
    .unwrap();

  let sent = inbox.0.borrow();
  assert_eq!(sent.len(), 1, "只有人超过阈值");
  assert_eq!(sent[0].title, "Person detected!");
  assert_eq!(sent[0].message, "1 person(s) spotted in the area");

  let attachment = sent[0].attachment.as_ref().unwrap();
  assert!(attachment.starts_with(&snapshots));
  assert!(attachment.exists());
  let name = attachment.file_name().unwrap().to_string_lossy();
  assert!(name.starts_with("person_detection_"));
  assert!(name.ends_with(".jpg"));

  let saved = image::open(attachment).unwrap();
  // 快照保留原图尺寸，而不是模型输入尺寸
  assert_eq!((saved.width(), saved.height()), (128, 96));

  let annotated = image::open(&latest).unwrap().into_rgb8();
  assert_eq!(annotated.get_pixel(16, 16).0, [0, 255, 0]);
}
