// 该文件是 Alertic 项目的一部分。
// src/notify/gate.rs - 按类别的冷却门控
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

use std::time::{Duration, Instant};

use crate::{detect::Detection, model::CocoLabel};

/// 两次发送之间的最短间隔，从上一次发送开始计时
#[derive(Debug, Clone)]
pub struct Cooldown {
  period: Duration,
  last_sent: Option<Instant>,
}

impl Cooldown {
  pub fn new(period: Duration) -> Self {
    Self {
      period,
      last_sent: None,
    }
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  pub fn last_sent(&self) -> Option<Instant> {
    self.last_sent
  }

  pub fn is_ready(&self, now: Instant) -> bool {
    self.remaining(now).is_zero()
  }

  /// 距离下一次允许发送还剩多久
  pub fn remaining(&self, now: Instant) -> Duration {
    match self.last_sent {
      None => Duration::ZERO,
      Some(last) => self
        .period
        .saturating_sub(now.saturating_duration_since(last)),
    }
  }

  pub fn mark_sent(&mut self, now: Instant) {
    self.last_sent = Some(now);
  }
}

/// 单个类别的门控
#[derive(Debug, Clone)]
pub struct CooldownGate {
  label: CocoLabel,
  cooldown: Cooldown,
}

impl CooldownGate {
  pub fn new(label: CocoLabel, period: Duration) -> Self {
    Self {
      label,
      cooldown: Cooldown::new(period),
    }
  }

  pub fn label(&self) -> CocoLabel {
    self.label
  }

  pub fn cooldown(&self) -> &Cooldown {
    &self.cooldown
  }

  /// 冷却结束且存在本类别的检测时放行，返回检测数量并记录发送时间。
  /// 其余情况不修改状态。
  pub fn admit(&mut self, detections: &[Detection], now: Instant) -> Option<usize> {
    if !self.cooldown.is_ready(now) {
      return None;
    }

    let count = detections
      .iter()
      .filter(|d| d.class_id == self.label.id())
      .count();
    if count == 0 {
      return None;
    }

    self.cooldown.mark_sent(now);
    Some(count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(label: CocoLabel) -> Detection {
    Detection {
      bbox: [0, 0, 10, 10],
      confidence: 0.9,
      class_id: label.id(),
      class_name: label.name().to_string(),
    }
  }

  #[test]
  fn first_detection_passes() {
    let mut gate = CooldownGate::new(CocoLabel::CAT, Duration::from_secs(3600));
    let now = Instant::now();
    assert_eq!(gate.admit(&[detection(CocoLabel::CAT)], now), Some(1));
    assert_eq!(gate.cooldown().last_sent(), Some(now));
  }

  #[test]
  fn suppresses_within_cooldown() {
    let mut gate = CooldownGate::new(CocoLabel::PERSON, Duration::from_secs(10));
    let t0 = Instant::now();
    let frame = [detection(CocoLabel::PERSON)];

    assert!(gate.admit(&frame, t0).is_some());
    assert!(gate.admit(&frame, t0 + Duration::from_secs(1)).is_none());
    assert!(gate.admit(&frame, t0 + Duration::from_millis(9_999)).is_none());
    assert_eq!(gate.cooldown().last_sent(), Some(t0));
  }

  #[test]
  fn passes_once_cooldown_elapsed() {
    let mut gate = CooldownGate::new(CocoLabel::PERSON, Duration::from_secs(10));
    let t0 = Instant::now();
    let frame = [detection(CocoLabel::PERSON), detection(CocoLabel::PERSON)];

    assert_eq!(gate.admit(&frame, t0), Some(2));
    let t1 = t0 + Duration::from_secs(10);
    assert_eq!(gate.admit(&frame, t1), Some(2));
    assert!(gate.admit(&frame, t1).is_none());
    assert_eq!(gate.cooldown().last_sent(), Some(t1));
  }

  #[test]
  fn cooldown_measured_from_last_send_not_detection() {
    let mut gate = CooldownGate::new(CocoLabel::CAT, Duration::from_secs(10));
    let t0 = Instant::now();
    let cat = [detection(CocoLabel::CAT)];

    assert!(gate.admit(&cat, t0).is_some());
    // 冷却期内持续检测不会推迟下一次发送
    for s in 1..10 {
      assert!(gate.admit(&cat, t0 + Duration::from_secs(s)).is_none());
    }
    assert!(gate.admit(&cat, t0 + Duration::from_secs(10)).is_some());
  }

  #[test]
  fn other_categories_do_not_fire_or_reset() {
    let mut gate = CooldownGate::new(CocoLabel::CAT, Duration::from_secs(10));
    let t0 = Instant::now();

    assert!(gate.admit(&[detection(CocoLabel::PERSON)], t0).is_none());
    assert!(gate.admit(&[], t0).is_none());
    assert_eq!(gate.cooldown().last_sent(), None);
    assert!(gate.admit(&[detection(CocoLabel::CAT)], t0).is_some());
  }

  #[test]
  fn zero_cooldown_passes_every_time() {
    let mut gate = CooldownGate::new(CocoLabel::CAT, Duration::ZERO);
    let t0 = Instant::now();
    let cat = [detection(CocoLabel::CAT)];
    assert!(gate.admit(&cat, t0).is_some());
    assert!(gate.admit(&cat, t0).is_some());
  }

  #[test]
  fn remaining_counts_down() {
    let mut cooldown = Cooldown::new(Duration::from_secs(10));
    let t0 = Instant::now();
    assert_eq!(cooldown.remaining(t0), Duration::ZERO);
    cooldown.mark_sent(t0);
    assert_eq!(cooldown.remaining(t0 + Duration::from_secs(4)), Duration::from_secs(6));
    assert!(cooldown.is_ready(t0 + Duration::from_secs(11)));
  }
}
