// 该文件是 Alertic 项目的一部分。
// src/notify/handler.rs - 告警处理
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

use std::{fmt::Display, time::Instant};

use tracing::{debug, error, warn};

use crate::{
  config::AlertSettings,
  detect::Detection,
  model::CocoLabel,
  notify::{CooldownGate, Notification, Notifier, SnapshotStore, snapshot_file_name},
};

/// 把每帧的检测结果变成告警：冷却判断、保存快照、发送通知
pub struct NotificationHandler<N, S> {
  gates: Vec<CooldownGate>,
  notifier: N,
  snapshots: Option<S>,
}

impl<N, S> NotificationHandler<N, S> {
  pub fn new(gates: Vec<CooldownGate>, notifier: N, snapshots: Option<S>) -> Self {
    Self {
      gates,
      notifier,
      snapshots,
    }
  }

  pub fn from_alerts(alerts: &[AlertSettings], notifier: N, snapshots: Option<S>) -> Self {
    let gates = alerts
      .iter()
      .map(|alert| CooldownGate::new(alert.label, alert.cooldown))
      .collect();
    Self::new(gates, notifier, snapshots)
  }

  pub fn gates(&self) -> &[CooldownGate] {
    &self.gates
  }

  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  /// 处理一帧的检测结果，返回本帧触发了告警的类别。
  /// 快照或通知失败只记录日志，冷却时间照常更新。
  pub fn on_detections<Frame>(
    &mut self,
    detections: &[Detection],
    frame: Option<&Frame>,
    now: Instant,
  ) -> Vec<CocoLabel>
  where
    N: Notifier,
    N::Error: Display,
    S: SnapshotStore<Frame>,
    S::Error: Display,
  {
    let mut fired = Vec::new();

    for gate in self.gates.iter_mut() {
      let Some(count) = gate.admit(detections, now) else {
        continue;
      };

      let label = gate.label();
      let stamp = chrono::Local::now();
      warn!(
        "告警: 检测到 {} 个 {} ({}), 冷却 {:?}",
        count,
        label.name(),
        stamp.format("%Y-%m-%d %H:%M:%S"),
        gate.cooldown().period()
      );

      let attachment = match (self.snapshots.as_ref(), frame) {
        (Some(store), Some(frame)) => {
          match store.save(frame, &snapshot_file_name(label.name(), &stamp)) {
            Ok(path) => Some(path),
            Err(e) => {
              error!("保存快照失败: {}", e);
              None
            }
          }
        }
        _ => {
          debug!("未保存快照");
          None
        }
      };

      let notification = Notification {
        title: format!("{} detected!", capitalize(label.name())),
        message: format!("{} {}(s) spotted in the area", count, label.name()),
        attachment,
      };
      if let Err(e) = self.notifier.notify(&notification) {
        error!("发送通知失败: {}", e);
      }

      fired.push(label);
    }

    fired
  }
}

fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
