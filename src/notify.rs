// 该文件是 Alertic 项目的一部分。
// src/notify.rs - 通知定义
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

/// 一条待发送的通知
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub title: String,
  pub message: String,
  pub attachment: Option<PathBuf>,
}

/// 通知发送能力
pub trait Notifier {
  type Error;
  fn notify(&self, notification: &Notification) -> Result<(), Self::Error>;
}

/// 帧快照保存能力，返回保存后的路径
pub trait SnapshotStore<Frame> {
  type Error;
  fn save(&self, frame: &Frame, file_name: &str) -> Result<PathBuf, Self::Error>;
}

mod gate;
pub use self::gate::{Cooldown, CooldownGate};

mod handler;
pub use self::handler::NotificationHandler;

mod snapshot;
pub use self::snapshot::{DirectorySnapshotStore, SnapshotError, snapshot_file_name};

#[cfg(feature = "email")]
mod email;
#[cfg(feature = "email")]
pub use self::email::{EmailError, EmailNotifier};

/// 只写日志的通知方式
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  type Error = std::convert::Infallible;

  fn notify(&self, notification: &Notification) -> Result<(), Self::Error> {
    info!(
      "NOTIFICATION: {} - {}",
      notification.title, notification.message
    );
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum NotifyError {
  #[cfg(feature = "email")]
  #[error("邮件通知错误: {0}")]
  EmailError(#[from] EmailError),
}

pub enum NotifierWrapper {
  #[cfg(feature = "email")]
  Email(Box<EmailNotifier>),
  Log(LogNotifier),
}

impl Notifier for NotifierWrapper {
  type Error = NotifyError;

  fn notify(&self, notification: &Notification) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "email")]
      NotifierWrapper::Email(notifier) => {
        let sent = notifier.notify(notification);
        // 无论邮件是否发送成功，都在日志中留一条记录
        let _ = LogNotifier.notify(notification);
        sent.map_err(NotifyError::from)
      }
      NotifierWrapper::Log(notifier) => match notifier.notify(notification) {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
    }
  }
}
