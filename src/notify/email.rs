// 该文件是 Alertic 项目的一部分。
// src/notify/email.rs - SMTP 邮件通知
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

use std::path::Path;

use lettre::{
  Message, SmtpTransport, Transport,
  message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
  transport::smtp::authentication::Credentials,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::SmtpSettings,
  notify::{Notification, Notifier},
};

const SUBJECT_PREFIX: &str = "[Detection Alert]";

#[derive(Error, Debug)]
pub enum EmailError {
  #[error("邮件地址错误: {0}")]
  AddressError(#[from] lettre::address::AddressError),
  #[error("邮件构建错误: {0}")]
  MessageError(#[from] lettre::error::Error),
  #[error("内容类型错误: {0}")]
  ContentTypeError(#[from] lettre::message::header::ContentTypeErr),
  #[error("SMTP 错误: {0}")]
  SmtpError(#[from] lettre::transport::smtp::Error),
}

/// 通过 STARTTLS SMTP 发送带图片附件的邮件
pub struct EmailNotifier {
  transport: SmtpTransport,
  from: Mailbox,
  to: Mailbox,
}

impl EmailNotifier {
  pub fn new(settings: &SmtpSettings) -> Result<Self, EmailError> {
    let from: Mailbox = settings.sender_email.parse()?;
    let to: Mailbox = settings.recipient_email.parse()?;

    let transport = SmtpTransport::starttls_relay(&settings.server)?
      .port(settings.port)
      .credentials(Credentials::new(
        settings.sender_email.clone(),
        settings.sender_password.clone(),
      ))
      .build();

    info!(
      "邮件通知: {}:{} -> {}",
      settings.server, settings.port, settings.recipient_email
    );

    Ok(Self {
      transport,
      from,
      to,
    })
  }

  /// 构建邮件，附件读取失败时只记录日志
  pub fn build_message(&self, notification: &Notification) -> Result<Message, EmailError> {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let body = format!(
      "Detection Alert\n\n\
       Time: {}\n\
       Alert: {}\n\
       Details: {}\n\n\
       This is an automated message from your detection system.\n",
      timestamp, notification.title, notification.message
    );

    let mut content = MultiPart::mixed().singlepart(SinglePart::plain(body));
    match notification.attachment.as_deref() {
      Some(path) if path.exists() => match attachment(path) {
        Ok(part) => {
          debug!("附加图片: {}", path.display());
          content = content.singlepart(part);
        }
        Err(e) => error!("附加图片失败 {}: {}", path.display(), e),
      },
      Some(path) => warn!("附件不存在: {}", path.display()),
      None => debug!("没有附件"),
    }

    let message = Message::builder()
      .from(self.from.clone())
      .to(self.to.clone())
      .subject(format!("{} {}", SUBJECT_PREFIX, notification.title))
      .multipart(content)?;

    Ok(message)
  }
}

fn attachment(path: &Path) -> Result<SinglePart, Box<dyn std::error::Error>> {
  let data = std::fs::read(path)?;
  let file_name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| String::from("snapshot.jpg"));
  let mime = match path.extension().and_then(|ext| ext.to_str()) {
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    _ => "application/octet-stream",
  };

  Ok(Attachment::new(file_name).body(data, ContentType::parse(mime)?))
}

impl Notifier for EmailNotifier {
  type Error = EmailError;

  fn notify(&self, notification: &Notification) -> Result<(), Self::Error> {
    let message = self.build_message(notification)?;
    debug!("发送邮件...");
    self.transport.send(&message)?;
    info!("邮件通知已发送至 {}", self.to);
    Ok(())
  }
}
