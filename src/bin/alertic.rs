// 该文件是 Alertic 项目的一部分。
// src/bin/alertic.rs - 检测告警程序入口
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

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use alertic::{
  FromUrl,
  config::AlerticConfig,
  detect::Detector,
  input::InputWrapper,
  model::ModelWrapper,
  notify::{DirectorySnapshotStore, LogNotifier, NotificationHandler, NotifierWrapper},
  output::OutputWrapper,
  task::{AlertTask, Task, interrupt_channel},
};

const MODEL_WIDTH: u32 = 640;
const MODEL_HEIGHT: u32 = 640;

/// 人与猫检测告警
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 onnx:///models/yolo11n.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 gst://camera/dev/video0 或 image:///tmp/cat.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 可选的标注输出，例如 display:// 或 gstvideo:///tmp/out.mp4
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 配置文件
  #[arg(long, value_name = "FILE", default_value = "config.json")]
  pub config: PathBuf,
  /// 密钥文件，不存在时忽略
  #[arg(long, value_name = "FILE", default_value = "secrets.json")]
  pub secrets: PathBuf,
  /// 覆盖配置中的置信度阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// 覆盖配置中的快照目录
  #[arg(long, value_name = "DIR")]
  pub snapshot_dir: Option<PathBuf>,
  /// 处理的最大帧数，0 表示不限
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
  /// 只记录日志，不发送邮件
  #[arg(long)]
  pub dry_run: bool,
}

fn existing(path: &Path, what: &str) -> Option<PathBuf> {
  if path.exists() {
    Some(path.to_path_buf())
  } else {
    warn!("{}不存在: {}, 使用默认值", what, path.display());
    None
  }
}

fn notifier(config: &AlerticConfig, dry_run: bool) -> Result<NotifierWrapper> {
  if dry_run {
    info!("试运行模式, 通知只写入日志");
    return Ok(NotifierWrapper::Log(LogNotifier));
  }

  match config.smtp.as_ref() {
    #[cfg(feature = "email")]
    Some(smtp) => {
      let email = alertic::notify::EmailNotifier::new(smtp)?;
      Ok(NotifierWrapper::Email(Box::new(email)))
    }
    #[cfg(not(feature = "email"))]
    Some(_) => {
      warn!("未启用 email 功能, 通知只写入日志");
      Ok(NotifierWrapper::Log(LogNotifier))
    }
    None => {
      warn!("未配置 SMTP, 通知只写入日志");
      Ok(NotifierWrapper::Log(LogNotifier))
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  if let Some(output) = args.output.as_ref() {
    info!("输出: {}", output);
  }

  let mut config = AlerticConfig::load(
    existing(&args.config, "配置文件").as_deref(),
    existing(&args.secrets, "密钥文件").as_deref(),
  )?;
  if let Some(confidence) = args.confidence {
    anyhow::ensure!(
      (0.0..=1.0).contains(&confidence),
      "置信度阈值必须在 0 到 1 之间, 实际为 {}",
      confidence
    );
    config.confidence_threshold = confidence;
  }
  if let Some(dir) = args.snapshot_dir.clone() {
    config.snapshot_dir = dir;
  }
  for alert in config.alerts.iter() {
    info!(
      "告警类别: {}, 冷却时间 {:?}",
      alert.label.name(),
      alert.cooldown
    );
  }

  let model = ModelWrapper::<MODEL_WIDTH, MODEL_HEIGHT>::from_url_with_confidence(
    &args.model,
    config.confidence_threshold,
  )?;
  let detector = Detector::new(
    model,
    config.confidence_threshold,
    config.accepted_classes(),
  );
  let input = InputWrapper::<MODEL_WIDTH, MODEL_HEIGHT>::from_url(&args.input)?;
  let output = args
    .output
    .as_ref()
    .map(OutputWrapper::<MODEL_WIDTH, MODEL_HEIGHT>::from_url)
    .transpose()?;

  let snapshots = DirectorySnapshotStore::new(config.snapshot_dir.clone());
  info!("快照目录: {}", snapshots.directory().display());
  let handler = NotificationHandler::from_alerts(
    &config.alerts,
    notifier(&config, args.dry_run)?,
    Some(snapshots),
  );

  let frame_number = (args.frame_number > 0).then_some(args.frame_number);
  AlertTask::new(handler)
    .with_frame_number(frame_number)
    .with_interrupt(interrupt_channel()?)
    .run_task(input, detector, output)?;

  Ok(())
}
