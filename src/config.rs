// 该文件是 Alertic 项目的一部分。
// src/config.rs - 配置与密钥文件
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

//! `config.json` 保存 SMTP 服务器与告警设置，`secrets.json` 保存账号信息。
//! 两者字段可以重叠，密钥文件中的非空值优先。
//!
//! ```json
//! {
//!   "smtp_server": "smtp.gmail.com",
//!   "smtp_port": 587,
//!   "recipient_email": "me@example.com",
//!   "confidence_threshold": 0.5,
//!   "snapshot_dir": "detections",
//!   "alerts": [
//!     { "category": "cat", "cooldown_secs": 3600 },
//!     { "category": "person", "cooldown_secs": 10 }
//!   ]
//! }
//! ```

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::model::CocoLabel;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_SNAPSHOT_DIR: &str = "detections";
const DEFAULT_CAT_COOLDOWN_SECS: u64 = 3600;
const DEFAULT_PERSON_COOLDOWN_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {}: {source}", path.display())]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("配置文件格式错误 {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    source: serde_json::Error,
  },
  #[error("未知的告警类别: {0}")]
  UnknownCategory(String),
  #[error("重复的告警类别: {0}")]
  DuplicateCategory(String),
  #[error("置信度阈值必须在 0 到 1 之间, 实际为 {0}")]
  InvalidThreshold(f32),
}

#[derive(Debug, Deserialize, Default)]
struct AlerticConfigFile {
  smtp_server: Option<String>,
  smtp_port: Option<u16>,
  sender_email: Option<String>,
  sender_password: Option<String>,
  recipient_email: Option<String>,
  confidence_threshold: Option<f32>,
  snapshot_dir: Option<PathBuf>,
  alerts: Option<Vec<AlertConfigFile>>,
}

#[derive(Debug, Deserialize)]
struct AlertConfigFile {
  category: String,
  cooldown_secs: u64,
}

#[derive(Debug, Deserialize, Default)]
struct SecretsFile {
  sender_email: Option<String>,
  sender_password: Option<String>,
  recipient_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmtpSettings {
  pub server: String,
  pub port: u16,
  pub sender_email: String,
  pub sender_password: String,
  pub recipient_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
  pub label: CocoLabel,
  pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct AlerticConfig {
  /// 字段不完整时为 `None`，此时不发送邮件
  pub smtp: Option<SmtpSettings>,
  pub confidence_threshold: f32,
  pub snapshot_dir: PathBuf,
  pub alerts: Vec<AlertSettings>,
}

impl Default for AlerticConfig {
  fn default() -> Self {
    Self {
      smtp: None,
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
      alerts: default_alerts(),
    }
  }
}

fn default_alerts() -> Vec<AlertSettings> {
  vec![
    AlertSettings {
      label: CocoLabel::CAT,
      cooldown: Duration::from_secs(DEFAULT_CAT_COOLDOWN_SECS),
    },
    AlertSettings {
      label: CocoLabel::PERSON,
      cooldown: Duration::from_secs(DEFAULT_PERSON_COOLDOWN_SECS),
    },
  ]
}

impl AlerticConfig {
  /// 读取配置文件和密钥文件，两者都可以缺省
  pub fn load(config: Option<&Path>, secrets: Option<&Path>) -> Result<Self, ConfigError> {
    let file: AlerticConfigFile = match config {
      Some(path) => read_json(path)?,
      None => AlerticConfigFile::default(),
    };
    let secrets: SecretsFile = match secrets {
      Some(path) => read_json(path)?,
      None => SecretsFile::default(),
    };
    Self::from_files(file, secrets)
  }

  /// 从 JSON 文本解析，主要用于测试
  pub fn from_json(config: &str, secrets: Option<&str>) -> Result<Self, ConfigError> {
    let file: AlerticConfigFile = parse_json(config, Path::new("<config>"))?;
    let secrets: SecretsFile = match secrets {
      Some(raw) => parse_json(raw, Path::new("<secrets>"))?,
      None => SecretsFile::default(),
    };
    Self::from_files(file, secrets)
  }

  fn from_files(file: AlerticConfigFile, secrets: SecretsFile) -> Result<Self, ConfigError> {
    let smtp = smtp_settings(
      file.smtp_server,
      file.smtp_port,
      secrets.sender_email.or(file.sender_email),
      secrets.sender_password.or(file.sender_password),
      secrets.recipient_email.or(file.recipient_email),
    );

    let confidence_threshold = file
      .confidence_threshold
      .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
    if !(0.0..=1.0).contains(&confidence_threshold) {
      return Err(ConfigError::InvalidThreshold(confidence_threshold));
    }

    let alerts = match file.alerts {
      Some(alerts) => {
        let mut seen = BTreeSet::new();
        alerts
          .into_iter()
          .map(|alert| {
            let label = CocoLabel::from_name(&alert.category)
              .ok_or_else(|| ConfigError::UnknownCategory(alert.category.clone()))?;
            if !seen.insert(label) {
              return Err(ConfigError::DuplicateCategory(alert.category));
            }
            Ok(AlertSettings {
              label,
              cooldown: Duration::from_secs(alert.cooldown_secs),
            })
          })
          .collect::<Result<Vec<_>, _>>()?
      }
      None => default_alerts(),
    };

    Ok(Self {
      smtp,
      confidence_threshold,
      snapshot_dir: file
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
      alerts,
    })
  }

  /// 检测器需要保留的类别
  pub fn accepted_classes(&self) -> BTreeSet<u32> {
    self.alerts.iter().map(|alert| alert.label.id()).collect()
  }
}

fn smtp_settings(
  server: Option<String>,
  port: Option<u16>,
  sender_email: Option<String>,
  sender_password: Option<String>,
  recipient_email: Option<String>,
) -> Option<SmtpSettings> {
  let missing: Vec<&str> = [
    ("smtp_server", server.is_none()),
    ("sender_email", sender_email.is_none()),
    ("sender_password", sender_password.is_none()),
    ("recipient_email", recipient_email.is_none()),
  ]
  .into_iter()
  .filter_map(|(name, missing)| missing.then_some(name))
  .collect();

  if !missing.is_empty() {
    warn!("SMTP 配置不完整, 缺少: {}", missing.join(", "));
    return None;
  }

  Some(SmtpSettings {
    server: server?,
    port: port.unwrap_or(DEFAULT_SMTP_PORT),
    sender_email: sender_email?,
    sender_password: sender_password?,
    recipient_email: recipient_email?,
  })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
  let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  parse_json(&raw, path)
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str, path: &Path) -> Result<T, ConfigError> {
  serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  const CONFIG: &str = r#"{
    "smtp_server": "smtp.gmail.com",
    "smtp_port": 587,
    "sender_password": "from-config",
    "recipient_email": "config@example.com"
  }"#;

  const SECRETS: &str = r#"{
    "sender_email": "camera@example.com",
    "sender_password": "from-secrets",
    "recipient_email": null
  }"#;

  #[test]
  fn secrets_override_config() {
    let cfg = AlerticConfig::from_json(CONFIG, Some(SECRETS)).unwrap();
    let smtp = cfg.smtp.unwrap();
    assert_eq!(smtp.server, "smtp.gmail.com");
    assert_eq!(smtp.port, 587);
    assert_eq!(smtp.sender_email, "camera@example.com");
    assert_eq!(smtp.sender_password, "from-secrets");
    assert_eq!(smtp.recipient_email, "config@example.com");
  }

  #[test]
  fn missing_smtp_fields_disable_email() {
    let cfg = AlerticConfig::from_json(CONFIG, None).unwrap();
    assert!(cfg.smtp.is_none());
  }

  #[test]
  fn defaults_match_cat_and_person_alerts() {
    let cfg = AlerticConfig::from_json("{}", None).unwrap();
    assert_eq!(cfg.confidence_threshold, 0.5);
    assert_eq!(cfg.snapshot_dir, PathBuf::from("detections"));
    assert_eq!(cfg.alerts.len(), 2);
    assert_eq!(cfg.alerts[0].label, CocoLabel::CAT);
    assert_eq!(cfg.alerts[0].cooldown, Duration::from_secs(3600));
    assert_eq!(cfg.alerts[1].label, CocoLabel::PERSON);
    assert_eq!(cfg.alerts[1].cooldown, Duration::from_secs(10));
    assert_eq!(cfg.accepted_classes(), BTreeSet::from([0, 15]));
  }

  #[test]
  fn custom_alerts() {
    let cfg = AlerticConfig::from_json(
      r#"{ "alerts": [{ "category": "Dog", "cooldown_secs": 60 }] }"#,
      None,
    )
    .unwrap();
    assert_eq!(cfg.alerts[0].label.name(), "dog");
    assert_eq!(cfg.accepted_classes(), BTreeSet::from([16]));
  }

  #[test]
  fn rejects_unknown_and_duplicate_categories() {
    let unknown = AlerticConfig::from_json(
      r#"{ "alerts": [{ "category": "dragon", "cooldown_secs": 1 }] }"#,
      None,
    );
    assert!(matches!(unknown, Err(ConfigError::UnknownCategory(c)) if c == "dragon"));

    let duplicate = AlerticConfig::from_json(
      r#"{ "alerts": [
        { "category": "cat", "cooldown_secs": 1 },
        { "category": "CAT", "cooldown_secs": 2 }
      ] }"#,
      None,
    );
    assert!(matches!(duplicate, Err(ConfigError::DuplicateCategory(_))));
  }

  #[test]
  fn rejects_out_of_range_threshold() {
    let cfg = AlerticConfig::from_json(r#"{ "confidence_threshold": 1.5 }"#, None);
    assert!(matches!(cfg, Err(ConfigError::InvalidThreshold(_))));
  }
}
