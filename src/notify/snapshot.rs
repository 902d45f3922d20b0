// 该文件是 Alertic 项目的一部分。
// src/notify/snapshot.rs - 检测快照保存
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

use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::info;

use crate::{frame::CapturedFrame, notify::SnapshotStore};

#[derive(Error, Debug)]
pub enum SnapshotError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 快照文件名，例如 `cat_detection_2026-10-18_21-05-33.jpg`
pub fn snapshot_file_name<Tz>(category: &str, at: &DateTime<Tz>) -> String
where
  Tz: TimeZone,
  Tz::Offset: std::fmt::Display,
{
  format!(
    "{}_detection_{}.jpg",
    category.replace(' ', "_"),
    at.format("%Y-%m-%d_%H-%M-%S")
  )
}

/// 把采集到的原始分辨率图像保存到目录下，目录不存在时自动创建
#[derive(Debug, Clone)]
pub struct DirectorySnapshotStore {
  directory: PathBuf,
}

impl DirectorySnapshotStore {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }
}

impl<const W: u32, const H: u32> SnapshotStore<CapturedFrame<W, H>> for DirectorySnapshotStore {
  type Error = SnapshotError;

  fn save(&self, frame: &CapturedFrame<W, H>, file_name: &str) -> Result<PathBuf, Self::Error> {
    if !self.directory.exists() {
      std::fs::create_dir_all(&self.directory)?;
    }

    let path = self.directory.join(file_name);
    frame.source().save(&path)?;
    info!("检测快照已保存: {}", path.display());

    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use image::{Rgb, RgbImage};

  #[test]
  fn file_name_uses_category_and_time() {
    let at = Utc.with_ymd_and_hms(2026, 10, 18, 21, 5, 33).unwrap();
    assert_eq!(
      snapshot_file_name("cat", &at),
      "cat_detection_2026-10-18_21-05-33.jpg"
    );
    assert_eq!(
      snapshot_file_name("teddy bear", &at),
      "teddy_bear_detection_2026-10-18_21-05-33.jpg"
    );
  }

  #[test]
  fn saves_source_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectorySnapshotStore::new(dir.path().join("detections"));
    let captured = CapturedFrame::<8, 8>::new(RgbImage::from_pixel(64, 48, Rgb([10, 20, 30])));

    let path = store.save(&captured, "cat_detection_test.jpg").unwrap();
    assert!(path.starts_with(store.directory()));

    let saved = image::open(&path).unwrap();
    assert_eq!((saved.width(), saved.height()), (64, 48));
  }
}
