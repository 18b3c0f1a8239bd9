// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/upload.rs - 上传图像接收
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{fmt, path::PathBuf};

use axum::body::Bytes;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("缺少上传文件字段")]
  MissingFile,
  #[error("上传文件名为空")]
  EmptyFilename,
  #[error("上传文件名无效: {0:?}")]
  InvalidFilename(String),
}

/// 上传文件名
///
/// 只保留客户端文件名的最后一段路径，避免写出上传目录。
/// 不做去重，同名上传会互相覆盖。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName(String);

impl UploadName {
  pub fn parse(raw: &str) -> Result<Self, ValidationError> {
    if raw.is_empty() {
      return Err(ValidationError::EmptyFilename);
    }

    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
      return Err(ValidationError::InvalidFilename(raw.to_string()));
    }

    Ok(UploadName(last.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for UploadName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// 一次上传的文件
#[derive(Debug, Clone)]
pub struct Upload {
  pub name: UploadName,
  pub bytes: Bytes,
}

/// 上传原图的保存目录
pub struct UploadStore {
  directory: PathBuf,
}

impl UploadStore {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    UploadStore {
      directory: directory.into(),
    }
  }

  /// 原样写入上传字节，不校验内容类型与大小
  pub fn save(&self, upload: &Upload) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(&self.directory)?;
    let path = self.directory.join(upload.name.as_str());
    std::fs::write(&path, &upload.bytes)?;
    info!("保存上传文件: {} ({} 字节)", path.display(), upload.bytes.len());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_names_are_kept() {
    assert_eq!(UploadName::parse("cat.jpg").unwrap().as_str(), "cat.jpg");
    assert_eq!(UploadName::parse("my cat.v2.png").unwrap().as_str(), "my cat.v2.png");
  }

  #[test]
  fn empty_name_is_rejected() {
    assert_eq!(UploadName::parse(""), Err(ValidationError::EmptyFilename));
  }

  #[test]
  fn directories_are_stripped() {
    assert_eq!(UploadName::parse("../../etc/passwd").unwrap().as_str(), "passwd");
    assert_eq!(UploadName::parse("/tmp/dog.png").unwrap().as_str(), "dog.png");
    assert_eq!(
      UploadName::parse("C:\\Users\\me\\cat.jpg").unwrap().as_str(),
      "cat.jpg"
    );
  }

  #[test]
  fn names_without_a_file_component_are_rejected() {
    for raw in ["..", ".", "photos/", "a/..", "bad\0name"] {
      assert!(
        matches!(UploadName::parse(raw), Err(ValidationError::InvalidFilename(_))),
        "{raw:?} should be rejected"
      );
    }
  }

  #[test]
  fn save_writes_into_the_upload_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path().join("uploads"));
    let upload = Upload {
      name: UploadName::parse("../escape.jpg").unwrap(),
      bytes: Bytes::from_static(b"raw bytes"),
    };

    let path = store.save(&upload).unwrap();

    assert_eq!(path, dir.path().join("uploads").join("escape.jpg"));
    assert_eq!(std::fs::read(path).unwrap(), b"raw bytes");
    assert!(!dir.path().join("escape.jpg").exists());
  }
}
