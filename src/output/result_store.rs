// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/result_store.rs - 标注结果保存
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

use image::{ImageError, ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{info, warn};

use crate::input::UploadName;

pub const ANNOTATED_PREFIX: &str = "annotated_";

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] ImageError),
}

/// 写入磁盘的标注图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
  pub path: PathBuf,
  /// 相对静态目录的路径，例如 `outputs/annotated_cat.jpg`
  pub public_path: String,
}

/// 以 `annotated_<文件名>` 保存标注图，同名文件直接覆盖
pub struct ResultStore {
  directory: PathBuf,
  public_prefix: String,
}

impl ResultStore {
  pub fn new(directory: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
    ResultStore {
      directory: directory.into(),
      public_prefix: public_prefix.into(),
    }
  }

  pub fn store(&self, name: &UploadName, image: &RgbImage) -> Result<StoredArtifact, StoreError> {
    std::fs::create_dir_all(&self.directory)?;

    let filename = format!("{}{}", ANNOTATED_PREFIX, name.as_str());
    let path = self.directory.join(&filename);

    let saved =
      ImageFormat::from_path(&path).and_then(|format| image.save_with_format(&path, format));
    match saved {
      Ok(()) => {}
      Err(ImageError::Unsupported(e)) => {
        warn!("扩展名不支持编码 ({}), 改用 PNG 保存: {}", e, path.display());
        image.save_with_format(&path, ImageFormat::Png)?;
      }
      Err(e) => return Err(e.into()),
    }

    info!("保存标注图像到文件: {}", path.display());

    Ok(StoredArtifact {
      path,
      public_path: format!("{}/{}", self.public_prefix, filename),
    })
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  fn image() -> RgbImage {
    RgbImage::from_pixel(8, 6, Rgb([200, 10, 10]))
  }

  #[test]
  fn annotated_file_is_prefixed() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(dir.path().join("outputs"), "outputs");
    let name = UploadName::parse("cat.jpg").unwrap();

    let artifact = store.store(&name, &image()).unwrap();

    assert_eq!(artifact.path, dir.path().join("outputs").join("annotated_cat.jpg"));
    assert_eq!(artifact.public_path, "outputs/annotated_cat.jpg");
    let saved = image::open(&artifact.path).unwrap();
    assert_eq!((saved.width(), saved.height()), (8, 6));
  }

  #[test]
  fn unknown_extension_falls_back_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(dir.path(), "outputs");
    let name = UploadName::parse("photo.upload").unwrap();

    let artifact = store.store(&name, &image()).unwrap();

    let bytes = std::fs::read(&artifact.path).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
  }

  #[test]
  fn same_name_overwrites_previous_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::new(dir.path(), "outputs");
    let name = UploadName::parse("cat.png").unwrap();

    store.store(&name, &image()).unwrap();
    let second = RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]));
    let artifact = store.store(&name, &second).unwrap();

    let saved = image::open(&artifact.path).unwrap().to_rgb8();
    assert_eq!(saved, second);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
  }
}
