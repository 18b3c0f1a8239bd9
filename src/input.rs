// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbImage;
use thiserror::Error;

mod upload;
pub use self::upload::{Upload, UploadName, UploadStore, ValidationError};

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod v4l2_source;
pub use self::v4l2_source::{V4l2Camera, V4l2Source};

#[derive(Error, Debug)]
#[error("图像解码错误: {0}")]
pub struct DecodeError(#[from] image::ImageError);

/// 解码任意格式的图像字节，统一转换为 RGB
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
  Ok(image::load_from_memory(bytes)?.to_rgb8())
}

#[derive(Error, Debug)]
pub enum DeviceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开设备 {path}: {source}")]
  OpenFailed {
    path: String,
    source: std::io::Error,
  },
  #[error("设备 {path} 不支持的像素格式: {fourcc}")]
  UnsupportedPixelFormat { path: String, fourcc: String },
}

/// 采集设备句柄
///
/// 每次 `open` 打开一个新的设备流；流不可重启，采集失败后即结束。
pub trait Camera: Clone + Send + Sync + 'static {
  type Frames: Iterator<Item = RgbImage>;

  fn open(&self) -> Result<Self::Frames, DeviceError>;
}
