// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/mjpeg.rs - MJPEG 多段帧编码
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

use axum::body::Bytes;
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;

pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";
const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum EncodeError {
  #[error("JPEG 编码错误: {0}")]
  ImageError(#[from] image::ImageError),
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, EncodeError> {
  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(image)?;
  Ok(buffer)
}

/// 将一帧 JPEG 包装为 `--frame` 分隔的多段内容
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
  let mut chunk = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
  chunk.extend_from_slice(PART_HEADER);
  chunk.extend_from_slice(jpeg);
  chunk.extend_from_slice(PART_TRAILER);
  Bytes::from(chunk)
}

pub fn encode_frame(image: &RgbImage) -> Result<Bytes, EncodeError> {
  Ok(multipart_chunk(&encode_jpeg(image)?))
}
