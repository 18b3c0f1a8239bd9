// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

pub mod draw;

mod mjpeg;
pub use self::mjpeg::{
  EncodeError, MJPEG_CONTENT_TYPE, encode_frame, encode_jpeg, multipart_chunk,
};

mod result_store;
pub use self::result_store::{ANNOTATED_PREFIX, ResultStore, StoreError, StoredArtifact};
