// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 单图与视频流任务
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

use std::time::Instant;

use axum::body::Bytes;
use image::RgbImage;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
  input::{DecodeError, Upload, UploadStore, decode_image},
  output::{EncodeError, ResultStore, StoreError, encode_frame},
  pipeline::{DetectionPipeline, Detector, InferenceError},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单张图像的页面展示数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionView {
  /// 相对静态目录的标注图路径
  pub output_image: Option<String>,
  pub predictions: Vec<String>,
}

#[derive(Error, Debug)]
pub enum OneShotError {
  #[error("保存上传文件失败: {0}")]
  SaveUpload(#[source] std::io::Error),
  #[error(transparent)]
  Decode(#[from] DecodeError),
  #[error(transparent)]
  Inference(#[from] InferenceError),
  #[error("保存标注结果失败: {0}")]
  Store(#[from] StoreError),
}

/// 上传图像的检测任务：保存原图、解码、推理、保存标注图
pub struct OneShotTask<'a> {
  uploads: &'a UploadStore,
}

impl<'a> OneShotTask<'a> {
  pub fn new(uploads: &'a UploadStore) -> Self {
    OneShotTask { uploads }
  }
}

impl<'p, 'r, D: Detector> Task<Upload, &'p DetectionPipeline<D>, &'r ResultStore>
  for OneShotTask<'_>
{
  type Output = PredictionView;
  type Error = OneShotError;

  fn run_task(
    self,
    upload: Upload,
    pipeline: &'p DetectionPipeline<D>,
    output: &'r ResultStore,
  ) -> Result<Self::Output, Self::Error> {
    info!("处理上传图像: {}", upload.name);
    self
      .uploads
      .save(&upload)
      .map_err(OneShotError::SaveUpload)?;

    let image = decode_image(&upload.bytes)?;
    let now = Instant::now();
    let result = pipeline.process(&image)?;
    info!(
      "检测完成，{} 个对象，耗时: {:.2?}",
      result.detections.len(),
      now.elapsed()
    );

    let artifact = output.store(&upload.name, &result.annotated)?;

    Ok(PredictionView {
      output_image: Some(artifact.public_path),
      predictions: result.predictions(),
    })
  }
}

#[derive(Error, Debug)]
#[error("帧接收端已关闭")]
pub struct SinkClosed;

/// 视频流的帧接收端
pub trait FrameSink {
  fn send_frame(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;
}

/// 阻塞发送，通道容量即为背压窗口；只能在非异步线程中调用
impl FrameSink for mpsc::Sender<Bytes> {
  fn send_frame(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
    self.blocking_send(chunk).map_err(|_| SinkClosed)
  }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
  fn send_frame(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
    (**self).send_frame(chunk)
  }
}

impl FrameSink for Vec<Bytes> {
  fn send_frame(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
    self.push(chunk);
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum StreamError {
  #[error(transparent)]
  Inference(#[from] InferenceError),
  #[error(transparent)]
  Encode(#[from] EncodeError),
}

/// 逐帧推理并发送 MJPEG 分段，直到输入结束、接收端关闭或达到帧数上限
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<'p, I, D, O> Task<I, &'p DetectionPipeline<D>, O> for ContinuousTask
where
  I: IntoIterator<Item = RgbImage>,
  D: Detector,
  O: FrameSink,
{
  type Output = usize;
  type Error = StreamError;

  fn run_task(
    self,
    input: I,
    pipeline: &'p DetectionPipeline<D>,
    mut output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始视频流任务...");
    let mut frame_index = 0usize;

    for frame in input {
      let now = Instant::now();
      let result = pipeline.process(&frame)?;
      let chunk = encode_frame(&result.annotated)?;

      if output.send_frame(chunk).is_err() {
        info!("客户端已断开，退出任务循环");
        break;
      }

      frame_index += 1;
      debug!(
        "第 {} 帧: {} 个对象，耗时: {:.2?}",
        frame_index,
        result.detections.len(),
        now.elapsed()
      );

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!("视频流任务结束，共发送 {} 帧", frame_index);
    Ok(frame_index)
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, io::Cursor};

  use image::{ImageFormat, Rgb};

  use super::*;
  use crate::{
    input::UploadName,
    output::draw::Draw,
    pipeline::tests::{FixedModel, cat},
  };

  fn pipeline() -> DetectionPipeline<FixedModel> {
    DetectionPipeline::new(FixedModel::new(vec![cat(0.8734)]), Draw::default())
  }

  fn frames(n: usize) -> Vec<RgbImage> {
    (0..n)
      .map(|i| RgbImage::from_pixel(32, 24, Rgb([(i * 20) as u8, 0, 0])))
      .collect()
  }

  fn png_upload(name: &str) -> Upload {
    let mut bytes = Cursor::new(Vec::new());
    RgbImage::from_pixel(32, 32, Rgb([90, 90, 90]))
      .write_to(&mut bytes, ImageFormat::Png)
      .unwrap();
    Upload {
      name: UploadName::parse(name).unwrap(),
      bytes: Bytes::from(bytes.into_inner()),
    }
  }

  #[test]
  fn one_shot_saves_upload_and_annotated_result() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = UploadStore::new(dir.path().join("uploads"));
    let results = ResultStore::new(dir.path().join("outputs"), "outputs");

    let view = OneShotTask::new(&uploads)
      .run_task(png_upload("cat.png"), &pipeline(), &results)
      .unwrap();

    assert_eq!(view.output_image.as_deref(), Some("outputs/annotated_cat.png"));
    assert_eq!(view.predictions, vec!["cat, Confidence: 0.87".to_string()]);
    assert!(dir.path().join("uploads/cat.png").is_file());
    assert!(dir.path().join("outputs/annotated_cat.png").is_file());
  }

  #[test]
  fn one_shot_reports_undecodable_upload() {
    let dir = tempfile::tempdir().unwrap();
    let uploads = UploadStore::new(dir.path().join("uploads"));
    let results = ResultStore::new(dir.path().join("outputs"), "outputs");
    let upload = Upload {
      name: UploadName::parse("notes.txt").unwrap(),
      bytes: Bytes::from_static(b"hello"),
    };

    let err = OneShotTask::new(&uploads)
      .run_task(upload, &pipeline(), &results)
      .unwrap_err();

    assert!(matches!(err, OneShotError::Decode(_)));
    assert!(!dir.path().join("outputs").exists());
  }

  #[test]
  fn stream_emits_one_chunk_per_frame_until_input_ends() {
    let mut sink: Vec<Bytes> = Vec::new();
    let sent = ContinuousTask::default()
      .run_task(frames(3), &pipeline(), &mut sink)
      .unwrap();

    assert_eq!(sent, 3);
    assert_eq!(sink.len(), 3);
    for chunk in &sink {
      assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
      assert!(chunk.ends_with(b"\r\n"));
    }
  }

  #[test]
  fn stream_stops_at_frame_limit() {
    let pulled = Cell::new(0);
    let input = frames(10).into_iter().inspect(|_| pulled.set(pulled.get() + 1));

    let sent = ContinuousTask::default()
      .with_frame_number(Some(2))
      .run_task(input, &pipeline(), Vec::<Bytes>::new())
      .unwrap();

    assert_eq!(sent, 2);
    assert_eq!(pulled.get(), 2);
  }

  #[test]
  fn stream_stops_when_receiver_is_gone() {
    let (tx, rx) = mpsc::channel::<Bytes>(1);
    drop(rx);
    let pulled = Cell::new(0);
    let input = frames(5).into_iter().inspect(|_| pulled.set(pulled.get() + 1));

    let sent = ContinuousTask::default()
      .run_task(input, &pipeline(), tx)
      .unwrap();

    assert_eq!(sent, 0);
    assert_eq!(pulled.get(), 1);
  }

  #[test]
  fn stream_of_failed_device_ends_quietly() {
    let pipeline = pipeline();
    let sent = ContinuousTask::default()
      .run_task(std::iter::empty::<RgbImage>(), &pipeline, Vec::<Bytes>::new())
      .unwrap();
    assert_eq!(sent, 0);
    assert_eq!(model_calls(&pipeline), 0);
  }

  fn model_calls(pipeline: &DetectionPipeline<FixedModel>) -> usize {
    pipeline
      .detector()
      .calls
      .load(std::sync::atomic::Ordering::SeqCst)
  }
}
