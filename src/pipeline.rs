// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 检测流水线
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
use tracing::debug;

use crate::{
  model::{DetectItem, DetectResult, Model, WithLabel},
  output::draw::{Draw, DrawDetectionOnImage},
};

/// 检测器推理失败，不做重试
#[derive(Error, Debug)]
#[error("推理失败: {source}")]
pub struct InferenceError {
  #[source]
  source: Box<dyn std::error::Error + Send + Sync>,
}

impl InferenceError {
  pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    InferenceError {
      source: Box::new(err),
    }
  }
}

/// 流水线所驱动的检测器
pub trait Detector: Send + Sync + 'static {
  type Label: WithLabel + Send + 'static;

  fn detect(&self, image: &RgbImage) -> Result<DetectResult<Self::Label>, InferenceError>;
}

impl<M, L> Detector for M
where
  M: Model<Input = RgbImage, Output = DetectResult<L>> + Send + Sync + 'static,
  M::Error: std::error::Error + Send + Sync + 'static,
  L: WithLabel + Send + 'static,
{
  type Label = L;

  fn detect(&self, image: &RgbImage) -> Result<DetectResult<L>, InferenceError> {
    self.infer(image).map_err(InferenceError::new)
  }
}

/// 一张图像的检测结果及其标注图
#[derive(Debug, Clone)]
pub struct AnnotatedResult<L> {
  pub detections: DetectResult<L>,
  pub annotated: RgbImage,
}

impl<L: WithLabel> AnnotatedResult<L> {
  pub fn predictions(&self) -> Vec<String> {
    self.detections.iter().map(prediction_line).collect()
  }
}

/// `"<类别名>, Confidence: <两位小数>"`
pub fn prediction_line<L: WithLabel>(item: &DetectItem<L>) -> String {
  format!("{}, Confidence: {:.2}", item.class_name(), item.score)
}

pub struct DetectionPipeline<D> {
  detector: D,
  draw: Draw,
}

impl<D: Detector> DetectionPipeline<D> {
  pub fn new(detector: D, draw: Draw) -> Self {
    DetectionPipeline { detector, draw }
  }

  pub fn detector(&self) -> &D {
    &self.detector
  }

  pub fn detect(&self, image: &RgbImage) -> Result<DetectResult<D::Label>, InferenceError> {
    let now = std::time::Instant::now();
    let detections = self.detector.detect(image)?;
    debug!(
      "推理完成，检测到 {} 个对象，耗时: {:.2?}",
      detections.len(),
      now.elapsed()
    );
    Ok(detections)
  }

  pub fn process(&self, image: &RgbImage) -> Result<AnnotatedResult<D::Label>, InferenceError> {
    let detections = self.detect(image)?;
    let annotated = self.draw.draw_detections(image, &detections);
    Ok(AnnotatedResult {
      detections,
      annotated,
    })
  }
}
