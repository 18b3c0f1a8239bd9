// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/yolo10.rs - YOLOv10 ONNX 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{fmt::Display, marker::PhantomData, path::PathBuf, sync::Mutex};

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use ndarray::{Array4, ArrayViewD, Axis, Ix3};
use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{CONFIDENCE_THRESHOLD, DetectItem, DetectResult, Model, WithLabel},
  query_value,
};

const YOLO10_INPUT_SIZE: u32 = 640;
const YOLO10_PAD_VALUE: u8 = 114;
// 每一行: x1, y1, x2, y2, score, class
const YOLO10_ROW_WIDTH: usize = 6;
const YOLO10_DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum Yolo10Error {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  RuntimeError(String),
  #[error("模型输出形状异常: {0:?}")]
  UnexpectedOutput(Vec<usize>),
  #[error("推理会话锁已失效")]
  SessionPoisoned,
}

fn runtime<E: Display>(err: E) -> Yolo10Error {
  Yolo10Error::RuntimeError(err.to_string())
}

/// YOLOv10 检测器
///
/// 推理会话由互斥锁保护，多个请求并发调用 `infer` 时会被串行化。
pub struct Yolo10<L> {
  session: Mutex<Session>,
  input_name: String,
  _phantom: PhantomData<fn() -> L>,
}

pub struct Yolo10Builder {
  model_path: PathBuf,
  intra_threads: usize,
}

impl FromUrlWithScheme for Yolo10Builder {
  const SCHEME: &'static str = "yolo10";
}

impl FromUrl for Yolo10Builder {
  type Error = Yolo10Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo10Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| Yolo10Error::ModelPathError(e.to_string()))?;
    if path.is_empty() {
      return Err(Yolo10Error::ModelPathError("模型路径为空".to_string()));
    }

    Ok(Yolo10Builder {
      model_path: PathBuf::from(path.as_ref()),
      intra_threads: query_value::<usize>(url, "threads")
        .unwrap_or(YOLO10_DEFAULT_THREADS)
        .max(1),
    })
  }
}

impl Yolo10Builder {
  pub fn build<L: WithLabel>(self) -> Result<Yolo10<L>, Yolo10Error> {
    if !self.model_path.exists() {
      return Err(Yolo10Error::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let session = Session::builder()
      .map_err(runtime)?
      .with_execution_providers([CPUExecutionProvider::default().build()])
      .map_err(runtime)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(runtime)?
      .with_intra_threads(self.intra_threads)
      .map_err(runtime)?
      .commit_from_file(&self.model_path)
      .map_err(runtime)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .unwrap_or_else(|| "images".to_string());
    debug!("模型输入名称: {}", input_name);

    match session.metadata().and_then(|meta| meta.custom("names")) {
      Ok(Some(raw)) => {
        let mismatched = label_mismatches::<L>(&parse_class_names(&raw));
        if !mismatched.is_empty() {
          warn!(
            "模型类别与内置标签不一致 ({} 个类别，例如 {:?})，类别名称可能不正确",
            mismatched.len(),
            &mismatched[..mismatched.len().min(5)]
          );
        }
      }
      Ok(None) => debug!("模型未携带类别名称元数据"),
      Err(e) => debug!("无法读取模型元数据: {}", e),
    }
    info!("模型加载完成");

    Ok(Yolo10 {
      session: Mutex::new(session),
      input_name,
      _phantom: PhantomData,
    })
  }
}

/// 解析导出模型中的 `names` 元数据，形如 `{0: 'person', 1: 'bicycle'}`
fn parse_class_names(raw: &str) -> Vec<(u32, String)> {
  raw
    .trim()
    .trim_start_matches('{')
    .trim_end_matches('}')
    .split(',')
    .filter_map(|entry| {
      let (id, name) = entry.split_once(':')?;
      let id = id.trim().parse().ok()?;
      Some((id, name.trim().trim_matches(['\'', '"']).to_string()))
    })
    .collect()
}

/// 名称与标签集不一致的类别编号
fn label_mismatches<L: WithLabel>(names: &[(u32, String)]) -> Vec<u32> {
  names
    .iter()
    .filter(|(id, name)| L::from_label_id(*id).to_label_str() != *name)
    .map(|(id, _)| *id)
    .collect()
}

/// 保持宽高比缩放并居中填充到方形输入的变换参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub resized_width: u32,
  pub resized_height: u32,
  pub source_width: u32,
  pub source_height: u32,
}

impl Letterbox {
  pub fn fit(width: u32, height: u32, target: u32) -> Self {
    let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
    let resized_width = ((width as f32 * scale).round() as u32).clamp(1, target);
    let resized_height = ((height as f32 * scale).round() as u32).clamp(1, target);

    Letterbox {
      scale,
      pad_x: (target - resized_width) / 2,
      pad_y: (target - resized_height) / 2,
      resized_width,
      resized_height,
      source_width: width,
      source_height: height,
    }
  }

  fn apply(&self, image: &RgbImage, target: u32) -> RgbImage {
    let resized = imageops::resize(
      image,
      self.resized_width,
      self.resized_height,
      FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(target, target, Rgb([YOLO10_PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
    canvas
  }

  /// 将模型输入坐标映射回原图像素坐标
  pub fn to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
    let w = self.source_width as f32;
    let h = self.source_height as f32;
    [
      ((bbox[0] - self.pad_x as f32) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_y as f32) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_x as f32) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_y as f32) / self.scale).clamp(0.0, h),
    ]
  }
}

fn to_nchw_tensor(image: &RgbImage) -> Array4<f32> {
  let (width, height) = image.dimensions();
  let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
  for (x, y, pixel) in image.enumerate_pixels() {
    for c in 0..3 {
      tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
    }
  }
  tensor
}

/// 解析 `[1, N, 6]` 输出，丢弃低于阈值的行，保持模型原有顺序
pub fn postprocess<L: WithLabel>(
  output: ArrayViewD<'_, f32>,
  letterbox: &Letterbox,
  confidence: f32,
) -> Result<DetectResult<L>, Yolo10Error> {
  let shape = output.shape().to_vec();
  if shape.len() != 3 || shape[0] != 1 || shape[2] != YOLO10_ROW_WIDTH {
    return Err(Yolo10Error::UnexpectedOutput(shape));
  }
  let output = output
    .into_dimensionality::<Ix3>()
    .map_err(|_| Yolo10Error::UnexpectedOutput(shape))?;

  let mut items = Vec::new();
  for row in output.index_axis(Axis(0), 0).rows() {
    let score = row[4];
    if score.is_nan() || score < confidence {
      continue;
    }

    let class_id = row[5].max(0.0).round() as u32;
    items.push(DetectItem {
      kind: L::from_label_id(class_id),
      score,
      bbox: letterbox.to_source([row[0], row[1], row[2], row[3]]),
    });
  }

  debug!("检测到 {} 个物体", items.len());
  Ok(items.into())
}

impl<L: WithLabel> Model for Yolo10<L> {
  type Input = RgbImage;
  type Output = DetectResult<L>;
  type Error = Yolo10Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
      return Ok(Vec::new().into());
    }

    debug!("预处理输入图像 {}x{}", width, height);
    let letterbox = Letterbox::fit(width, height, YOLO10_INPUT_SIZE);
    let tensor = to_nchw_tensor(&letterbox.apply(input, YOLO10_INPUT_SIZE));
    let input_value = Tensor::from_array(tensor).map_err(runtime)?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| Yolo10Error::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => input_value])
      .map_err(runtime)?;
    let output = outputs[0].try_extract_array::<f32>().map_err(runtime)?;

    postprocess(output, &letterbox, CONFIDENCE_THRESHOLD)
  }
}
