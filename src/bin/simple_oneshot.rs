// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  input::{ImageFileInput, UploadName},
  model::{CocoLabel, Yolo10, Yolo10Builder},
  output::{ResultStore, draw::Draw},
  pipeline::DetectionPipeline,
};

/// 对单张图像运行检测并保存标注结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型
  #[arg(long, default_value = "yolo10:yolov10n.onnx", value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///path/to/cat.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出目录
  #[arg(long, default_value = "outputs", value_name = "DIR")]
  pub output: PathBuf,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出目录: {}", args.output.display());

  let input = ImageFileInput::from_url(&args.input)?;
  let name = input
    .path()
    .file_name()
    .and_then(|name| name.to_str())
    .context("输入路径缺少文件名")?;
  let name = UploadName::parse(name)?;

  let model: Yolo10<CocoLabel> = Yolo10Builder::from_url(&args.model)?.build()?;
  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None => Draw::default(),
  };
  let pipeline = DetectionPipeline::new(model, draw);
  let store = ResultStore::new(&args.output, "");

  info!("开始推理...");
  for frame in input {
    let result = pipeline.process(&frame)?;
    for line in result.predictions() {
      info!("  - {}", line);
    }
    let artifact = store.store(&name, &result.annotated)?;
    info!("标注结果: {}", artifact.path.display());
  }

  Ok(())
}
