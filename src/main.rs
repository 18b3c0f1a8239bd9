// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use kanjian::{
  FromUrl,
  input::{UploadStore, V4l2Camera},
  model::{CocoLabel, Yolo10, Yolo10Builder},
  output::{ResultStore, draw::Draw},
  pipeline::DetectionPipeline,
  server::{AppState, router},
};

const UPLOAD_DIR: &str = "uploads";
const OUTPUT_DIR: &str = "outputs";

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("Kanjian 目标检测服务");
  info!("模型: {}", args.model);
  info!("摄像头: {}", args.camera);
  info!("静态目录: {}", args.static_dir.display());

  let upload_dir = args.static_dir.join(UPLOAD_DIR);
  let output_dir = args.static_dir.join(OUTPUT_DIR);
  std::fs::create_dir_all(&upload_dir)?;
  std::fs::create_dir_all(&output_dir)?;

  info!("正在加载模型...");
  let model: Yolo10<CocoLabel> = Yolo10Builder::from_url(&args.model)?.build()?;
  info!("模型加载完成");

  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None => {
      info!("未指定字体，仅绘制检测框");
      Draw::default()
    }
  };

  let camera = V4l2Camera::from_url(&args.camera)?;

  let state = AppState::new(
    DetectionPipeline::new(model, draw),
    UploadStore::new(upload_dir),
    ResultStore::new(output_dir, OUTPUT_DIR),
    camera,
  );
  let app = router(state, &args.static_dir);

  let listener = tokio::net::TcpListener::bind(args.listen).await?;
  info!("服务已启动: http://{}", listener.local_addr()?);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已关闭");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!("无法监听退出信号: {}", e);
    std::future::pending::<()>().await;
  }
  info!("收到退出信号，正在关闭服务...");
}
