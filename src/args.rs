// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use url::Url;

/// Kanjian 目标检测服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型
  /// 支持格式:
  /// - YOLOv10 ONNX: yolo10:yolov10n.onnx 或 yolo10:///path/to/model.onnx?threads=4
  /// 类别名称固定为 COCO 80 类；模型元数据中的类别与之不符时启动日志会给出警告
  #[arg(long, default_value = "yolo10:yolov10n.onnx", value_name = "MODEL")]
  pub model: Url,

  /// 摄像头设备
  /// 支持格式:
  /// - V4L2: v4l:///dev/video0?width=640&height=480
  #[arg(long, default_value = "v4l:///dev/video0", value_name = "CAMERA")]
  pub camera: Url,

  /// 静态文件目录，上传原图与标注结果分别保存在 uploads/ 与 outputs/ 下
  #[arg(long, default_value = "static", value_name = "DIR")]
  pub static_dir: PathBuf,

  /// 监听地址
  #[arg(long, default_value = "127.0.0.1:5000", value_name = "ADDR")]
  pub listen: SocketAddr,

  /// 标签字体文件（TTF/OTF），缺省时只绘制检测框
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}
