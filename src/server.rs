// 该文件是 Kanjian （看见） 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::{convert::Infallible, path::Path, sync::Arc};

use axum::{
  Router,
  body::{Body, Bytes},
  extract::{DefaultBodyLimit, State},
  http::{StatusCode, header},
  response::{Html, IntoResponse, Response},
  routing::get,
};
use axum_extra::extract::{
  Multipart,
  multipart::{MultipartError, MultipartRejection},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
  input::{Camera, Upload, UploadName, UploadStore, ValidationError},
  output::{MJPEG_CONTENT_TYPE, ResultStore},
  pipeline::{DetectionPipeline, Detector},
  task::{ContinuousTask, OneShotError, OneShotTask, PredictionView, Task},
};

mod view;
pub use self::view::render_index;

/// 上传表单中的文件字段名
pub const UPLOAD_FIELD: &str = "file";

/// 视频流通道容量，生产者最多领先消费者一帧
const STREAM_CHANNEL_CAPACITY: usize = 1;

/// 所有请求共享的服务状态
pub struct AppState<D, C> {
  pub pipeline: Arc<DetectionPipeline<D>>,
  pub uploads: Arc<UploadStore>,
  pub results: Arc<ResultStore>,
  pub camera: C,
}

impl<D, C: Clone> Clone for AppState<D, C> {
  fn clone(&self) -> Self {
    AppState {
      pipeline: self.pipeline.clone(),
      uploads: self.uploads.clone(),
      results: self.results.clone(),
      camera: self.camera.clone(),
    }
  }
}

impl<D: Detector, C: Camera> AppState<D, C> {
  pub fn new(
    pipeline: DetectionPipeline<D>,
    uploads: UploadStore,
    results: ResultStore,
    camera: C,
  ) -> Self {
    AppState {
      pipeline: Arc::new(pipeline),
      uploads: Arc::new(uploads),
      results: Arc::new(results),
      camera,
    }
  }
}

pub fn router<D: Detector, C: Camera>(state: AppState<D, C>, static_dir: &Path) -> Router {
  Router::new()
    .route("/", get(index).post(upload::<D, C>))
    .route("/video_feed", get(video_feed::<D, C>))
    .nest_service("/static", ServeDir::new(static_dir))
    .layer(DefaultBodyLimit::disable())
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn index() -> Html<String> {
  Html(render_index(&PredictionView::default(), None))
}

#[derive(Error, Debug)]
enum UploadRejection {
  #[error(transparent)]
  Invalid(#[from] ValidationError),
  #[error("读取上传数据失败: {0}")]
  Multipart(#[from] MultipartError),
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, UploadRejection> {
  while let Some(field) = multipart.next_field().await? {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }

    let filename = field.file_name().unwrap_or_default().to_string();
    let name = UploadName::parse(&filename)?;
    let bytes = field.bytes().await?;
    return Ok(Upload { name, bytes });
  }

  Err(ValidationError::MissingFile.into())
}

fn redirect_to_form() -> Response {
  (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

fn error_page(status: StatusCode, message: &str) -> Response {
  (
    status,
    Html(render_index(&PredictionView::default(), Some(message))),
  )
    .into_response()
}

async fn upload<D: Detector, C: Camera>(
  State(state): State<AppState<D, C>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Response {
  let mut multipart = match multipart {
    Ok(multipart) => multipart,
    Err(e) => {
      warn!("请求不是有效的表单上传: {}", e);
      return redirect_to_form();
    }
  };

  let upload = match read_upload(&mut multipart).await {
    Ok(upload) => upload,
    Err(UploadRejection::Invalid(e)) => {
      warn!("拒绝上传: {}", e);
      return redirect_to_form();
    }
    Err(e @ UploadRejection::Multipart(_)) => {
      warn!("{}", e);
      return error_page(StatusCode::BAD_REQUEST, &e.to_string());
    }
  };

  let result = tokio::task::spawn_blocking(move || {
    OneShotTask::new(&state.uploads).run_task(upload, &*state.pipeline, &*state.results)
  })
  .await;

  match result {
    Ok(Ok(view)) => Html(render_index(&view, None)).into_response(),
    Ok(Err(e @ OneShotError::Decode(_))) => {
      warn!("{}", e);
      error_page(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
    }
    Ok(Err(e)) => {
      error!("处理上传图像失败: {}", e);
      error_page(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
    }
    Err(e) => {
      error!("检测任务异常退出: {}", e);
      error_page(StatusCode::INTERNAL_SERVER_ERROR, "检测任务异常退出")
    }
  }
}

async fn video_feed<D: Detector, C: Camera>(State(state): State<AppState<D, C>>) -> Response {
  let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);

  tokio::task::spawn_blocking(move || {
    let frames = match state.camera.open() {
      Ok(frames) => frames,
      Err(e) => {
        error!("无法打开摄像头: {}", e);
        return;
      }
    };

    match ContinuousTask::default().run_task(frames, &*state.pipeline, tx) {
      Ok(count) => info!("视频流关闭，共 {} 帧", count),
      Err(e) => error!("视频流中断: {}", e),
    }
  });

  let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
  (
    [(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)],
    Body::from_stream(stream),
  )
    .into_response()
}
