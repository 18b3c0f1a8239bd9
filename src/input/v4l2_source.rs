// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::pin::Pin;

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  FromUrl, FromUrlWithScheme, query_value,
  input::{Camera, DeviceError},
};

const V4L2_DEFAULT_DEVICE: &str = "/dev/video0";
const V4L2_DEFAULT_WIDTH: u32 = 640;
const V4L2_DEFAULT_HEIGHT: u32 = 480;
const V4L2_BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
enum CaptureError {
  #[error("无法捕获帧: {0}")]
  IoError(#[from] std::io::Error),
  #[error("MJPEG 解码失败: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("帧数据长度不足: 期望 {expected}, 实际 {actual}")]
  ShortBuffer { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Yuyv,
  Mjpeg,
}

impl PixelFormat {
  fn from_fourcc(fourcc: &FourCC) -> Option<Self> {
    match &fourcc.repr {
      b"YUYV" => Some(PixelFormat::Yuyv),
      b"MJPG" => Some(PixelFormat::Mjpeg),
      _ => None,
    }
  }

  fn to_rgb(self, buffer: &[u8], width: u32, height: u32) -> Result<RgbImage, CaptureError> {
    match self {
      PixelFormat::Yuyv => {
        let expected = (width * height * 2) as usize;
        if buffer.len() < expected {
          return Err(CaptureError::ShortBuffer {
            expected,
            actual: buffer.len(),
          });
        }
        let rgb = yuyv_to_rgb(&buffer[..expected]);
        RgbImage::from_raw(width, height, rgb).ok_or(CaptureError::ShortBuffer {
          expected,
          actual: buffer.len(),
        })
      }
      PixelFormat::Mjpeg => {
        Ok(image::load_from_memory_with_format(buffer, ImageFormat::Jpeg)?.to_rgb8())
      }
    }
  }
}

/// 将 YUYV 格式转换为 RGB
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let y0 = chunk[0] as f32;
    let u = chunk[1] as f32 - 128.0;
    let y1 = chunk[2] as f32;
    let v = chunk[3] as f32 - 128.0;

    for y in [y0, y1] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

/// V4L2 摄像头配置，每次 `open` 打开一个独立的采集流
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4l2Camera {
  device_path: String,
  width: u32,
  height: u32,
}

impl FromUrlWithScheme for V4l2Camera {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4l2Camera {
  type Error = DeviceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DeviceError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    // v4l:///dev/video0?width=640&height=480
    let device_path = if url.path().is_empty() || url.path() == "/" {
      V4L2_DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    Ok(V4l2Camera {
      device_path,
      width: query_value(url, "width").unwrap_or(V4L2_DEFAULT_WIDTH),
      height: query_value(url, "height").unwrap_or(V4L2_DEFAULT_HEIGHT),
    })
  }
}

impl Camera for V4l2Camera {
  type Frames = V4l2Source;

  fn open(&self) -> Result<Self::Frames, DeviceError> {
    V4l2Source::new(&self.device_path, self.width, self.height)
  }
}

/// V4L2 摄像头输入源
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box<Device>> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
/// 设备读取失败后释放设备，之后始终返回 `None`；单帧转换失败只跳过该帧。
pub struct V4l2Source {
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Option<Pin<Box<Device>>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  pixel_format: PixelFormat,
  frame_index: u64,
  width: u32,
  height: u32,
}

impl V4l2Source {
  pub fn new(device_path: &str, width: u32, height: u32) -> Result<Self, DeviceError> {
    let open_failed = |source: std::io::Error| DeviceError::OpenFailed {
      path: device_path.to_string(),
      source,
    };

    info!("打开摄像头: {}", device_path);
    let device = Box::pin(Device::with_path(device_path).map_err(open_failed)?);

    // 设置视频格式
    let mut format = device.format().map_err(open_failed)?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format).map_err(open_failed)?;

    let pixel_format = PixelFormat::from_fourcc(&format.fourcc).ok_or_else(|| {
      DeviceError::UnsupportedPixelFormat {
        path: device_path.to_string(),
        fourcc: format.fourcc.to_string(),
      }
    })?;
    debug!(
      "摄像头格式: {}x{} {}",
      format.width, format.height, format.fourcc
    );

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动，所以引用始终有效；
    // release 与 Drop 保证 stream 先于 device 被释放
    let device_ref: &Device = &device;
    let stream = unsafe {
      let device_static: &'static Device =
        std::mem::transmute::<&Device, &'static Device>(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, V4L2_BUFFER_COUNT)
        .map_err(open_failed)?
    };

    Ok(Self {
      device: Some(device),
      stream: Some(stream),
      pixel_format,
      frame_index: 0,
      width: format.width,
      height: format.height,
    })
  }

  fn release(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
    self.device.take();
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    self.release();
  }
}

/// 一次采集的处理结果
enum FrameStep {
  Frame(RgbImage),
  /// 单帧数据无法转换，继续采集下一帧
  Skip(CaptureError),
  /// 设备读取失败，结束采集
  Stop(CaptureError),
}

fn frame_step(
  captured: std::io::Result<&[u8]>,
  pixel_format: PixelFormat,
  width: u32,
  height: u32,
) -> FrameStep {
  match captured {
    Ok(buffer) => match pixel_format.to_rgb(buffer, width, height) {
      Ok(image) => FrameStep::Frame(image),
      Err(e) => FrameStep::Skip(e),
    },
    Err(e) => FrameStep::Stop(CaptureError::from(e)),
  }
}

impl Iterator for V4l2Source {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let stream = self.stream.as_mut()?;
      let captured = stream.next().map(|(buffer, _meta)| buffer);

      match frame_step(captured, self.pixel_format, self.width, self.height) {
        FrameStep::Frame(image) => {
          self.frame_index += 1;
          return Some(image);
        }
        FrameStep::Skip(e) => {
          warn!("第 {} 帧数据无效，跳过: {}", self.frame_index + 1, e);
        }
        FrameStep::Stop(e) => {
          warn!("第 {} 帧采集失败，关闭摄像头: {}", self.frame_index + 1, e);
          self.release();
          return None;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_defaults() {
    let camera = V4l2Camera::from_url(&Url::parse("v4l://").unwrap()).unwrap();
    assert_eq!(camera.device_path, "/dev/video0");
    assert_eq!((camera.width, camera.height), (640, 480));

    let camera =
      V4l2Camera::from_url(&Url::parse("v4l:///dev/video2?width=1280&height=720").unwrap())
        .unwrap();
    assert_eq!(camera.device_path, "/dev/video2");
    assert_eq!((camera.width, camera.height), (1280, 720));
  }

  #[test]
  fn camera_url_scheme_is_checked() {
    let result = V4l2Camera::from_url(&Url::parse("image:///dev/video0").unwrap());
    assert!(matches!(result, Err(DeviceError::SchemeMismatch(_))));
  }

  #[test]
  fn missing_device_fails_to_open() {
    let camera =
      V4l2Camera::from_url(&Url::parse("v4l:///dev/kanjian-no-such-camera").unwrap()).unwrap();
    assert!(matches!(
      camera.open(),
      Err(DeviceError::OpenFailed { .. })
    ));
  }

  #[test]
  fn neutral_yuyv_is_gray() {
    let rgb = yuyv_to_rgb(&[128, 128, 64, 128]);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }

  #[test]
  fn short_yuyv_buffer_is_an_error() {
    let result = PixelFormat::Yuyv.to_rgb(&[0; 10], 4, 4);
    assert!(matches!(
      result,
      Err(CaptureError::ShortBuffer {
        expected: 32,
        actual: 10
      })
    ));
  }

  #[test]
  fn corrupt_frames_are_skipped() {
    let step = frame_step(Ok(&b"not a jpeg"[..]), PixelFormat::Mjpeg, 4, 4);
    assert!(matches!(step, FrameStep::Skip(CaptureError::DecodeError(_))));

    let step = frame_step(Ok(&[0u8; 10][..]), PixelFormat::Yuyv, 4, 4);
    assert!(matches!(step, FrameStep::Skip(CaptureError::ShortBuffer { .. })));
  }

  #[test]
  fn device_read_failure_stops_capture() {
    let failure = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device unplugged");
    let step = frame_step(Err(failure), PixelFormat::Yuyv, 2, 1);
    assert!(matches!(step, FrameStep::Stop(CaptureError::IoError(_))));
  }

  #[test]
  fn valid_buffer_becomes_a_frame() {
    let step = frame_step(Ok(&[128u8, 128, 64, 128][..]), PixelFormat::Yuyv, 2, 1);
    match step {
      FrameStep::Frame(image) => assert_eq!(image.dimensions(), (2, 1)),
      _ => panic!("expected a frame"),
    }
  }
}
