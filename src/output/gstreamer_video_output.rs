// 该文件是 Alertic 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 窗口与视频文件输出
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

//! 把标注后的帧推入 GStreamer 管道。
//!
//! - `display://` 在窗口中实时显示 (`autovideosink`)
//! - `gstvideo:///path/out.mp4?fps=15` 编码为视频文件，支持 mp4、mkv、avi、webm
//!
//! 两种方式都可以带 `font=/path/font.ttf` 参数绘制标签文字。

use std::sync::atomic::{AtomicU64, Ordering};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  detect::Detection,
  frame::RgbNhwcFrame,
  input::AsNhwcFrame,
  output::{
    Render,
    draw::{Draw, DrawError},
  },
};

const DEFAULT_FPS: i32 = 15;
const EOS_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("状态切换失败: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("管道中没有 appsrc 元素")]
  AppSrcNotFound,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("推送帧失败: {0}")]
  FlowError(#[from] gst::FlowError),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
}

pub struct GStreamerVideoOutput<const W: u32, const H: u32> {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  draw: Draw,
  fps: i32,
  frame_count: AtomicU64,
}

impl<const W: u32, const H: u32> GStreamerVideoOutput<W, H> {
  pub const DISPLAY_SCHEME: &'static str = "display";
  pub const VIDEO_SCHEME: &'static str = "gstvideo";

  pub fn accepts(url: &Url) -> bool {
    url.scheme() == Self::DISPLAY_SCHEME || url.scheme() == Self::VIDEO_SCHEME
  }

  /// 根据 URL 生成管道描述，帧由名为 `src` 的 appsrc 推入
  pub fn pipeline_description(url: &Url) -> Result<String, GStreamerVideoOutputError> {
    if url.scheme() == Self::DISPLAY_SCHEME {
      return Ok("appsrc name=src ! videoconvert ! autovideosink sync=false".to_string());
    }
    if url.scheme() != Self::VIDEO_SCHEME {
      return Err(GStreamerVideoOutputError::SchemeMismatch(
        url.scheme().to_string(),
      ));
    }

    let path = url.path();
    let encoder = match path.rsplit_once('.').map(|(_, ext)| ext) {
      Some("mkv") => "x264enc speed-preset=fast ! h264parse ! matroskamux",
      Some("avi") => "x264enc ! avimux",
      Some("webm") => "vp8enc ! webmmux",
      Some("mp4") => "x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux",
      _ => {
        warn!("未知的视频格式 {}, 按 mp4 编码", path);
        "x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux"
      }
    };
    let convert = if encoder.starts_with("vp8enc") {
      "videoconvert"
    } else {
      "videoconvert ! video/x-raw,format=I420"
    };

    Ok(format!(
      "appsrc name=src ! {} ! {} ! filesink location=\"{}\"",
      convert, encoder, path
    ))
  }

  fn push_frame(&self, data: Vec<u8>) -> Result<(), GStreamerVideoOutputError> {
    let index = self.frame_count.fetch_add(1, Ordering::Relaxed);
    let frame_duration = 1_000_000_000 / self.fps as u64;

    let mut buffer = gst::Buffer::from_mut_slice(data);
    {
      let buffer_ref = buffer.get_mut().ok_or_else(|| {
        GStreamerVideoOutputError::PipelineError("无法写入帧缓冲区".to_string())
      })?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(index * frame_duration));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }

    self.appsrc.push_buffer(buffer)?;
    Ok(())
  }
}

impl<const W: u32, const H: u32> FromUrl for GStreamerVideoOutput<W, H> {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let pipeline_desc = Self::pipeline_description(url)?;
    let fps: i32 = url
      .query_pairs()
      .find(|(key, _)| key == "fps")
      .and_then(|(_, value)| value.parse().ok())
      .filter(|fps| *fps > 0)
      .unwrap_or(DEFAULT_FPS);
    let draw = Draw::from_url(url)?;

    gst::init()?;
    info!("创建输出管道: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerVideoOutputError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .and_then(|element| element.downcast::<gst_app::AppSrc>().ok())
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", W as i32)
      .field("height", H as i32)
      .field("framerate", gst::Fraction::new(fps, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;
    info!("输出管道已启动: {}x{} @ {} fps", W, H, fps);

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      draw,
      fps,
      frame_count: AtomicU64::new(0),
    })
  }
}

impl<const W: u32, const H: u32> Drop for GStreamerVideoOutput<W, H> {
  fn drop(&mut self) {
    // 发送 EOS 让封装器写完文件尾
    if let Err(e) = self.appsrc.end_of_stream() {
      warn!("发送 EOS 失败: {:?}", e);
    }
    if let Some(bus) = self.pipeline.bus() {
      let _ = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止输出管道失败: {}", e);
    }

    info!(
      "输出管道已关闭, 共写入 {} 帧",
      self.frame_count.load(Ordering::Relaxed)
    );
  }
}

impl<const W: u32, const H: u32> Render<RgbNhwcFrame<W, H>> for GStreamerVideoOutput<W, H> {
  type Error = GStreamerVideoOutputError;

  fn render_result(
    &self,
    frame: &RgbNhwcFrame<W, H>,
    detections: &[Detection],
  ) -> Result<(), Self::Error> {
    let data = if detections.is_empty() && !self.draw.has_font() {
      frame.as_nhwc().to_vec()
    } else {
      self.draw.annotate(frame, detections).into_raw()
    };
    debug!("推送第 {} 帧", self.frame_count.load(Ordering::Relaxed));
    self.push_frame(data)
  }
}
