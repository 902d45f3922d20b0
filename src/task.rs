// 该文件是 Alertic 项目的一部分。
// src/task.rs - 检测告警主循环
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

use std::{
  fmt::Display,
  sync::mpsc::{Receiver, channel},
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  detect::{Detection, Detector, count_by_class},
  frame::{CapturedFrame, RgbNhwcFrame},
  model::{DetectResult, Model, WithLabel},
  notify::{NotificationHandler, Notifier, SnapshotStore},
  output::Render,
};

const FPS_LOG_INTERVAL: usize = 10;
const FORCE_EXIT_SECS: u64 = 30;

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error>;
}

/// 安装 Ctrl-C 处理，返回的通道在收到信号时可读。
/// 主循环若 30 秒内没有退出则强制结束进程。
pub fn interrupt_channel() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(FORCE_EXIT_SECS));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(rx)
}

/// 逐帧检测并触发告警，直到输入结束、达到帧数上限或收到中断
pub struct AlertTask<N, S> {
  handler: NotificationHandler<N, S>,
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl<N, S> AlertTask<N, S> {
  pub fn new(handler: NotificationHandler<N, S>) -> Self {
    Self {
      handler,
      frame_number: None,
      interrupt: None,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|n| *n > 0);
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }
}

fn format_counts(detections: &[Detection]) -> String {
  let counts = count_by_class(detections);
  if counts.is_empty() {
    return "无".to_string();
  }
  counts
    .iter()
    .map(|(name, count)| format!("{}={}", name, count))
    .collect::<Vec<_>>()
    .join(", ")
}

impl<
  const W: u32,
  const H: u32,
  T: WithLabel,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = CapturedFrame<W, H>>,
  M: Model<Input = RgbNhwcFrame<W, H>, Output = DetectResult<T>, Error = ME>,
  O: Render<RgbNhwcFrame<W, H>, Error = RE>,
  N: Notifier,
  S: SnapshotStore<CapturedFrame<W, H>>,
> Task<I, Detector<M>, O> for AlertTask<N, S>
where
  N::Error: Display,
  S::Error: Display,
{
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, detector: Detector<M>, output: O) -> Result<(), Self::Error> {
    info!(
      "开始检测, 置信度阈值 {:.2}, 关注类别 {:?}",
      detector.confidence_threshold(),
      detector.accepted()
    );

    let mut frame_index = 0usize;
    let mut window_start = Instant::now();
    for captured in input {
      frame_index += 1;
      let started = Instant::now();

      let detections = detector.detect(captured.frame())?;
      let fired = self
        .handler
        .on_detections(&detections, Some(&captured), Instant::now());
      if !fired.is_empty() {
        debug!("第 {} 帧触发告警: {:?}", frame_index, fired);
      }
      output.render_result(captured.frame(), &detections)?;
      debug!("第 {} 帧处理耗时: {:.2?}", frame_index, started.elapsed());

      if frame_index % FPS_LOG_INTERVAL == 0 {
        let elapsed = window_start.elapsed().as_secs_f32();
        let fps = if elapsed > 0.0 {
          FPS_LOG_INTERVAL as f32 / elapsed
        } else {
          0.0
        };
        info!(
          "FPS: {:.1} | 第 {} 帧检测: {}",
          fps,
          frame_index,
          format_counts(&detections)
        );
        window_start = Instant::now();
      }

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", frame_index);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{CocoLabel, DetectItem},
    notify::{CooldownGate, Notification},
  };
  use std::{cell::RefCell, convert::Infallible, path::PathBuf, rc::Rc};

  struct CatEveryFrame;

  impl Model for CatEveryFrame {
    type Input = RgbNhwcFrame<8, 8>;
    type Output = DetectResult<CocoLabel>;
    type Error = std::io::Error;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(DetectResult::from(vec![DetectItem {
        kind: CocoLabel::CAT,
        score: 0.9,
        bbox: [0.0, 0.0, 0.5, 0.5],
      }]))
    }
  }

  #[derive(Clone, Default)]
  struct SharedNotifier(Rc<RefCell<Vec<Notification>>>);

  impl Notifier for SharedNotifier {
    type Error = Infallible;

    fn notify(&self, notification: &Notification) -> Result<(), Self::Error> {
      self.0.borrow_mut().push(notification.clone());
      Ok(())
    }
  }

  struct NoSnapshots;

  impl SnapshotStore<CapturedFrame<8, 8>> for NoSnapshots {
    type Error = String;

    fn save(&self, _frame: &CapturedFrame<8, 8>, _file_name: &str) -> Result<PathBuf, String> {
      Err("read-only".to_string())
    }
  }

  #[derive(Default)]
  struct CountingOutput(RefCell<usize>);

  impl Render<RgbNhwcFrame<8, 8>> for &CountingOutput {
    type Error = Infallible;

    fn render_result(
      &self,
      _frame: &RgbNhwcFrame<8, 8>,
      _detections: &[Detection],
    ) -> Result<(), Self::Error> {
      *self.0.borrow_mut() += 1;
      Ok(())
    }
  }

  fn frames(n: usize) -> impl Iterator<Item = CapturedFrame<8, 8>> {
    (0..n).map(|_| CapturedFrame::from(RgbNhwcFrame::default()))
  }

  fn task(notifier: &SharedNotifier) -> AlertTask<SharedNotifier, NoSnapshots> {
    let gates = vec![CooldownGate::new(CocoLabel::CAT, Duration::from_secs(3600))];
    AlertTask::new(NotificationHandler::new(
      gates,
      notifier.clone(),
      Some(NoSnapshots),
    ))
  }

  #[test]
  fn runs_until_input_ends_and_sends_once() {
    let notifier = SharedNotifier::default();
    let output = CountingOutput::default();
    let detector = Detector::new(CatEveryFrame, 0.5, [CocoLabel::CAT.id()]);

    task(&notifier)
      .run_task(frames(25), detector, &output)
      .unwrap();

    assert_eq!(*output.0.borrow(), 25);
    let sent = notifier.0.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Cat detected!");
    assert!(sent[0].attachment.is_none());
  }

  #[test]
  fn stops_at_frame_number() {
    let notifier = SharedNotifier::default();
    let output = CountingOutput::default();
    let detector = Detector::new(CatEveryFrame, 0.5, [CocoLabel::CAT.id()]);

    task(&notifier)
      .with_frame_number(Some(3))
      .run_task(frames(100), detector, &output)
      .unwrap();
    assert_eq!(*output.0.borrow(), 3);
  }

  #[test]
  fn stops_on_interrupt() {
    let notifier = SharedNotifier::default();
    let output = CountingOutput::default();
    let detector = Detector::new(CatEveryFrame, 0.5, [CocoLabel::CAT.id()]);
    let (tx, rx) = channel();
    tx.send(()).unwrap();

    task(&notifier)
      .with_interrupt(rx)
      .run_task(frames(100), detector, &output)
      .unwrap();
    assert_eq!(*output.0.borrow(), 1);
  }

  #[test]
  fn counts_are_readable() {
    let cat = Detection {
      bbox: [0, 0, 1, 1],
      confidence: 0.9,
      class_id: 15,
      class_name: "cat".to_string(),
    };
    assert_eq!(format_counts(&[]), "无");
    assert_eq!(format_counts(&[cat.clone(), cat]), "cat=2");
  }
}
