// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 输入、标注与输出的任务循环
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};
use std::time::Instant;

use tracing::{info, warn};

use crate::{
  annotate::{AnnotateError, FrameAnnotator},
  frame::Frame,
  model::DetectionBackend,
  output::{Render, draw::LabelPainter},
};

/// 任务统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  /// 已输出的帧数
  pub frames: usize,
  /// 被跳过的坏帧数
  pub skipped: usize,
  /// 绘制的检测框总数
  pub detections: usize,
}

pub trait Task<I, B, O>: Sized {
  type Error;
  fn run_task<P: LabelPainter>(
    self,
    input: I,
    annotator: &FrameAnnotator<P>,
    backend: &B,
    output: &O,
  ) -> Result<TaskSummary, Self::Error>;
}

/// 图片模式：只处理第一帧，任何错误都直接返回给调用方
pub struct OneShotTask;

impl<IE, BE, RE, I, B, O> Task<I, B, O> for OneShotTask
where
  IE: std::error::Error + Sync + Send + 'static,
  BE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  B: DetectionBackend<Error = BE>,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task<P: LabelPainter>(
    self,
    mut input: I,
    annotator: &FrameAnnotator<P>,
    backend: &B,
    output: &O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let mut frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let drawn = annotator.annotate_in_place(&mut frame, backend)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    for item in &drawn {
      info!(
        "  - {}: {:.2}% at ({}, {}, {}x{})",
        item.label,
        item.detection.confidence * 100.0,
        item.detection.bbox.x,
        item.detection.bbox.y,
        item.detection.bbox.width,
        item.detection.bbox.height
      );
    }
    output.render_result(&frame, &drawn)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(TaskSummary {
      frames: 1,
      skipped: 0,
      detections: drawn.len(),
    })
  }
}

/// 视频/摄像头模式：逐帧处理，直到输入结束、达到帧数上限或收到停止信号。
///
/// 读取失败、无效帧和后端错误只跳过当前帧；输出错误会终止任务。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Arc<AtomicBool>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|&n| n > 0);
    self
  }

  /// 外部置位后，任务在当前帧结束时退出
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 注册 Ctrl-C 处理，收到信号后置位停止标志
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let stop = self.stop_flag();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
    })?;
    Ok(self)
  }
}

impl<IE, BE, RE, I, B, O> Task<I, B, O> for ContinuousTask
where
  IE: std::error::Error + Sync + Send + 'static,
  BE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  B: DetectionBackend<Error = BE>,
  O: Render<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task<P: LabelPainter>(
    self,
    mut input: I,
    annotator: &FrameAnnotator<P>,
    backend: &B,
    output: &O,
  ) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");
    let mut summary = TaskSummary::default();
    let mut now = Instant::now();
    let mut pulled = 0;

    // 先检查退出条件再读取下一帧
    loop {
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if self.frame_number.is_some_and(|n| pulled >= n) {
        info!("达到指定帧数 {}, 退出任务循环", pulled);
        break;
      }
      let Some(item) = input.next() else {
        break;
      };
      let index = pulled;
      pulled += 1;

      info!("处理第 {} 帧图像", index + 1);
      let mut frame = match item {
        Ok(frame) => frame,
        Err(e) => {
          warn!("第 {} 帧读取失败, 跳过: {}", index + 1, e);
          summary.skipped += 1;
          continue;
        }
      };

      let drawn = match annotator.annotate_in_place(&mut frame, backend) {
        Ok(drawn) => drawn,
        Err(AnnotateError::InvalidFrame(e)) => {
          warn!("第 {} 帧无效, 跳过: {}", index + 1, e);
          summary.skipped += 1;
          continue;
        }
        Err(AnnotateError::Backend(e)) => {
          warn!("第 {} 帧推理失败, 跳过: {}", index + 1, e);
          summary.skipped += 1;
          continue;
        }
      };
      let elapsed_a = now.elapsed();

      if !drawn.is_empty() {
        info!("帧 {}: 检测到 {} 个对象", index + 1, drawn.len());
      }
      output.render_result(&frame, &drawn)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      summary.frames += 1;
      summary.detections += drawn.len();
    }

    info!(
      "任务完成，退出: 输出 {} 帧, 跳过 {} 帧, 共 {} 个标注",
      summary.frames, summary.skipped, summary.detections
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use image::Rgb;
  use thiserror::Error;

  use super::*;
  use crate::{
    frame::RgbCanvas,
    label::LabelTable,
    model::{BoundingBox, Detection, LabeledDetection, Threshold},
    output::draw::Style,
  };

  struct NoText;

  impl LabelPainter for NoText {
    fn paint_label(&self, _: &mut RgbCanvas<'_>, _: (i32, i32), _: &str, _: Rgb<u8>, _: &Style) {}
  }

  #[derive(Debug, Error)]
  #[error("{0}")]
  struct TestError(&'static str);

  /// 按调用次序返回结果的后端，`None` 表示推理失败
  struct ScriptedBackend(RefCell<Vec<Option<Vec<Detection>>>>);

  impl ScriptedBackend {
    fn new(mut script: Vec<Option<Vec<Detection>>>) -> Self {
      script.reverse();
      Self(RefCell::new(script))
    }
  }

  impl DetectionBackend for ScriptedBackend {
    type Error = TestError;

    fn detect(&self, _: &Frame, _: Threshold) -> Result<Vec<Detection>, TestError> {
      match self.0.borrow_mut().pop() {
        Some(Some(items)) => Ok(items),
        Some(None) => Err(TestError("推理失败")),
        None => Ok(Vec::new()),
      }
    }
  }

  #[derive(Default)]
  struct CollectingOutput {
    frames: RefCell<Vec<(Frame, Vec<String>)>>,
    fail: bool,
  }

  impl Render for CollectingOutput {
    type Error = TestError;

    fn render_result(&self, frame: &Frame, detections: &[LabeledDetection]) -> Result<(), TestError> {
      if self.fail {
        return Err(TestError("写入失败"));
      }
      self.frames.borrow_mut().push((
        frame.clone(),
        detections.iter().map(|d| d.label.clone()).collect(),
      ));
      Ok(())
    }
  }

  fn person() -> Detection {
    Detection {
      class_id: 1,
      confidence: 0.9,
      bbox: BoundingBox::new(1, 1, 4, 4),
    }
  }

  fn annotator() -> FrameAnnotator<NoText> {
    FrameAnnotator::new(LabelTable::new(["person"]).unwrap(), NoText)
  }

  fn frames(n: usize) -> Vec<Result<Frame, TestError>> {
    (0..n).map(|_| Ok(Frame::with_shape(8, 8))).collect()
  }

  #[test]
  fn one_shot_renders_first_frame() {
    let backend = ScriptedBackend::new(vec![Some(vec![person()])]);
    let output = CollectingOutput::default();
    let summary = OneShotTask
      .run_task(frames(3).into_iter(), &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(
      summary,
      TaskSummary {
        frames: 1,
        skipped: 0,
        detections: 1
      }
    );
    let rendered = output.frames.borrow();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].1, ["PERSON"]);
    assert_eq!(rendered[0].0.pixel(1, 1), Some([0, 255, 0]));
  }

  #[test]
  fn one_shot_reports_missing_and_bad_frames() {
    let backend = ScriptedBackend::new(vec![]);
    let output = CollectingOutput::default();
    let empty: Vec<Result<Frame, TestError>> = Vec::new();
    assert!(
      OneShotTask
        .run_task(empty.into_iter(), &annotator(), &backend, &output)
        .is_err()
    );

    let invalid: Vec<Result<Frame, TestError>> = vec![Ok(Frame::from_raw(0, 0, 3, Vec::new()).unwrap())];
    assert!(
      OneShotTask
        .run_task(invalid.into_iter(), &annotator(), &backend, &output)
        .is_err()
    );
    assert!(output.frames.borrow().is_empty());
  }

  #[test]
  fn continuous_skips_bad_frames_and_keeps_going() {
    let backend = ScriptedBackend::new(vec![Some(vec![person()]), None, Some(vec![])]);
    let output = CollectingOutput::default();
    let input = vec![
      Ok(Frame::with_shape(8, 8)),
      Err(TestError("解码失败")),
      Ok(Frame::from_raw(2, 2, 1, vec![0; 4]).unwrap()),
      Ok(Frame::with_shape(8, 8)),
      Ok(Frame::with_shape(8, 8)),
    ];
    let summary = ContinuousTask::default()
      .run_task(input.into_iter(), &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(
      summary,
      TaskSummary {
        frames: 2,
        skipped: 3,
        detections: 1
      }
    );
    let rendered = output.frames.borrow();
    assert_eq!(rendered[0].1, ["PERSON"]);
    assert!(rendered[1].1.is_empty());
    assert_eq!(rendered[1].0, Frame::with_shape(8, 8));
  }

  #[test]
  fn continuous_respects_frame_limit() {
    let backend = ScriptedBackend::new(vec![]);
    let output = CollectingOutput::default();
    let summary = ContinuousTask::default()
      .with_frame_number(Some(2))
      .run_task(frames(5).into_iter(), &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(summary.frames, 2);

    let summary = ContinuousTask::default()
      .with_frame_number(Some(0))
      .run_task(frames(5).into_iter(), &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(summary.frames, 5);
  }

  #[test]
  fn continuous_stops_when_flag_is_raised() {
    let backend = ScriptedBackend::new(vec![]);
    let output = CollectingOutput::default();
    let task = ContinuousTask::default();
    task.stop_flag().store(true, Ordering::SeqCst);
    let summary = task
      .run_task(frames(3).into_iter(), &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(summary, TaskSummary::default());
  }

  #[test]
  fn continuous_does_not_read_past_the_limit() {
    let backend = ScriptedBackend::new(vec![]);
    let output = CollectingOutput::default();
    let read = std::cell::Cell::new(0);
    let input = frames(5).into_iter().inspect(|_| read.set(read.get() + 1));
    ContinuousTask::default()
      .with_frame_number(Some(2))
      .run_task(input, &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(read.get(), 2);

    let task = ContinuousTask::default();
    task.stop_flag().store(true, Ordering::SeqCst);
    let read = std::cell::Cell::new(0);
    let input = frames(5).into_iter().inspect(|_| read.set(read.get() + 1));
    task
      .run_task(input, &annotator(), &backend, &output)
      .unwrap();
    assert_eq!(read.get(), 0);
  }

  #[test]
  fn continuous_aborts_on_output_failure() {
    let backend = ScriptedBackend::new(vec![]);
    let output = CollectingOutput {
      fail: true,
      ..Default::default()
    };
    assert!(
      ContinuousTask::default()
        .run_task(frames(2).into_iter(), &annotator(), &backend, &output)
        .is_err()
    );
  }
}
