// 该文件是 Shanan （山南西风） 项目的一部分。
// src/annotate.rs - 单帧检测与标注
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # 帧标注
//!
//! [`FrameAnnotator`] 把一帧图像交给检测后端，再把合法的检测结果
//! （边框 + 大写类别名）画回同一块缓冲区。
//!
//! 标注始终在原缓冲区上进行：[`FrameAnnotator::annotate`] 接管帧的所有权并
//! 原样交还，[`FrameAnnotator::annotate_in_place`] 借用帧。单张图片与连续帧
//! 两种输入都走同一条路径。
//!
//! ```no_run
//! use shanan_annotator::{
//!   annotate::FrameAnnotator,
//!   frame::Frame,
//!   label::LabelTable,
//!   model::{ReplayBackend, Threshold},
//!   output::draw::GlyphPainter,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let labels = LabelTable::load("labels.txt")?;
//! let painter = GlyphPainter::from_path("font.ttf")?;
//! let annotator = FrameAnnotator::new(labels, painter).with_threshold(Threshold::new(0.55)?);
//! let backend = ReplayBackend::parse("[]")?;
//! let frame = annotator.annotate(Frame::with_shape(640, 480), &backend)?;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
  frame::{Frame, FrameError},
  label::LabelTable,
  model::{DetectionBackend, LabeledDetection, Threshold},
  output::draw::{LabelPainter, Style, draw_box_outline},
};

#[derive(Error, Debug)]
pub enum AnnotateError<E> {
  #[error("无效帧: {0}")]
  InvalidFrame(#[from] FrameError),
  /// 后端错误原样向上传递
  #[error(transparent)]
  Backend(E),
}

pub struct FrameAnnotator<P> {
  labels: LabelTable,
  threshold: Threshold,
  style: Style,
  painter: P,
}

impl<P: LabelPainter> FrameAnnotator<P> {
  /// 标签表在构造时已保证非空
  pub fn new(labels: LabelTable, painter: P) -> Self {
    Self {
      labels,
      threshold: Threshold::default(),
      style: Style::default(),
      painter,
    }
  }

  pub fn with_threshold(mut self, threshold: Threshold) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_style(mut self, style: Style) -> Self {
    self.style = style;
    self
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn threshold(&self) -> Threshold {
    self.threshold
  }

  pub fn style(&self) -> &Style {
    &self.style
  }

  pub fn painter(&self) -> &P {
    &self.painter
  }

  /// 检测并标注，返回同一块缓冲区
  pub fn annotate<B: DetectionBackend>(
    &self,
    mut frame: Frame,
    backend: &B,
  ) -> Result<Frame, AnnotateError<B::Error>> {
    self.annotate_in_place(&mut frame, backend)?;
    Ok(frame)
  }

  /// 检测并在原帧上标注，返回实际绘制的检测结果
  pub fn annotate_in_place<B: DetectionBackend>(
    &self,
    frame: &mut Frame,
    backend: &B,
  ) -> Result<Vec<LabeledDetection>, AnnotateError<B::Error>> {
    frame.validate()?;

    let detections = backend
      .detect(frame, self.threshold)
      .map_err(AnnotateError::Backend)?;
    if detections.is_empty() {
      return Ok(Vec::new());
    }
    debug!("后端返回 {} 个检测结果", detections.len());

    let color = frame.order().pixel(self.style.color);
    let mut canvas = frame.canvas()?;
    let mut drawn = Vec::with_capacity(detections.len());

    for detection in detections {
      let Some(label) = self.labels.display_name(detection.class_id) else {
        debug!(
          "类别编号 {} 超出标签表范围 [1, {}], 跳过",
          detection.class_id,
          self.labels.len()
        );
        continue;
      };

      // 边框完全在画面外时文字仍可能落在画面内，照常绘制
      if !draw_box_outline(&mut canvas, &detection.bbox, color, self.style.thickness) {
        trace!("检测框 {:?} 不在画面内, 仅绘制标签", detection.bbox);
      }

      let origin = self.style.label_origin(&detection.bbox);
      self
        .painter
        .paint_label(&mut canvas, origin, &label, color, &self.style);

      drawn.push(LabeledDetection { label, detection });
    }

    Ok(drawn)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::convert::Infallible;

  use image::Rgb;

  use super::*;
  use crate::frame::RgbCanvas;
  use crate::model::{BoundingBox, Detection};

  #[derive(Default)]
  struct RecordingPainter {
    calls: RefCell<Vec<((i32, i32), String)>>,
  }

  impl LabelPainter for RecordingPainter {
    fn paint_label(
      &self,
      _canvas: &mut RgbCanvas<'_>,
      origin: (i32, i32),
      text: &str,
      _color: Rgb<u8>,
      _style: &Style,
    ) {
      self.calls.borrow_mut().push((origin, text.to_string()));
    }
  }

  struct FixedBackend(Vec<Detection>);

  impl DetectionBackend for FixedBackend {
    type Error = Infallible;

    fn detect(&self, _frame: &Frame, _threshold: Threshold) -> Result<Vec<Detection>, Infallible> {
      Ok(self.0.clone())
    }
  }

  #[derive(Debug, Error)]
  #[error("推理失败")]
  struct InferenceFailed;

  struct FailingBackend;

  impl DetectionBackend for FailingBackend {
    type Error = InferenceFailed;

    fn detect(&self, _frame: &Frame, _threshold: Threshold) -> Result<Vec<Detection>, Self::Error> {
      Err(InferenceFailed)
    }
  }

  fn det(class_id: i32, x: i32, y: i32, w: i32, h: i32) -> Detection {
    Detection {
      class_id,
      confidence: 0.9,
      bbox: BoundingBox::new(x, y, w, h),
    }
  }

  fn annotator() -> FrameAnnotator<RecordingPainter> {
    let labels = LabelTable::new(["person", "car"]).unwrap();
    FrameAnnotator::new(labels, RecordingPainter::default())
      .with_threshold(Threshold::new(0.5).unwrap())
  }

  #[test]
  fn empty_detections_leave_frame_untouched() {
    let annotator = annotator();
    let input = Frame::with_shape(32, 24);
    let output = annotator.annotate(input.clone(), &FixedBackend(vec![])).unwrap();
    assert_eq!(output, input);
    assert!(annotator.painter.calls.borrow().is_empty());
  }

  #[test]
  fn valid_detection_draws_box_and_upper_case_label() {
    let annotator = annotator();
    let mut frame = Frame::with_shape(100, 100);
    let drawn = annotator
      .annotate_in_place(&mut frame, &FixedBackend(vec![det(1, 10, 10, 50, 50)]))
      .unwrap();

    assert_eq!(drawn.len(), 1);
    assert_eq!(drawn[0].label, "PERSON");
    assert_eq!(frame.pixel(10, 10), Some([0, 255, 0]));
    assert_eq!(frame.pixel(60, 60), Some([0, 255, 0]));
    assert_eq!(frame.pixel(35, 35), Some([0, 0, 0]));
    assert_eq!(
      *annotator.painter.calls.borrow(),
      vec![((15, 30), "PERSON".to_string())]
    );
  }

  #[test]
  fn out_of_range_class_ids_are_skipped() {
    let annotator = annotator();
    let input = Frame::with_shape(100, 100);
    let backend = FixedBackend(vec![
      det(0, 10, 10, 50, 50),
      det(3, 10, 10, 50, 50),
      det(-7, 10, 10, 50, 50),
    ]);
    let output = annotator.annotate(input.clone(), &backend).unwrap();
    assert_eq!(output, input);
    assert!(annotator.painter.calls.borrow().is_empty());
  }

  #[test]
  fn skipped_detection_does_not_stop_the_rest() {
    let annotator = annotator();
    let mut frame = Frame::with_shape(100, 100);
    let backend = FixedBackend(vec![det(9, 0, 0, 5, 5), det(2, 20, 20, 10, 10)]);
    let drawn = annotator.annotate_in_place(&mut frame, &backend).unwrap();
    assert_eq!(drawn.len(), 1);
    assert_eq!(drawn[0].label, "CAR");
    assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
    assert_eq!(frame.pixel(20, 20), Some([0, 255, 0]));
  }

  #[test]
  fn boxes_outside_the_frame_do_not_fail() {
    let annotator = annotator();
    let input = Frame::with_shape(40, 30);
    let backend = FixedBackend(vec![
      det(1, 100, 100, 20, 20),
      det(1, -50, -50, 10, 10),
      det(2, i32::MAX, i32::MAX, i32::MAX, i32::MAX),
    ]);
    let output = annotator.annotate(input.clone(), &backend).unwrap();
    assert_eq!(output, input);

    let backend = FixedBackend(vec![det(1, 30, 20, 500, 500)]);
    let output = annotator.annotate(input.clone(), &backend).unwrap();
    assert_eq!((output.width(), output.height(), output.channels()), (40, 30, 3));
    assert_eq!(output.pixel(35, 20), Some([0, 255, 0]));
  }

  #[test]
  fn label_is_painted_when_the_box_is_off_frame() {
    let annotator = annotator();
    let mut frame = Frame::with_shape(100, 100);
    let drawn = annotator
      .annotate_in_place(&mut frame, &FixedBackend(vec![det(1, -20, 10, 10, 30)]))
      .unwrap();

    assert_eq!(frame, Frame::with_shape(100, 100));
    assert_eq!(drawn.len(), 1);
    assert_eq!(drawn[0].label, "PERSON");
    assert_eq!(
      *annotator.painter.calls.borrow(),
      vec![((-15, 30), "PERSON".to_string())]
    );
  }

  #[test]
  fn invalid_frames_are_rejected_before_detection() {
    let annotator = annotator();
    let empty = Frame::from_raw(0, 10, 3, Vec::new()).unwrap();
    let err = annotator.annotate(empty, &FailingBackend).unwrap_err();
    assert!(matches!(
      err,
      AnnotateError::InvalidFrame(FrameError::EmptyFrame { .. })
    ));

    let rgba = Frame::from_raw(2, 2, 4, vec![0; 16]).unwrap();
    let err = annotator.annotate(rgba, &FailingBackend).unwrap_err();
    assert!(matches!(
      err,
      AnnotateError::InvalidFrame(FrameError::ChannelMismatch { actual: 4, .. })
    ));
  }

  #[test]
  fn backend_errors_propagate_unchanged() {
    let annotator = annotator();
    let err = annotator
      .annotate(Frame::with_shape(8, 8), &FailingBackend)
      .unwrap_err();
    assert!(matches!(err, AnnotateError::Backend(InferenceFailed)));
    assert_eq!(err.to_string(), "推理失败");
  }

  #[test]
  fn bgr_frames_get_the_same_visible_colour() {
    let labels = LabelTable::new(["person"]).unwrap();
    let annotator = FrameAnnotator::new(labels, RecordingPainter::default()).with_style(Style {
      color: [255, 0, 0],
      ..Style::default()
    });
    let frame = Frame::with_shape(20, 20).with_order(crate::frame::ChannelOrder::Bgr);
    let frame = annotator
      .annotate(frame, &FixedBackend(vec![det(1, 2, 2, 10, 10)]))
      .unwrap();
    assert_eq!(frame.pixel(2, 2), Some([0, 0, 255]));
    assert_eq!(frame.to_rgb_image().unwrap().get_pixel(2, 2), &Rgb([255, 0, 0]));
  }
}
