// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测后端接口与检测结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::Deserialize;
use thiserror::Error;

use crate::frame::Frame;

/// 轴对齐矩形，像素坐标，左上角 + 宽高。可能部分或全部落在帧外。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoundingBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 右下角坐标（包含），以 i64 计算避免溢出
  pub fn bottom_right(&self) -> (i64, i64) {
    (
      self.x as i64 + self.width as i64,
      self.y as i64 + self.height as i64,
    )
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
  /// 1 起始的类别编号
  pub class_id: i32,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

/// 已绘制的检测结果，附带绘制时使用的标签文本
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDetection {
  pub label: String,
  pub detection: Detection,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
  #[error("置信度阈值必须在 [0, 1] 范围内, 实际为 {0}")]
  OutOfRange(f32),
}

/// 置信度阈值
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Threshold(f32);

impl Threshold {
  pub const DEFAULT: Threshold = Threshold(0.55);

  pub fn new(value: f32) -> Result<Self, ThresholdError> {
    // NaN 也会在这里被拒绝
    if (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(ThresholdError::OutOfRange(value))
    }
  }

  pub fn value(self) -> f32 {
    self.0
  }

  pub fn admits(self, confidence: f32) -> bool {
    confidence >= self.0
  }
}

impl Default for Threshold {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// 检测后端。推理与 NMS 都由后端负责，返回的结果应已按阈值过滤。
pub trait DetectionBackend {
  type Error;

  fn detect(&self, frame: &Frame, threshold: Threshold) -> Result<Vec<Detection>, Self::Error>;
}

impl<B: DetectionBackend + ?Sized> DetectionBackend for &B {
  type Error = B::Error;

  fn detect(&self, frame: &Frame, threshold: Threshold) -> Result<Vec<Detection>, Self::Error> {
    (**self).detect(frame, threshold)
  }
}

mod replay;
pub use self::replay::{ReplayBackend, ReplayError};
