// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::Rgb;
use imageproc::drawing::{Canvas, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::info;

use crate::{frame::RgbCanvas, model::BoundingBox};

// 绘制常量
const STROKE_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const STROKE_THICKNESS: u32 = 2;
const LABEL_OFFSET: (i32, i32) = (5, 20);
const LABEL_FONT_SIZE: f32 = 16.0;
const MAX_STROKE_THICKNESS: u32 = 64;

/// 标注样式
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
  /// RGB 颜色，边框和文字共用
  pub color: [u8; 3],
  /// 边框线宽（像素），向框内加粗
  pub thickness: u32,
  /// 文字基线原点相对边框左上角的偏移
  pub label_offset: (i32, i32),
  pub font_size: f32,
}

impl Default for Style {
  fn default() -> Self {
    Self {
      color: STROKE_COLOR,
      thickness: STROKE_THICKNESS,
      label_offset: LABEL_OFFSET,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl Style {
  /// 实际使用的线宽，限制在 [1, 64]
  pub fn stroke(&self) -> u32 {
    clamp_thickness(self.thickness)
  }

  pub fn label_origin(&self, bbox: &BoundingBox) -> (i32, i32) {
    (
      bbox.x.saturating_add(self.label_offset.0),
      bbox.y.saturating_add(self.label_offset.1),
    )
  }
}

/// 标签文字绘制器
pub trait LabelPainter {
  /// `origin` 为文字基线的左端点
  fn paint_label(
    &self,
    canvas: &mut RgbCanvas<'_>,
    origin: (i32, i32),
    text: &str,
    color: Rgb<u8>,
    style: &Style,
  );
}

impl<P: LabelPainter + ?Sized> LabelPainter for &P {
  fn paint_label(
    &self,
    canvas: &mut RgbCanvas<'_>,
    origin: (i32, i32),
    text: &str,
    color: Rgb<u8>,
    style: &Style,
  ) {
    (**self).paint_label(canvas, origin, text, color, style)
  }
}

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  Invalid(#[from] ab_glyph::InvalidFont),
}

/// 基于 TrueType 字体的标签绘制器
#[derive(Clone)]
pub struct GlyphPainter {
  font: FontArc,
}

impl GlyphPainter {
  pub fn new(font: FontArc) -> Self {
    Self { font }
  }

  /// 使用内置的 DejaVu Sans 字体
  pub fn embedded() -> Result<Self, FontError> {
    let font_data: &'static [u8] = include_bytes!("../../assets/DejaVuSans.ttf");
    Ok(Self::new(FontArc::try_from_slice(font_data)?))
  }

  pub fn from_bytes(data: Vec<u8>) -> Result<Self, FontError> {
    Ok(Self::new(FontArc::try_from_vec(data)?))
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FontError> {
    let path = path.as_ref();
    info!("加载字体文件: {}", path.display());
    let data = std::fs::read(path).map_err(|source| FontError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_bytes(data)
  }
}

impl LabelPainter for GlyphPainter {
  fn paint_label(
    &self,
    canvas: &mut RgbCanvas<'_>,
    origin: (i32, i32),
    text: &str,
    color: Rgb<u8>,
    style: &Style,
  ) {
    let scale = PxScale::from(style.font_size);
    // draw_text_mut 以文字顶端定位，这里换算成基线
    let ascent = self.font.as_scaled(scale).ascent().round() as i32;
    let top = origin.1.saturating_sub(ascent);

    // 逐像素右移叠加，模拟线宽
    for dx in 0..style.stroke() as i32 {
      draw_text_mut(
        canvas,
        color,
        origin.0.saturating_add(dx),
        top,
        scale,
        &self.font,
        text,
      );
    }
  }
}

/// 绘制空心矩形，覆盖 (x, y) 到 (x + w, y + h)（含）。
///
/// 线宽向框内加粗。越界部分按像素裁剪；坐标先夹到帧外一圈，
/// 避免超大坐标导致逐点迭代过长。完全在帧外或尺寸为负时不绘制，返回 false。
pub fn draw_box_outline<C: Canvas>(
  canvas: &mut C,
  bbox: &BoundingBox,
  color: C::Pixel,
  thickness: u32,
) -> bool {
  if bbox.width < 0 || bbox.height < 0 {
    return false;
  }

  let (w, h) = canvas.dimensions();
  let (w, h) = (w as i64, h as i64);
  let (x0, y0) = (bbox.x as i64, bbox.y as i64);
  let (x1, y1) = bbox.bottom_right();

  if x1 < 0 || y1 < 0 || x0 >= w || y0 >= h {
    return false;
  }

  let thickness = clamp_thickness(thickness);
  let margin = thickness as i64;
  let clamp_x = |v: i64| v.clamp(-margin, w + margin) as i32;
  let clamp_y = |v: i64| v.clamp(-margin, h + margin) as i32;
  let (left, top, right, bottom) = (clamp_x(x0), clamp_y(y0), clamp_x(x1), clamp_y(y1));

  for t in 0..thickness as i32 {
    let (l, tp, r, b) = (left + t, top + t, right - t, bottom - t);
    if l > r || tp > b {
      break;
    }
    let rect = Rect::at(l, tp).of_size((r - l + 1) as u32, (b - tp + 1) as u32);
    draw_hollow_rect_mut(canvas, rect, color);
  }
  true
}

fn clamp_thickness(thickness: u32) -> u32 {
  thickness.clamp(1, MAX_STROKE_THICKNESS)
}
