// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

/// 可直接绘制的帧视图，像素数据与帧共享
pub type RgbCanvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧面积为零: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("通道数不匹配: 期望 {expected}, 实际 {actual}")]
  ChannelMismatch { expected: usize, actual: usize },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 通道排列顺序。摄像头采集的数据通常是 BGR。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl ChannelOrder {
  /// 把 RGB 颜色转换为该顺序下的像素值
  pub fn pixel(self, rgb: [u8; 3]) -> Rgb<u8> {
    match self {
      ChannelOrder::Rgb => Rgb(rgb),
      ChannelOrder::Bgr => Rgb([rgb[2], rgb[1], rgb[0]]),
    }
  }
}

/// 交错存储（HWC）的 8 位图像帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  width: u32,
  height: u32,
  channels: usize,
  order: ChannelOrder,
  data: Box<[u8]>,
}

impl Frame {
  /// 用原始数据构造帧，只检查数据长度与形状是否一致
  pub fn from_raw(
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let expected = width as usize * height as usize * channels;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      channels,
      order: ChannelOrder::default(),
      data: data.into_boxed_slice(),
    })
  }

  /// 全黑的 RGB 帧
  pub fn with_shape(width: u32, height: u32) -> Self {
    let size = RGB_CHANNELS * width as usize * height as usize;
    Self {
      width,
      height,
      channels: RGB_CHANNELS,
      order: ChannelOrder::default(),
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  pub fn with_order(mut self, order: ChannelOrder) -> Self {
    self.order = order;
    self
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  /// 检查帧是否可以被标注：面积非零且为三通道
  pub fn validate(&self) -> Result<(), FrameError> {
    if self.width == 0 || self.height == 0 {
      return Err(FrameError::EmptyFrame {
        width: self.width,
        height: self.height,
      });
    }
    if self.channels != RGB_CHANNELS {
      return Err(FrameError::ChannelMismatch {
        expected: RGB_CHANNELS,
        actual: self.channels,
      });
    }
    Ok(())
  }

  /// 读取 (x, y) 处的像素，越界或非三通道时返回 None
  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
    if x >= self.width || y >= self.height || self.channels != RGB_CHANNELS {
      return None;
    }
    let idx = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }

  /// 在原缓冲区上创建画布
  pub fn canvas(&mut self) -> Result<RgbCanvas<'_>, FrameError> {
    self.validate()?;
    let (width, height) = (self.width, self.height);
    let actual = self.data.len();
    ImageBuffer::from_raw(width, height, &mut self.data[..]).ok_or(FrameError::LengthMismatch {
      expected: width as usize * height as usize * RGB_CHANNELS,
      actual,
    })
  }

  /// 转为 RGB 图像，BGR 帧会交换通道
  pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
    self.validate()?;
    let mut data = self.data.to_vec();
    if self.order == ChannelOrder::Bgr {
      for px in data.chunks_exact_mut(RGB_CHANNELS) {
        px.swap(0, 2);
      }
    }
    RgbImage::from_raw(self.width, self.height, data).ok_or(FrameError::LengthMismatch {
      expected: self.width as usize * self.height as usize * RGB_CHANNELS,
      actual: self.data.len(),
    })
  }
}

impl AsMut<[u8]> for Frame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      channels: RGB_CHANNELS,
      order: ChannelOrder::Rgb,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}
