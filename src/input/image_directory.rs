// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_directory.rs - 图片序列输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::decode_image, url_file_path};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("无法读取目录 {path}: {source}")]
  ReadDir {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("无法解码帧 {path}: {source}")]
  Decode {
    path: String,
    #[source]
    source: image::ImageError,
  },
}

/// 按文件名顺序把目录中的图片当作连续帧读取，
/// 用于离线处理导出的视频帧或摄像头抓拍。
///
/// 单个文件解码失败只影响该帧，迭代继续。
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemaMismatch);
    }
    Self::open(url_file_path(url))
  }
}

impl ImageDirectoryInput {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, ImageDirectoryInputError> {
    let directory = directory.into();
    let read_dir_error = |source| ImageDirectoryInputError::ReadDir {
      path: directory.display().to_string(),
      source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory).map_err(read_dir_error)? {
      let path = entry.map_err(read_dir_error)?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
          IMAGE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
        });
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    files.sort();

    info!(
      "图片序列已打开: {} ({} 帧)",
      directory.display(),
      files.len()
    );
    Ok(Self {
      pending: files.into(),
    })
  }

  /// 剩余帧数
  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<Frame, ImageDirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop_front()?;
    debug!("读取帧: {}", path.display());
    Some(
      decode_image(&path).map_err(|source| ImageDirectoryInputError::Decode {
        path: path.display().to_string(),
        source,
      }),
    )
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.pending.len(), Some(self.pending.len()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn frames_follow_file_name_order_and_skip_other_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([2, 0, 0]))
      .save(dir.path().join("frame-002.png"))
      .unwrap();
    RgbImage::from_pixel(2, 2, Rgb([1, 0, 0]))
      .save(dir.path().join("frame-001.PNG"))
      .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let input = ImageDirectoryInput::open(dir.path()).unwrap();
    assert_eq!(input.remaining(), 2);
    let reds: Vec<u8> = input.map(|f| f.unwrap().pixel(0, 0).unwrap()[0]).collect();
    assert_eq!(reds, [1, 2]);
  }

  #[test]
  fn broken_frame_is_reported_and_iteration_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.png"), b"garbage").unwrap();
    RgbImage::new(3, 3).save(dir.path().join("b.png")).unwrap();

    let mut input = ImageDirectoryInput::open(dir.path()).unwrap();
    assert!(matches!(
      input.next(),
      Some(Err(ImageDirectoryInputError::Decode { .. }))
    ));
    assert!(input.next().unwrap().is_ok());
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_directory_fails_to_open() {
    let url = Url::parse("folder:///definitely/not/here").unwrap();
    assert!(matches!(
      ImageDirectoryInput::from_url(&url),
      Err(ImageDirectoryInputError::ReadDir { .. })
    ));
  }
}
