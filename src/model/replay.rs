// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/replay.rs - 回放检测结果的后端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{Detection, DetectionBackend, Threshold},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
  #[error("回放状态锁已损坏")]
  Poisoned,
}

/// 按帧回放预先记录的检测结果。
///
/// 记录文件每行是一个 JSON 数组，对应一帧的全部检测结果；
/// 第 i 次调用 `detect` 返回第 i 行。记录用完后返回空结果，
/// 除非开启循环（URL 查询参数 `loop`）。
pub struct ReplayBackend {
  frames: Vec<Vec<Detection>>,
  cursor: Mutex<usize>,
  looping: bool,
}

impl FromUrlWithScheme for ReplayBackend {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayBackend {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let path = url_file_path(url);
    info!("加载检测记录: {}", path.display());
    let text = std::fs::read_to_string(&path)?;
    let looping = url.query_pairs().any(|(k, _)| k == "loop");
    Ok(Self::parse(&text)?.looping(looping))
  }
}

impl ReplayBackend {
  pub fn new(frames: Vec<Vec<Detection>>) -> Self {
    Self {
      frames,
      cursor: Mutex::new(0),
      looping: false,
    }
  }

  pub fn looping(mut self, looping: bool) -> Self {
    self.looping = looping;
    self
  }

  /// 解析 JSON lines 文本，空行跳过
  pub fn parse(text: &str) -> Result<Self, ReplayError> {
    let mut frames = Vec::new();
    for (idx, line) in text.lines().enumerate() {
      if line.trim().is_empty() {
        continue;
      }
      let detections: Vec<Detection> =
        serde_json::from_str(line).map_err(|source| ReplayError::ParseError {
          line: idx + 1,
          source,
        })?;
      frames.push(detections);
    }
    debug!("检测记录帧数: {}", frames.len());
    Ok(Self::new(frames))
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl DetectionBackend for ReplayBackend {
  type Error = ReplayError;

  fn detect(&self, _frame: &Frame, threshold: Threshold) -> Result<Vec<Detection>, Self::Error> {
    let mut cursor = self.cursor.lock().map_err(|_| ReplayError::Poisoned)?;
    let index = *cursor;
    *cursor += 1;

    let recorded = if self.looping && !self.frames.is_empty() {
      self.frames.get(index % self.frames.len())
    } else {
      self.frames.get(index)
    };

    Ok(
      recorded
        .map(|items| {
          items
            .iter()
            .filter(|det| threshold.admits(det.confidence))
            .cloned()
            .collect()
        })
        .unwrap_or_default(),
    )
  }
}
