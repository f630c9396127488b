// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label.rs - 类别标签表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::Path, str::FromStr, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签表为空")]
  EmptyLabelTable,
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// 类别名称表。类别编号从 1 开始，第 N 行对应编号 N。
///
/// 内部以 `Arc` 共享，克隆开销很小，可在多个线程间只读共享。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  names: Arc<[String]>,
}

impl LabelTable {
  pub fn new<I, S>(names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(LabelError::EmptyLabelTable);
    }
    Ok(Self {
      names: names.into(),
    })
  }

  /// 从文本文件加载标签，每行一个类别名
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let table: Self = text.parse()?;
    debug!("标签数量: {}", table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 按 1 起始的类别编号查找名称，越界时返回 None
  pub fn get(&self, class_id: i32) -> Option<&str> {
    if class_id < 1 {
      return None;
    }
    self
      .names
      .get(class_id as usize - 1)
      .map(String::as_str)
  }

  /// 绘制用的标签文本（大写）
  pub fn display_name(&self, class_id: i32) -> Option<String> {
    self.get(class_id).map(str::to_uppercase)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

impl FromStr for LabelTable {
  type Err = LabelError;

  // 只去掉末尾换行，中间的空行保留为空名称，以免后续编号错位
  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let body = text.trim_end_matches(['\n', '\r']);
    if body.is_empty() {
      return Err(LabelError::EmptyLabelTable);
    }
    LabelTable::new(
      body
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line)),
    )
  }
}
