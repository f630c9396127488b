// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/annotate_continuous.rs - 连续帧标注
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use shanan_annotator::{
  FromUrl,
  annotate::FrameAnnotator,
  input::{InputKind, InputWrapper},
  label::LabelTable,
  model::{ReplayBackend, Threshold},
  output::{OutputWrapper, draw::GlyphPainter},
  task::{ContinuousTask, Task},
};

/// 连续帧标注参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测后端，例如 replay:///path/to/record.jsonl?loop
  #[arg(long, value_name = "BACKEND")]
  pub backend: Url,
  /// 标签文件，每行一个类别名
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 标签文字使用的 TrueType 字体，缺省使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 输入来源，例如 folder:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 folder:///path/to/record?record=name
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.55, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 最大处理帧数（0 表示无限制）
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测后端: {}", args.backend);
  info!("标签文件: {}", args.labels.display());
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("置信度阈值: {}", args.confidence);

  let labels = LabelTable::load(&args.labels)?;
  let painter = match &args.font {
    Some(path) => GlyphPainter::from_path(path)?,
    None => GlyphPainter::embedded()?,
  };
  let annotator =
    FrameAnnotator::new(labels, painter).with_threshold(Threshold::new(args.confidence)?);

  let backend = ReplayBackend::from_url(&args.backend)?;
  let input = InputWrapper::from_url(&args.input)?;
  if input.kind() == InputKind::Still {
    warn!("输入只有一帧, 建议使用 annotate-oneshot");
  }
  let output = OutputWrapper::from_url(&args.output)?;

  let summary = ContinuousTask::default()
    .with_frame_number(Some(args.frame_number))
    .with_ctrlc()?
    .run_task(input, &annotator, &backend, &output)?;

  info!("处理完成!");
  info!("总帧数: {}", summary.frames);
  info!("跳过帧数: {}", summary.skipped);
  info!("总检测数: {}", summary.detections);

  Ok(())
}
