// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧检测
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use kanjian::{
  FromUrl,
  args::CommonArgs,
  input::InputWrapper,
  model::Detector,
  output::OutputWrapper,
  task::{OneShotTask, Task},
};

/// 读取一帧，检测并输出结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub common: CommonArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let common = &args.common;

  info!("模型路径: {}", common.model);
  info!("输入来源: {}", common.input);
  info!("输出路径: {}", common.output);

  let labels = Arc::new(common.load_labels()?);
  let config = common.detector_config()?;

  let input = InputWrapper::from_url(&common.input)?;
  let model = Detector::from_url_with(&common.model, config)?;
  let output = OutputWrapper::from_url_with(&common.output, common.build_draw(labels)?)?;

  OneShotTask.run_task(input, model, output)?;

  Ok(())
}
