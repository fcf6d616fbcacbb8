// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 检测任务循环
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

use std::{
  sync::mpsc::{Receiver, Sender, TryRecvError, channel},
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 外部停止请求
///
/// 发送端被丢弃也视为停止请求。
pub struct StopSignal {
  rx: Option<Receiver<()>>,
}

impl StopSignal {
  pub fn channel() -> (Sender<()>, StopSignal) {
    let (tx, rx) = channel();
    (tx, StopSignal { rx: Some(rx) })
  }

  /// 从不触发
  pub fn never() -> Self {
    StopSignal { rx: None }
  }

  /// 安装 Ctrl-C 处理器；收到信号 30 秒后仍未退出则强制结束进程
  pub fn ctrlc() -> anyhow::Result<Self> {
    let (tx, signal) = Self::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .map_err(|e| anyhow::anyhow!("无法设置 Ctrl-C 处理器: {}", e))?;
    Ok(signal)
  }

  pub fn should_stop(&self) -> bool {
    match &self.rx {
      Some(rx) => !matches!(rx.try_recv(), Err(TryRecvError::Empty)),
      None => false,
    }
  }
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let infer_elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", infer_elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed() - infer_elapsed);

    Ok(())
  }
}

/// 逐帧处理直到输入结束、达到帧数上限、收到停止请求或渲染端关闭
#[derive(Default)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Option<StopSignal>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
    self.stop = Some(stop);
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let stop = self.stop.unwrap_or_else(StopSignal::never);

    let started = Instant::now();
    let mut frame_index = 0usize;
    let mut now = Instant::now();
    for frame in input {
      frame_index += 1;
      info!("处理第 {} 帧图像", frame_index);
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if stop.should_stop() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if output.is_closed() {
        warn!("输出已关闭，退出任务循环");
        break;
      }
    }

    let total = started.elapsed();
    if frame_index > 0 {
      info!(
        "任务完成，共处理 {} 帧，平均每帧 {:.2?}",
        frame_index,
        total / frame_index as u32
      );
    } else {
      info!("任务完成，没有处理任何帧");
    }
    Ok(())
  }
}
