#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! `spark-codec-line` 提供基于换行符分帧的可回放解码器。
//!
//! # 教案背景（Why）
//! - 演示如何在**不修改核心 crate** 的前提下，基于 [`ReplayDecode`](spark_replay_core::ReplayDecode)
//!   编写协议解码逻辑；
//! - 行分隔协议语义直观，便于聚焦展示 `scan_for` 的“找不到即等待”语义与帧长预算。
//!
//! # 使用概览（How）
//! - 用 [`ReplayingDecoder`](spark_replay_core::ReplayingDecoder) 包装 [`LineDecoder`] 或
//!   [`TextLineDecoder`]，再挂到 `HotSwapPipeline` 上即可；
//! - 解码器只描述“读到换行为止”，分片拼接、回滚与重试全部由驱动器负责。
//!
//! # 合约说明（What）
//! - 错误码遵循 `spark_replay_core::error::codes`：帧长超限为 `protocol.budget_exceeded`，
//!   非法 UTF-8 为 `protocol.decode`。
//!
//! # 风险提示与后续（Trade-offs）
//! - 行分隔协议不包含转义策略，若需要承载二进制或多行文本，应改为长度前缀协议。

extern crate alloc;

mod line;

pub use crate::line::{LineDecoder, TextLineDecoder};
