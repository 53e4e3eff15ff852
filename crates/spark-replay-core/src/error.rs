//! 错误模型：稳定错误码的 [`CoreError`] 与解码回放专用的 [`DecodeError`]。
//!
//! # 分层（Why）
//! - `Underflow` 不是故障，只是“字节还没到齐”的控制信号，驱动器在本地回滚后静默等待；
//! - `CoreError` 承载真正需要上报的故障（畸形输入、预算超限、链路装配冲突），
//!   错误码遵循 `<领域>.<语义>` 约定，便于日志与告警聚合。
//!
//! # 契约（What）
//! - 解码逻辑统一返回 [`DecodeResult`]，游标的 `Underflow` 通过 `?` 自动提升为 [`DecodeError::Underflow`]；
//! - `CoreError` 可克隆，便于同一故障既写入日志又沿 Pipeline 传播。

use alloc::borrow::Cow;

/// 稳定错误码与人类可读描述组成的核心错误。
///
/// # 契约说明（What）
/// - `code`：`'static` 字符串，建议取自 [`codes`] 模块；
/// - `message`：面向排障人员的描述，避免携带原始报文等敏感内容。
///
/// # 示例
/// ```rust
/// use spark_replay_core::{CoreError, error::codes};
///
/// let err = CoreError::new(codes::PROTOCOL_DECODE, "length prefix is negative");
/// assert_eq!(err.code(), codes::PROTOCOL_DECODE);
/// assert_eq!(err.message(), "length prefix is negative");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
}

impl CoreError {
    /// 构造核心错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `spark-replay-core` 的统一结果别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

/// 可回放游标在字节不足时发出的控制信号。
///
/// - `needed`：完成本次读取所需的字节数（从当前读位置起算）；
/// - `available`：当前已缓冲、尚未读取的字节数。
///
/// 对于 [`scan_for`](crate::buffer::ReplayCursor::scan_for) 这类“不知道要多少”的读取，
/// `needed` 取 `available + 1`，表示至少还需要一个字节。
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("replay underflow: need {needed} bytes, {available} buffered")]
pub struct Underflow {
    needed: usize,
    available: usize,
}

impl Underflow {
    pub(crate) fn new(needed: usize, available: usize) -> Self {
        Self { needed, available }
    }

    /// 完成读取所需的字节数。
    pub fn needed(&self) -> usize {
        self.needed
    }

    /// 触发时已缓冲的字节数。
    pub fn available(&self) -> usize {
        self.available
    }
}

/// 一次解码尝试的失败形态。
///
/// # 契约说明（What）
/// - `Underflow`：驱动器回滚到检查点并等待更多数据，**永不**上报给应用；
/// - `Fault`：畸形输入等真实故障，不重试，按 [`FaultPolicy`](crate::codec::FaultPolicy) 处置并经
///   `on_exception_caught` 向下游传播。
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// 当前缓冲不足以完成读取。
    #[error(transparent)]
    Underflow(#[from] Underflow),
    /// 解码逻辑显式判定的输入故障。
    #[error(transparent)]
    Fault(#[from] CoreError),
}

impl DecodeError {
    /// 便捷构造：以 `protocol.decode` 错误码报告畸形输入。
    pub fn malformed(message: impl Into<Cow<'static, str>>) -> Self {
        DecodeError::Fault(CoreError::new(codes::PROTOCOL_DECODE, message))
    }

    /// 是否为控制性的 `Underflow`。
    pub fn is_underflow(&self) -> bool {
        matches!(self, DecodeError::Underflow(_))
    }
}

/// 解码逻辑的返回类型。
pub type DecodeResult<T> = core::result::Result<T, DecodeError>;

/// 框架内置的错误码常量集合。
pub mod codes {
    /// 协议解码失败。
    pub const PROTOCOL_DECODE: &str = "protocol.decode";
    /// 协议预算超限（帧长或累积缓冲超过上限）。
    pub const PROTOCOL_BUDGET_EXCEEDED: &str = "protocol.budget_exceeded";
    /// Handler 标签在链路中已存在。
    pub const PIPELINE_HANDLER_CONFLICT: &str = "pipeline.handler_conflict";
    /// 锚点句柄不存在或已失效。
    pub const PIPELINE_HANDLER_MISSING: &str = "pipeline.handler_missing";
}
