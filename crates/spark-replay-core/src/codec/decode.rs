use alloc::format;
use core::{cell::Cell, fmt};

use crate::{
    CoreError,
    buffer::ReplayCursor,
    error::{DecodeResult, codes},
};

/// 一次解码尝试期间提供给解码逻辑的控制面。
///
/// # 设计背景（Why）
/// - 解码逻辑需要在“读到一半”时决定把自己移出链路（例如协议升级后交给下一个 Handler）；
/// - 帧长预算需要在解析长度字段时就地校验，而不是等整帧到齐。
///
/// # 逻辑解析（How）
/// - 上下文与游标共享同一个移除标记：请求移除后，游标的 `checkpoint()` 随即失效；
/// - 上下文只以 `&mut` 借用的形式出现在 [`ReplayDecode::decode`] 参数中，
///   离开一次尝试就不存在可调用的 `request_removal`，误用在编译期即被拒绝。
///
/// # 契约说明（What）
/// - `request_removal` 不可撤销；当前尝试仍会执行到成功或 `Underflow` 为止，此后不再发起任何解码；
/// - `check_frame_constraints` 超限时返回 `protocol.budget_exceeded`。
pub struct DecodeContext<'a> {
    removal_requested: &'a Cell<bool>,
    max_frame_size: Option<usize>,
}

impl<'a> DecodeContext<'a> {
    pub(crate) fn new(removal_requested: &'a Cell<bool>, max_frame_size: Option<usize>) -> Self {
        Self {
            removal_requested,
            max_frame_size,
        }
    }

    /// 请求在本次尝试结束后把解码器移出链路。
    pub fn request_removal(&mut self) {
        self.removal_requested.set(true);
    }

    /// 本次尝试是否已请求移除。
    pub fn is_removal_requested(&self) -> bool {
        self.removal_requested.get()
    }

    /// 配置的单帧上限。
    pub fn max_frame_size(&self) -> Option<usize> {
        self.max_frame_size
    }

    /// 校验帧长是否在上限之内。
    pub fn check_frame_constraints(&self, frame_len: usize) -> crate::Result<(), CoreError> {
        if let Some(max) = self.max_frame_size
            && frame_len > max
        {
            return Err(CoreError::new(
                codes::PROTOCOL_BUDGET_EXCEEDED,
                format!("frame length {frame_len} exceeds configured decoder limit {max} bytes"),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for DecodeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeContext")
            .field("removal_requested", &self.removal_requested.get())
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

/// 可回放的解码逻辑。
///
/// # 设计背景（Why）
/// - 实现者按“报文已完整在手”的方式顺序读取字段，字节不足时游标返回
///   [`Underflow`](crate::error::Underflow)，用 `?` 直接上抛即可；
/// - 驱动器负责回滚与重试，解码逻辑本身不需要关心分片边界。
///
/// # 契约说明（What）
/// - `Ok(Some(msg))`：产出一条消息，游标位置即为提交位置，必须消费了至少一个字节；
/// - `Ok(None)`：本次没有消息。若消费了字节（例如跳过填充），驱动器提交并继续；否则结束循环；
/// - `Err(DecodeError::Underflow)`：回滚到检查点，等待更多数据；
/// - `Err(DecodeError::Fault)`：真实故障，不会重试。
///
/// # 前置/后置条件（Contract）
/// - **前置**：跨尝试的解析进度（例如已读出的长度字段）保存在 `self` 中，并配合
///   [`ReplayCursor::checkpoint`] 使用；
/// - **后置**：解码逻辑不得假设同一段字节只被看到一次，`Underflow` 之后会对检查点之后的字节重放。
pub trait ReplayDecode: Send + 'static {
    /// 解码产出的业务消息。
    type Message: Send + Sync + 'static;

    /// 尝试解码一条消息。
    fn decode(
        &mut self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Self::Message>>;

    /// 通道失活前对剩余字节的最后一次尝试，默认与 [`decode`](Self::decode) 相同。
    fn decode_last(
        &mut self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Self::Message>> {
        self.decode(src, ctx)
    }

    /// 返回解码逻辑的简短描述，用于日志与注册表快照。
    fn describe(&self) -> &'static str {
        "replay-decoder"
    }
}
