use crate::{CoreError, buffer::PipelineMessage, observability::PIPELINE_TARGET};

/// 链尾收容器：承接越过最后一个 Handler 的入站事件。
///
/// # 契约说明（What）
/// - 链路在解析不到后继时调用对应方法；
/// - 实现必须自行处理消息所有权（丢弃、排队或交给应用）。
pub trait InboundTail: Send + Sync + 'static {
    /// 读事件落到链尾。
    fn on_read(&self, msg: PipelineMessage);

    /// 读请求落到链尾。
    fn on_read_requested(&self) {}

    /// 异常落到链尾。
    fn on_exception(&self, error: CoreError);

    /// 通道失活事件落到链尾。
    fn on_channel_inactive(&self) {}
}

/// 默认链尾：记录日志后丢弃。
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardingTail;

impl InboundTail for DiscardingTail {
    fn on_read(&self, msg: PipelineMessage) {
        tracing::debug!(
            target: PIPELINE_TARGET,
            msg = ?msg,
            "inbound message reached pipeline tail and was discarded"
        );
    }

    fn on_exception(&self, error: CoreError) {
        tracing::warn!(
            target: PIPELINE_TARGET,
            code = error.code(),
            error = %error,
            "unhandled exception reached pipeline tail"
        );
    }
}
