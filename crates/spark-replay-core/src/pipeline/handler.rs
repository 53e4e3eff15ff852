use crate::{CoreError, buffer::PipelineMessage};

use super::context::Context;

/// 入站事件处理合约，面向从传输层到业务层的正向数据流。
///
/// # 设计背景（Why）
/// - 事件粒度：读、读请求、异常、通道失活；
/// - 链路支持在回调内部热插拔自身，因此生命周期钩子 `on_handler_added`/`on_handler_removed`
///   同样是合约的一部分。
///
/// # 契约说明（What）
/// - 除 `on_read` 外，所有事件回调默认把事件原样转发给下一个 Handler；
/// - 回调在链路锁之外执行，允许在回调中调用 [`Pipeline`](super::Pipeline) 的增删替换接口；
/// - 生命周期钩子默认不做任何事。
///
/// # 前置/后置条件（Contract）
/// - **前置**：实现类型必须是 `'static + Send + Sync`；
/// - **后置**：转发给下游的消息所有权随调用转移，Handler 不得保留对已转发消息的引用。
///
/// # 风险提示（Trade-offs）
/// - 请避免在 Handler 内部持久化 `Context` 引用，上下文只在单次回调内有效。
pub trait InboundHandler: Send + Sync + 'static {
    /// 返回 Handler 的简短描述，用于注册表快照与日志。
    fn describe(&self) -> &'static str {
        "inbound-handler"
    }

    /// 处理读到的消息。
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage);

    /// 下游显式请求下一条消息。
    fn on_read_requested(&self, ctx: &dyn Context) {
        ctx.forward_read_requested();
    }

    /// 异常处理。
    fn on_exception_caught(&self, ctx: &dyn Context, error: CoreError) {
        ctx.forward_exception(error);
    }

    /// 通道不再活跃。
    fn on_channel_inactive(&self, ctx: &dyn Context) {
        ctx.forward_channel_inactive();
    }

    /// Handler 已挂入链路（插入或作为替换者）。
    fn on_handler_added(&self, _ctx: &dyn Context) {}

    /// Handler 已从链路摘除（移除或被替换）。
    ///
    /// `ctx` 仍绑定原句柄，此时转发的事件会流向该位置当前的后继。
    fn on_handler_removed(&self, _ctx: &dyn Context) {}
}
