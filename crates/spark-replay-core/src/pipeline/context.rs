use crate::{CoreError, buffer::PipelineMessage};

use super::pipeline::{Pipeline, PipelineHandleId};

/// Handler 访问链路与事件流的统一入口。
///
/// # 设计背景（Why）
/// - Handler 通过上下文继续传播事件，或回到链路执行热插拔；
/// - 上下文绑定的是“句柄”而非下标，转发时才解析后继，因此回调内对链路的结构变更
///   对同一次派发中的后续转发立即可见。
///
/// # 契约说明（What）
/// - `handle` / `label`：当前 Handler 在链路中的身份；
/// - `pipeline`：链路控制面，可用于增删替换或从链首重新派发事件；
/// - `forward_*`：把事件交给该句柄在**调用时刻**的后继：
///   - 句柄仍在链路中：交给下一个在位 Handler；
///   - 句柄已被替换：交给替换者；
///   - 句柄已被移除：交给移除时位于其后的第一个在位 Handler；
///   - 没有后继时落入链尾 [`InboundTail`](super::InboundTail)。
///
/// # 线程安全与生命周期说明
/// - Trait 约束为 `Send + Sync`；上下文只在单次事件回调中存活，由链路负责创建与释放。
pub trait Context: Send + Sync {
    /// 当前 Handler 的句柄。
    fn handle(&self) -> PipelineHandleId;

    /// 当前 Handler 的标签。
    fn label(&self) -> &str;

    /// 当前 Pipeline 引用。
    fn pipeline(&self) -> &dyn Pipeline;

    /// 继续向后传播读事件。
    fn forward_read(&self, msg: PipelineMessage);

    /// 继续向后传播读请求。
    fn forward_read_requested(&self);

    /// 继续向后传播异常。
    fn forward_exception(&self, error: CoreError);

    /// 继续向后传播通道失活。
    fn forward_channel_inactive(&self);
}
