// 教案级安全说明：HotSwap 管道上下文
//
// ## 意图（Why）
// - Handler 在回调中需要回到控制器继续调度后续 Handler，甚至改写链路本身；
// - 上下文若持有下标或链路快照，回调内的自我移除/替换将无法被同一次派发看到。
//
// ## 解析逻辑（How）
// - `HotSwapPipeline` 通过 `Arc::new_cyclic` 注册自身弱引用，构建上下文时升级为强引用；
// - 上下文只保存句柄，转发时才向竞技场查询“该句柄此刻的后继”；
// - 链路锁只在解析目标、执行变更时持有，Handler 回调与生命周期钩子都在锁外执行，
//   因此回调内部可以安全地再次进入控制器。
//
// ## 契约（What）
// - 调用方必须通过 `Arc` 持有控制器；
// - Handler 必须遵循“事件回调内即时使用上下文”的前置条件。
use alloc::{string::ToString, sync::Arc, sync::Weak, vec::Vec};
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::{
    CoreError,
    buffer::PipelineMessage,
    error::Result,
    observability::{PIPELINE_TARGET, ops},
};

use super::{
    context::Context,
    handler::InboundHandler,
    internal::{ResolvedSlot, SlotArena},
    tail::{DiscardingTail, InboundTail},
};

/// 控制器内部使用的 Handler 句柄，配合热插拔操作标识链路节点。
///
/// # 教案式说明
/// - **意图（Why）**：调用方需要一种稳定且易比较的标识来定位某个 Handler，
///   简单使用下标会受到链路变更的影响，因此引入显式句柄。
/// - **逻辑（How）**：句柄为单调递增的序列号，`0` 保留为虚拟头部锚点 [`HEAD`](Self::HEAD)，
///   用于“在最前方插入”或“从链首派发”。
/// - **契约（What）**：句柄在控制器生命周期内唯一且永不复用；替换会生成新的句柄，
///   旧句柄此后解析到替换者。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineHandleId(u64);

impl PipelineHandleId {
    /// 链路的虚拟头部锚点。
    pub const HEAD: Self = Self(0);

    /// 判定句柄是否为虚拟锚点。
    pub fn is_anchor(self) -> bool {
        self == Self::HEAD
    }

    /// 将内部编码暴露给调试工具或日志系统。
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn new(sequence: u64) -> Self {
        Self(sequence)
    }
}

/// Handler 注册信息，协助调度器与观测系统理解链路结构。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerRegistration {
    handle_id: PipelineHandleId,
    label: alloc::string::String,
    descriptor: &'static str,
}

impl HandlerRegistration {
    /// 构造注册信息。
    pub fn new(
        handle_id: PipelineHandleId,
        label: impl Into<alloc::string::String>,
        descriptor: &'static str,
    ) -> Self {
        Self {
            handle_id,
            label: label.into(),
            descriptor,
        }
    }

    /// 返回 Handler 句柄，用于热插拔定位。
    pub fn handle_id(&self) -> PipelineHandleId {
        self.handle_id
    }

    /// 获取 Handler 标签。
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 获取 Handler 描述。
    pub fn descriptor(&self) -> &'static str {
        self.descriptor
    }
}

/// Pipeline 控制面：热插拔与入站事件入口。
///
/// # 设计背景（Why）
/// - 提供运行期增删改能力，使 Handler 能在自身回调中改写链路；
/// - Trait 保持对象安全，Handler 通过 [`Context::pipeline`] 以 `&dyn Pipeline` 访问。
///
/// # 契约说明（What）
/// - 标签在在位 Handler 中唯一，重复标签返回 `pipeline.handler_conflict`；
/// - 每次成功变更都会使 [`epoch`](Self::epoch) 自增；
/// - `remove_handler`/`replace_handler` 对非在位句柄返回 `false`/`None`，不视为错误；
/// - 所有方法均可在 Handler 回调内部调用。
pub trait Pipeline: Send + Sync + 'static {
    /// 追加到链尾。
    fn add_last(&self, label: &str, handler: Arc<dyn InboundHandler>) -> Result<PipelineHandleId>;

    /// 插入到链首。
    fn add_first(&self, label: &str, handler: Arc<dyn InboundHandler>) -> Result<PipelineHandleId> {
        self.add_handler_after(PipelineHandleId::HEAD, label, handler)
    }

    /// 在锚点之后插入；锚点不存在时返回 `pipeline.handler_missing`。
    fn add_handler_after(
        &self,
        anchor: PipelineHandleId,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<PipelineHandleId>;

    /// 移除 Handler，成功返回 `true`。
    fn remove_handler(&self, handle: PipelineHandleId) -> bool;

    /// 原位替换 Handler，返回替换者的句柄；先回调继任者的 `on_handler_added`，再回调旧 Handler 的 `on_handler_removed`。
    fn replace_handler(
        &self,
        handle: PipelineHandleId,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Option<PipelineHandleId>;

    /// 按标签查找在位 Handler。
    fn find(&self, label: &str) -> Option<PipelineHandleId>;

    /// 按执行顺序返回链路快照。
    fn handlers(&self) -> Vec<HandlerRegistration>;

    /// 变更逻辑时钟。
    fn epoch(&self) -> u64;

    /// 在位 Handler 数量。
    fn len(&self) -> usize;

    /// 链路是否为空。
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从链首派发读事件。
    fn emit_read(&self, msg: PipelineMessage) {
        self.dispatch_read(PipelineHandleId::HEAD, msg);
    }

    /// 从指定位置派发读事件：被替换的位置由替换者接收，被移除的位置顺延到其后。
    fn dispatch_read(&self, position: PipelineHandleId, msg: PipelineMessage);

    /// 从链首派发读请求。
    fn emit_read_requested(&self);

    /// 从链首派发异常。
    fn emit_exception(&self, error: CoreError);

    /// 从链首派发通道失活。
    fn emit_channel_inactive(&self);
}

/// 链路变更类型，映射为日志中的稳定 `op` 字段。
#[derive(Clone, Copy, Debug)]
enum PipelineMutationKind {
    Add,
    Remove,
    Replace,
}

impl PipelineMutationKind {
    fn as_label(self) -> &'static str {
        match self {
            PipelineMutationKind::Add => ops::ADD,
            PipelineMutationKind::Remove => ops::REMOVE,
            PipelineMutationKind::Replace => ops::REPLACE,
        }
    }
}

/// 入站事件的内部表示，统一派发路径。
enum InboundEvent {
    Read(PipelineMessage),
    ReadRequested,
    Exception(CoreError),
    ChannelInactive,
}

/// 支持运行期热插拔的默认控制器实现。
///
/// # 教案式说明
/// - **意图（Why）**：解码器需要在自己的回调中把自己摘掉，协议探测 Handler 需要把自己换成
///   真正的解码器，同时不能打乱正在进行的派发。
/// - **逻辑（How）**：
///   1. 链路由 [`SlotArena`] 保存，槽位以句柄寻址、永不移动；
///   2. 派发时只在锁内解析目标并克隆 `Arc`，随即释放锁再调用 Handler；
///   3. 每次变更后自增 epoch 并输出 `debug` 日志。
/// - **契约（What）**：调用者必须通过 `Arc` 持有控制器，以保证在事件回调期间对象存活。
/// - **风险提示（Trade-offs）**：单把自旋锁保护整个竞技场，写少读多的链路足够；
///   若链路需要跨线程高频变更，应改为快照 + epoch 的方案。
pub struct HotSwapPipeline {
    arena: Mutex<SlotArena>,
    epoch: AtomicU64,
    tail: Arc<dyn InboundTail>,
    self_ref: Weak<HotSwapPipeline>,
}

impl HotSwapPipeline {
    /// 构造以 [`DiscardingTail`] 收尾的控制器。
    pub fn new() -> Arc<Self> {
        Self::with_tail(Arc::new(DiscardingTail))
    }

    /// 构造以自定义链尾收尾的控制器。
    pub fn with_tail(tail: Arc<dyn InboundTail>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            arena: Mutex::new(SlotArena::default()),
            epoch: AtomicU64::new(0),
            tail,
            self_ref: weak.clone(),
        })
    }

    fn bump_epoch(&self, mutation: PipelineMutationKind, label: &str) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            target: PIPELINE_TARGET,
            op = mutation.as_label(),
            label,
            epoch,
            "pipeline mutation applied"
        );
        epoch
    }

    fn context_for(&self, id: PipelineHandleId, label: Arc<str>) -> Option<HotSwapContext> {
        // 弱引用升级失败意味着控制器正在析构，此时不再有可派发的对象。
        let controller = self.self_ref.upgrade()?;
        Some(HotSwapContext {
            controller,
            handle: id,
            label,
        })
    }

    fn deliver(&self, target: Option<ResolvedSlot>, event: InboundEvent) {
        let Some(slot) = target else {
            match event {
                InboundEvent::Read(msg) => self.tail.on_read(msg),
                InboundEvent::ReadRequested => self.tail.on_read_requested(),
                InboundEvent::Exception(error) => self.tail.on_exception(error),
                InboundEvent::ChannelInactive => self.tail.on_channel_inactive(),
            }
            return;
        };
        let Some(ctx) = self.context_for(slot.id, slot.label) else {
            return;
        };
        let handler = slot.handler;
        match event {
            InboundEvent::Read(msg) => handler.on_read(&ctx, msg),
            InboundEvent::ReadRequested => handler.on_read_requested(&ctx),
            InboundEvent::Exception(error) => handler.on_exception_caught(&ctx, error),
            InboundEvent::ChannelInactive => handler.on_channel_inactive(&ctx),
        }
    }

    fn emit_from_head(&self, event: InboundEvent) {
        let target = self.arena.lock().first();
        self.deliver(target, event);
    }

    fn forward_from(&self, from: PipelineHandleId, event: InboundEvent) {
        let target = self.arena.lock().after(from);
        self.deliver(target, event);
    }

    fn notify_added(&self, slot: &ResolvedSlot) {
        if let Some(ctx) = self.context_for(slot.id, Arc::clone(&slot.label)) {
            slot.handler.on_handler_added(&ctx);
        }
    }

    fn notify_removed(&self, slot: &ResolvedSlot) {
        if let Some(ctx) = self.context_for(slot.id, Arc::clone(&slot.label)) {
            slot.handler.on_handler_removed(&ctx);
        }
    }

    fn install(
        &self,
        insert: impl FnOnce(&mut SlotArena) -> Result<PipelineHandleId>,
    ) -> Result<PipelineHandleId> {
        let (id, slot) = {
            let mut arena = self.arena.lock();
            let id = insert(&mut *arena)?;
            (id, arena.at(id))
        };
        if let Some(slot) = slot {
            self.bump_epoch(PipelineMutationKind::Add, &slot.label);
            self.notify_added(&slot);
        }
        Ok(id)
    }
}

impl Pipeline for HotSwapPipeline {
    fn add_last(&self, label: &str, handler: Arc<dyn InboundHandler>) -> Result<PipelineHandleId> {
        self.install(|arena| arena.insert_last(label, handler))
    }

    fn add_handler_after(
        &self,
        anchor: PipelineHandleId,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<PipelineHandleId> {
        self.install(|arena| arena.insert_after(anchor, label, handler))
    }

    fn remove_handler(&self, handle: PipelineHandleId) -> bool {
        let removed = self.arena.lock().remove(handle);
        match removed {
            Some(slot) => {
                self.bump_epoch(PipelineMutationKind::Remove, &slot.label);
                self.notify_removed(&slot);
                true
            }
            None => false,
        }
    }

    fn replace_handler(
        &self,
        handle: PipelineHandleId,
        label: &str,
        handler: Arc<dyn InboundHandler>,
    ) -> Option<PipelineHandleId> {
        let replaced = self.arena.lock().replace(handle, label, handler);
        match replaced {
            Ok((successor, old)) => {
                self.bump_epoch(PipelineMutationKind::Replace, &successor.label);
                // 继任者先就绪，旧 Handler 在摘除回调里转发的字节才有人接。
                self.notify_added(&successor);
                self.notify_removed(&old);
                Some(successor.id)
            }
            Err(error) => {
                tracing::debug!(
                    target: PIPELINE_TARGET,
                    op = ops::REPLACE,
                    label,
                    code = error.code(),
                    "pipeline mutation rejected"
                );
                None
            }
        }
    }

    fn find(&self, label: &str) -> Option<PipelineHandleId> {
        self.arena.lock().find(label)
    }

    fn handlers(&self) -> Vec<HandlerRegistration> {
        self.arena.lock().registrations()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.arena.lock().len()
    }

    fn dispatch_read(&self, position: PipelineHandleId, msg: PipelineMessage) {
        let target = self.arena.lock().at(position);
        self.deliver(target, InboundEvent::Read(msg));
    }

    fn emit_read_requested(&self) {
        self.emit_from_head(InboundEvent::ReadRequested);
    }

    fn emit_exception(&self, error: CoreError) {
        self.emit_from_head(InboundEvent::Exception(error));
    }

    fn emit_channel_inactive(&self) {
        self.emit_from_head(InboundEvent::ChannelInactive);
    }
}

impl core::fmt::Debug for HotSwapPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let labels: Vec<_> = self
            .handlers()
            .into_iter()
            .map(|entry| entry.label().to_string())
            .collect();
        f.debug_struct("HotSwapPipeline")
            .field("epoch", &self.epoch())
            .field("handlers", &labels)
            .finish()
    }
}

/// 绑定单个句柄的上下文，仅在一次回调内存活。
struct HotSwapContext {
    controller: Arc<HotSwapPipeline>,
    handle: PipelineHandleId,
    label: Arc<str>,
}

impl Context for HotSwapContext {
    fn handle(&self) -> PipelineHandleId {
        self.handle
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn pipeline(&self) -> &dyn Pipeline {
        &*self.controller
    }

    fn forward_read(&self, msg: PipelineMessage) {
        self.controller
            .forward_from(self.handle, InboundEvent::Read(msg));
    }

    fn forward_read_requested(&self) {
        self.controller
            .forward_from(self.handle, InboundEvent::ReadRequested);
    }

    fn forward_exception(&self, error: CoreError) {
        self.controller
            .forward_from(self.handle, InboundEvent::Exception(error));
    }

    fn forward_channel_inactive(&self) {
        self.controller
            .forward_from(self.handle, InboundEvent::ChannelInactive);
    }
}
