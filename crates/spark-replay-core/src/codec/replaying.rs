use alloc::{format, vec::Vec};
use core::cell::Cell;

use bytes::Bytes;
use spin::Mutex;

use crate::{
    CoreError,
    buffer::{Cumulation, PipelineMessage, ReplayCursor},
    error::{DecodeError, Underflow, codes},
    observability::{DECODER_TARGET, transitions},
    pipeline::{Context, InboundHandler},
};

use super::{
    config::{DecoderConfig, FaultPolicy},
    decode::{DecodeContext, ReplayDecode},
    metrics::DecoderStats,
};

/// 解码器生命周期。
///
/// `Active` 只会迁移一次：到 `Removed`（移除请求或被链路摘除）或 `Faulted`（`Halt` 策略下的故障）。
/// 两个终态都不再发起解码。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// 正常解码。
    Active,
    /// 已移除，剩余字节已转发。
    Removed,
    /// 故障后停止解码。
    Faulted,
}

struct DriverState<D> {
    decoder: D,
    cumulation: Cumulation,
    lifecycle: DecoderState,
    reads_since_discard: u32,
    stats: DecoderStats,
}

/// 一次尝试在提交/回滚之后的结论。
enum AttemptKind<M> {
    Produced(M),
    Progress,
    Idle,
    Underflow(Underflow),
    Fault(CoreError),
}

/// 单步推进后的循环走向。
#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    /// 单消息模式下产出一条后暂停，等待读请求。
    Paused,
    /// 数据不足或没有进展。
    Exhausted,
    /// 已离开 `Active`。
    Stopped,
}

struct Attempt<M> {
    kind: AttemptKind<M>,
    removal_requested: bool,
}

/// 锁内收集、锁外执行的输出。
struct Emission<M> {
    messages: Vec<M>,
    faults: Vec<CoreError>,
    leftover: Option<Bytes>,
    remove_self: bool,
}

impl<M> Emission<M> {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            faults: Vec::new(),
            leftover: None,
            remove_self: false,
        }
    }
}

/// 解码驱动器：把分片累积起来，反复调用 [`ReplayDecode`]，并把产出的消息转发给下一个 Handler。
///
/// # 设计背景（Why）
/// - 解码逻辑按“整条报文都在手里”的方式书写，驱动器负责在字节不足时回滚、在新分片到达时重试；
/// - 解码器可能在解析途中决定把自己移出链路，遗留的未解码字节必须原样交给下游，不能丢失，
///   也不能被调用方随后对源缓冲的修改污染。
///
/// # 逻辑解析（How）
/// 1. 读事件中的字节被复制进 [`Cumulation`]；业务对象原样透传；
/// 2. 循环：以读指针为起点构造 [`ReplayCursor`] 调用解码逻辑；
///    - 产出消息：提交游标位置，继续（单消息模式下停止）；
///    - `Ok(None)`：有消费则提交并继续，否则停止；
///    - `Underflow`：读指针复位到检查点，停止并等待更多数据；
///    - 故障：复位到检查点，按 [`FaultPolicy`] 处置；
///    - 本次尝试请求了移除：进入 `Removed`，复制剩余字节作为快照，停止；
/// 3. 每次尝试的输出在锁内收集，释放锁后立即依次执行：自我移除、转发消息、转发故障、转发剩余字节；
///    下游在转发途中摘除本解码器时，循环随即结束，尚未解码的字节整体作为剩余快照交出。
///
/// # 契约说明（What）
/// - 产出的消息以 [`PipelineMessage::User`] 转发，剩余字节以 [`PipelineMessage::Buffer`] 转发；
/// - 消息的转发顺序与其完成解码的顺序一致；
/// - 进入 `Removed` 后，无论后续收到多少读事件或读请求，都不会再调用解码逻辑。
///
/// # 风险提示（Trade-offs）
/// - 解码逻辑在驱动器的自旋锁内运行，因此拿不到 [`Context`]；需要改写链路时只能通过
///   [`DecodeContext::request_removal`] 表达意图，由驱动器在锁外执行。
pub struct ReplayingDecoder<D: ReplayDecode> {
    state: Mutex<DriverState<D>>,
    config: DecoderConfig,
    descriptor: &'static str,
}

impl<D: ReplayDecode> ReplayingDecoder<D> {
    /// 以默认配置包装解码逻辑。
    pub fn new(decoder: D) -> Self {
        Self::with_config(decoder, DecoderConfig::default())
    }

    /// 以指定配置包装解码逻辑。
    pub fn with_config(decoder: D, config: DecoderConfig) -> Self {
        let descriptor = decoder.describe();
        Self {
            state: Mutex::new(DriverState {
                decoder,
                cumulation: Cumulation::with_capacity(config.initial_capacity),
                lifecycle: DecoderState::Active,
                reads_since_discard: 0,
                stats: DecoderStats::default(),
            }),
            config,
            descriptor,
        }
    }

    /// 当前配置。
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// 当前生命周期状态。
    pub fn state(&self) -> DecoderState {
        self.state.lock().lifecycle
    }

    /// 累计统计快照。
    pub fn stats(&self) -> DecoderStats {
        self.state.lock().stats
    }

    /// 尚未消费的缓冲字节数。
    pub fn buffered(&self) -> usize {
        self.state.lock().cumulation.readable()
    }

    fn attempt(&self, state: &mut DriverState<D>, last: bool) -> Attempt<D::Message> {
        let flag = Cell::new(false);
        let start = state.cumulation.reader_index();
        let (result, outcome) = {
            let mut cursor = ReplayCursor::new(&state.cumulation, &flag);
            let mut ctx = DecodeContext::new(&flag, self.config.max_frame_size);
            let result = if last {
                state.decoder.decode_last(&mut cursor, &mut ctx)
            } else {
                state.decoder.decode(&mut cursor, &mut ctx)
            };
            (result, cursor.finish())
        };

        let kind = match result {
            Ok(Some(_)) if outcome.position == start => {
                AttemptKind::Fault(CoreError::new(
                    codes::PROTOCOL_DECODE,
                    format!("{} produced a message without consuming input", self.descriptor),
                ))
            }
            Ok(Some(message)) => {
                state.cumulation.set_reader_index(outcome.position);
                AttemptKind::Produced(message)
            }
            Ok(None) => {
                state.cumulation.set_reader_index(outcome.position);
                if outcome.position == start {
                    AttemptKind::Idle
                } else {
                    AttemptKind::Progress
                }
            }
            Err(DecodeError::Underflow(underflow)) => {
                state.cumulation.set_reader_index(outcome.checkpoint);
                AttemptKind::Underflow(underflow)
            }
            Err(DecodeError::Fault(error)) => {
                state.cumulation.set_reader_index(outcome.checkpoint);
                AttemptKind::Fault(error)
            }
        };

        Attempt {
            kind,
            removal_requested: flag.get(),
        }
    }

    /// 处理一次尝试的结论，返回是否应结束循环。
    fn settle(
        &self,
        state: &mut DriverState<D>,
        attempt: Attempt<D::Message>,
        emission: &mut Emission<D::Message>,
        drain: bool,
    ) -> bool {
        let mut stop = match attempt.kind {
            AttemptKind::Produced(message) => {
                state.stats.messages_decoded += 1;
                emission.messages.push(message);
                self.config.single_decode && !drain
            }
            AttemptKind::Progress => false,
            AttemptKind::Idle => true,
            AttemptKind::Underflow(underflow) => {
                state.stats.underflows += 1;
                tracing::trace!(
                    target: DECODER_TARGET,
                    decoder = self.descriptor,
                    needed = underflow.needed(),
                    available = underflow.available(),
                    "decode attempt rolled back to checkpoint"
                );
                true
            }
            AttemptKind::Fault(error) => {
                self.record_fault(state, error, emission);
                // 同一次尝试中的移除请求优先于故障策略。
                if !attempt.removal_requested {
                    match self.config.fault_policy {
                        FaultPolicy::Halt => self.halt(state),
                        FaultPolicy::Remove => {
                            self.enter_removed(state, emission, transitions::FAULT_REMOVAL, true)
                        }
                    }
                }
                true
            }
        };

        if attempt.removal_requested && state.lifecycle == DecoderState::Active {
            self.enter_removed(state, emission, transitions::SELF_REMOVAL, true);
            stop = true;
        }
        stop
    }

    /// 在锁内执行至多一次尝试，返回循环应如何继续。
    fn step(
        &self,
        state: &mut DriverState<D>,
        emission: &mut Emission<D::Message>,
        drain: bool,
    ) -> Step {
        if state.lifecycle != DecoderState::Active {
            return Step::Stopped;
        }
        if !state.cumulation.is_readable() {
            return Step::Exhausted;
        }
        let attempt = self.attempt(state, false);
        let produced = matches!(attempt.kind, AttemptKind::Produced(_));
        let stop = self.settle(state, attempt, emission, drain);
        if state.lifecycle != DecoderState::Active {
            Step::Stopped
        } else if !stop {
            Step::Continue
        } else if produced {
            Step::Paused
        } else {
            Step::Exhausted
        }
    }

    /// 逐条解码并转发：每次尝试的输出都在释放锁之后立即转发，
    /// 下游若在处理途中摘除了本解码器，后续字节留在剩余快照里原样交出。
    fn run(&self, ctx: &dyn Context, drain: bool) {
        loop {
            let mut emission = Emission::new();
            let step = {
                let mut state = self.state.lock();
                let step = self.step(&mut state, &mut emission, drain);
                if step != Step::Continue && !drain {
                    self.after_read(&mut state, &mut emission, step == Step::Exhausted);
                }
                step
            };
            self.flush(ctx, emission);
            if step != Step::Continue {
                return;
            }
        }
    }

    fn record_fault(
        &self,
        state: &mut DriverState<D>,
        error: CoreError,
        emission: &mut Emission<D::Message>,
    ) {
        state.stats.faults += 1;
        tracing::warn!(
            target: DECODER_TARGET,
            decoder = self.descriptor,
            code = error.code(),
            error = %error,
            "decode fault"
        );
        emission.faults.push(error);
    }

    fn halt(&self, state: &mut DriverState<D>) {
        state.lifecycle = DecoderState::Faulted;
        state.cumulation.clear();
        tracing::debug!(
            target: DECODER_TARGET,
            decoder = self.descriptor,
            transition = transitions::HALT,
            "decoder lifecycle transition"
        );
    }

    fn enter_removed(
        &self,
        state: &mut DriverState<D>,
        emission: &mut Emission<D::Message>,
        transition: &'static str,
        remove_self: bool,
    ) {
        state.lifecycle = DecoderState::Removed;
        let leftover = state.cumulation.snapshot_readable();
        state.cumulation.clear();
        state.stats.bytes_forwarded_on_removal += leftover.len() as u64;
        tracing::debug!(
            target: DECODER_TARGET,
            decoder = self.descriptor,
            transition,
            leftover = leftover.len(),
            "decoder lifecycle transition"
        );
        if !leftover.is_empty() {
            emission.leftover = Some(leftover);
        }
        emission.remove_self = remove_self;
    }

    /// 读事件之后的内存整理与滞留上限检查。
    ///
    /// 滞留上限只在循环因数据不足而停下时检查；单消息模式下等待读请求的完整消息不计入违规。
    fn after_read(
        &self,
        state: &mut DriverState<D>,
        emission: &mut Emission<D::Message>,
        starved: bool,
    ) {
        if state.lifecycle != DecoderState::Active {
            return;
        }
        if !state.cumulation.is_readable() {
            state.cumulation.clear();
            state.reads_since_discard = 0;
        } else {
            state.reads_since_discard += 1;
            if state.reads_since_discard >= self.config.discard_after_reads {
                state.cumulation.discard_consumed();
                state.reads_since_discard = 0;
            }
        }

        if let Some(limit) = self.config.max_buffered_bytes.filter(|_| starved) {
            let buffered = state.cumulation.readable();
            if buffered > limit {
                let error = CoreError::new(
                    codes::PROTOCOL_BUDGET_EXCEEDED,
                    format!("{buffered} bytes buffered without a complete message, limit {limit}"),
                );
                self.record_fault(state, error, emission);
                match self.config.fault_policy {
                    FaultPolicy::Halt => self.halt(state),
                    FaultPolicy::Remove => {
                        self.enter_removed(state, emission, transitions::FAULT_REMOVAL, true)
                    }
                }
            }
        }
    }

    /// 释放锁之后执行输出：先摘除自身，再按顺序转发。
    fn flush(&self, ctx: &dyn Context, emission: Emission<D::Message>) {
        if emission.remove_self {
            ctx.pipeline().remove_handler(ctx.handle());
        }
        for message in emission.messages {
            ctx.forward_read(PipelineMessage::from_user(message));
        }
        for fault in emission.faults {
            ctx.forward_exception(fault);
        }
        if let Some(leftover) = emission.leftover {
            ctx.forward_read(PipelineMessage::Buffer(leftover));
        }
    }
}

impl<D: ReplayDecode> InboundHandler for ReplayingDecoder<D> {
    fn describe(&self) -> &'static str {
        self.descriptor
    }

    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        let fragment = match msg.into_buffer() {
            Ok(fragment) => fragment,
            Err(user) => {
                ctx.forward_read(user);
                return;
            }
        };

        {
            let mut state = self.state.lock();
            match state.lifecycle {
                DecoderState::Active => {}
                DecoderState::Removed => {
                    drop(state);
                    ctx.forward_read(PipelineMessage::Buffer(fragment));
                    return;
                }
                DecoderState::Faulted => {
                    tracing::debug!(
                        target: DECODER_TARGET,
                        decoder = self.descriptor,
                        dropped = fragment.len(),
                        "fragment dropped after decode fault"
                    );
                    return;
                }
            }
            state.cumulation.append(&fragment);
            state.stats.bytes_received += fragment.len() as u64;
        }
        self.run(ctx, false);
    }

    fn on_read_requested(&self, ctx: &dyn Context) {
        if self.config.single_decode {
            self.run(ctx, false);
        }
        ctx.forward_read_requested();
    }

    fn on_channel_inactive(&self, ctx: &dyn Context) {
        self.run(ctx, true);
        let mut emission = Emission::new();
        {
            let mut state = self.state.lock();
            if state.lifecycle == DecoderState::Active && state.cumulation.is_readable() {
                let attempt = self.attempt(&mut state, true);
                self.settle(&mut state, attempt, &mut emission, true);
            }
            if state.lifecycle == DecoderState::Active {
                let truncated = state.cumulation.readable();
                if truncated > 0 {
                    tracing::debug!(
                        target: DECODER_TARGET,
                        decoder = self.descriptor,
                        dropped = truncated,
                        "truncated input dropped at channel inactive"
                    );
                }
                state.cumulation.clear();
            }
        }
        self.flush(ctx, emission);
        ctx.forward_channel_inactive();
    }

    fn on_handler_removed(&self, ctx: &dyn Context) {
        let mut emission = Emission::new();
        {
            let mut state = self.state.lock();
            if state.lifecycle == DecoderState::Removed {
                return;
            }
            self.enter_removed(&mut state, &mut emission, transitions::EXTERNAL_REMOVAL, false);
        }
        self.flush(ctx, emission);
    }
}

impl<D: ReplayDecode> core::fmt::Debug for ReplayingDecoder<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ReplayingDecoder")
            .field("decoder", &self.descriptor)
            .field("state", &state.lifecycle)
            .field("buffered", &state.cumulation.readable())
            .field("config", &self.config)
            .finish()
    }
}
