//! 链路测试桩：记录型链尾与嵌入式链路。
//!
//! # 设计定位（Why）
//! - 解码器与热插拔行为的测试都需要“把字节写进链路、从链尾读出结果”这一组动作；
//! - 集中维护后，集成测试、下游编解码 crate 的单元测试都可以复用同一套驱动方式。
//!
//! # 使用方式（How）
//! - 通过 `use spark_replay_core::test_stubs::pipeline::*;` 引入 [`pipeline::EmbeddedPipeline`]；
//! - 写入用 `write_inbound`，读取用 `read_inbound*`，`read()` 模拟下游的读请求，`finish()` 模拟通道失活。
//!
//! # 契约说明（What）
//! - 桩对象仅用于测试或示例环境；全部类型在 `no_std + alloc` 下同样可用。

pub mod pipeline {
    //! 嵌入式链路与记录型链尾。

    use alloc::{collections::VecDeque, string::String, sync::Arc, vec::Vec};
    use core::any::Any;

    use bytes::Bytes;
    use spin::Mutex;

    use crate::{
        CoreError,
        buffer::PipelineMessage,
        pipeline::{HotSwapPipeline, InboundHandler, InboundTail, Pipeline, PipelineHandleId},
    };

    /// 记录所有落到链尾的事件，供测试断言。
    #[derive(Default)]
    pub struct RecordingTail {
        inbound: Mutex<VecDeque<PipelineMessage>>,
        exceptions: Mutex<VecDeque<CoreError>>,
        read_requests: Mutex<usize>,
        inactive: Mutex<bool>,
    }

    impl RecordingTail {
        /// 弹出最早到达的消息。
        pub fn pop_inbound(&self) -> Option<PipelineMessage> {
            self.inbound.lock().pop_front()
        }

        /// 仍在排队的消息数。
        pub fn inbound_len(&self) -> usize {
            self.inbound.lock().len()
        }

        /// 弹出最早到达的异常。
        pub fn pop_exception(&self) -> Option<CoreError> {
            self.exceptions.lock().pop_front()
        }

        /// 落到链尾的读请求次数。
        pub fn read_requests(&self) -> usize {
            *self.read_requests.lock()
        }

        /// 通道失活事件是否已到达链尾。
        pub fn is_inactive(&self) -> bool {
            *self.inactive.lock()
        }
    }

    impl InboundTail for RecordingTail {
        fn on_read(&self, msg: PipelineMessage) {
            self.inbound.lock().push_back(msg);
        }

        fn on_read_requested(&self) {
            *self.read_requests.lock() += 1;
        }

        fn on_exception(&self, error: CoreError) {
            self.exceptions.lock().push_back(error);
        }

        fn on_channel_inactive(&self) {
            *self.inactive.lock() = true;
        }
    }

    /// 嵌入式链路：以同步调用模拟单个通道的入站事件流。
    ///
    /// # 示例
    /// ```rust
    /// use std::sync::Arc;
    /// use spark_replay_core::{
    ///     buffer::PipelineMessage,
    ///     pipeline::{Context, InboundHandler},
    ///     test_stubs::pipeline::EmbeddedPipeline,
    /// };
    ///
    /// struct Relay;
    ///
    /// impl InboundHandler for Relay {
    ///     fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
    ///         ctx.forward_read(msg);
    ///     }
    /// }
    ///
    /// let relay: Arc<dyn InboundHandler> = Arc::new(Relay);
    /// let channel = EmbeddedPipeline::with_handlers([("relay", relay)]).expect("unique labels");
    /// channel.write_inbound(b"ping");
    /// assert_eq!(channel.read_inbound_bytes().as_deref(), Some(&b"ping"[..]));
    /// assert!(channel.read_inbound().is_none());
    /// ```
    pub struct EmbeddedPipeline {
        pipeline: Arc<HotSwapPipeline>,
        tail: Arc<RecordingTail>,
    }

    impl Default for EmbeddedPipeline {
        fn default() -> Self {
            Self::new()
        }
    }

    impl EmbeddedPipeline {
        /// 构造空链路。
        pub fn new() -> Self {
            let tail = Arc::new(RecordingTail::default());
            let pipeline = HotSwapPipeline::with_tail(Arc::clone(&tail) as Arc<dyn InboundTail>);
            Self { pipeline, tail }
        }

        /// 构造并依次追加 Handler；标签冲突时返回 `pipeline.handler_conflict`。
        pub fn with_handlers<I, L>(handlers: I) -> crate::Result<Self>
        where
            I: IntoIterator<Item = (L, Arc<dyn InboundHandler>)>,
            L: Into<String>,
        {
            let channel = Self::new();
            for (label, handler) in handlers {
                let label: String = label.into();
                channel.pipeline.add_last(&label, handler)?;
            }
            Ok(channel)
        }

        /// 追加 Handler。
        pub fn add_last(
            &self,
            label: &str,
            handler: Arc<dyn InboundHandler>,
        ) -> crate::Result<PipelineHandleId> {
            self.pipeline.add_last(label, handler)
        }

        /// 底层链路。
        pub fn pipeline(&self) -> &Arc<HotSwapPipeline> {
            &self.pipeline
        }

        /// 链尾记录器。
        pub fn tail(&self) -> &RecordingTail {
            &self.tail
        }

        /// 写入一个字节分片（复制）。
        pub fn write_inbound(&self, fragment: &[u8]) {
            self.pipeline
                .emit_read(PipelineMessage::copy_from_slice(fragment));
        }

        /// 写入任意消息。
        pub fn write_inbound_message(&self, msg: PipelineMessage) {
            self.pipeline.emit_read(msg);
        }

        /// 弹出链尾最早的消息。
        pub fn read_inbound(&self) -> Option<PipelineMessage> {
            self.tail.pop_inbound()
        }

        /// 弹出链尾最早的消息并要求其为原始字节；业务消息会被丢弃并返回 `None`。
        pub fn read_inbound_bytes(&self) -> Option<Bytes> {
            self.read_inbound()?.into_buffer().ok()
        }

        /// 弹出链尾最早的消息并下转型为 `T`；类型不符时丢弃并返回 `None`。
        pub fn read_inbound_user<T>(&self) -> Option<T>
        where
            T: Any + Send + Sync,
        {
            self.read_inbound()?.downcast_user::<T>().ok().map(|boxed| *boxed)
        }

        /// 取出链尾所有剩余消息。
        pub fn drain_inbound(&self) -> Vec<PipelineMessage> {
            let mut drained = Vec::new();
            while let Some(msg) = self.read_inbound() {
                drained.push(msg);
            }
            drained
        }

        /// 弹出链尾最早的异常。
        pub fn take_exception(&self) -> Option<CoreError> {
            self.tail.pop_exception()
        }

        /// 模拟下游请求下一条消息。
        pub fn read(&self) {
            self.pipeline.emit_read_requested();
        }

        /// 模拟通道失活；返回链尾是否还有待读消息。
        pub fn finish(&self) -> bool {
            self.pipeline.emit_channel_inactive();
            self.tail.inbound_len() > 0
        }
    }
}
