#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![doc = "spark-replay-core: 面向连续字节流的可回放增量解码器，以及可在派发中自我改写的 Handler 链。"]
#![doc = ""]
#![doc = "== 组成 =="]
#![doc = "1. [`buffer`]：累积缓冲 [`Cumulation`] 与一次尝试内的可回放游标 [`ReplayCursor`]。"]
#![doc = "2. [`codec`]：解码逻辑合约 [`ReplayDecode`] 与驱动器 [`ReplayingDecoder`]。"]
#![doc = "3. [`pipeline`]：以句柄寻址的热插拔链路 [`HotSwapPipeline`]。"]
#![doc = ""]
#![doc = "== 内存分配依赖 =="]
#![doc = "本 crate 定位于 `no_std + alloc`：链路以 `Arc` 持有 Handler，缓冲基于 `bytes`。关闭 `std` Feature 时仍要求目标平台提供分配器。"]

extern crate alloc;

pub mod buffer;
pub mod codec;
pub mod error;
pub mod observability;
pub mod pipeline;
/// 测试桩命名空间：嵌入式链路与记录型链尾，供集成测试与下游编解码 crate 复用。
pub mod test_stubs;

pub use buffer::{Cumulation, PipelineMessage, ReplayCursor};
pub use codec::{
    DecodeContext, DecoderConfig, DecoderState, DecoderStats, FaultPolicy, ReplayDecode,
    ReplayingDecoder,
};
pub use error::{CoreError, DecodeError, DecodeResult, Result, Underflow};
pub use pipeline::{
    Context, DiscardingTail, HandlerRegistration, HotSwapPipeline, InboundHandler, InboundTail,
    Pipeline, PipelineHandleId,
};
