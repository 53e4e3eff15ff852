//! Handler 链：可在派发过程中自我移除与自我替换的入站处理链路。

mod context;
mod handler;
mod internal;
#[allow(clippy::module_inception)]
mod pipeline;
mod tail;

pub use context::Context;
pub use handler::InboundHandler;
pub use pipeline::{HandlerRegistration, HotSwapPipeline, Pipeline, PipelineHandleId};
pub use tail::{DiscardingTail, InboundTail};
