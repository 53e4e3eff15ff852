//! 字节缓冲层：消息载体、累积缓冲与可回放游标。

mod cumulation;
mod cursor;
mod message;

pub use cumulation::Cumulation;
pub(crate) use cursor::CursorOutcome;
pub use cursor::ReplayCursor;
pub use message::PipelineMessage;
