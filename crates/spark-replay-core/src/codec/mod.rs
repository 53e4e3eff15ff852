//! 解码层：可回放解码逻辑的合约、驱动器与其配置。

mod config;
mod decode;
mod metrics;
mod replaying;

pub use config::{DecoderConfig, FaultPolicy};
pub use decode::{DecodeContext, ReplayDecode};
pub use metrics::DecoderStats;
pub use replaying::{DecoderState, ReplayingDecoder};
