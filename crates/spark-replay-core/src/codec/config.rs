use serde::{Deserialize, Serialize};

/// 解码故障后的处置策略。
///
/// # 契约说明（What）
/// - `Halt`：故障为终态，解码器停止解码并丢弃后续分片，但仍留在链路中；
/// - `Remove`：故障转发后按自我移除处理，剩余未解码字节以原始字节转发给下游。
///
/// 两种策略下故障都会通过 `on_exception_caught` 转发，失败的数据不会被重试。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// 停止解码。
    #[default]
    Halt,
    /// 停止解码并把自己移出链路。
    Remove,
}

/// [`ReplayingDecoder`](super::ReplayingDecoder) 的可调参数。
///
/// # 设计背景（Why）
/// - 单消息模式、内存上限与故障策略都是部署相关的决策，集中在一个可序列化结构中，
///   集成方可以直接从 TOML/JSON 配置文件加载。
///
/// # 契约说明（What）
/// - `single_decode`：每次读事件最多产出一条消息，剩余积压依赖下游的读请求驱动；
/// - `discard_after_reads`：未完全消费时，每隔多少次读事件压缩一次已消费前缀，`0` 表示每次都压缩；
/// - `initial_capacity`：累积缓冲的初始容量；
/// - `max_buffered_bytes`：解码结束后仍滞留的字节上限，超过即报告 `protocol.budget_exceeded`；
/// - `max_frame_size`：交给解码逻辑的单帧上限，见 [`DecodeContext::check_frame_constraints`](super::DecodeContext::check_frame_constraints)。
///
/// # 示例
/// ```rust
/// use spark_replay_core::codec::{DecoderConfig, FaultPolicy};
///
/// let config = DecoderConfig::default()
///     .with_single_decode(true)
///     .with_fault_policy(FaultPolicy::Remove)
///     .with_max_frame_size(Some(8 * 1024));
/// assert!(config.single_decode);
/// assert_eq!(config.discard_after_reads, 16);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// 单消息模式。
    pub single_decode: bool,
    /// 故障处置策略。
    pub fault_policy: FaultPolicy,
    /// 压缩已消费前缀的读事件间隔。
    pub discard_after_reads: u32,
    /// 累积缓冲初始容量。
    pub initial_capacity: usize,
    /// 滞留字节上限。
    pub max_buffered_bytes: Option<usize>,
    /// 单帧上限。
    pub max_frame_size: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            single_decode: false,
            fault_policy: FaultPolicy::Halt,
            discard_after_reads: 16,
            initial_capacity: 256,
            max_buffered_bytes: None,
            max_frame_size: None,
        }
    }
}

impl DecoderConfig {
    /// 设置单消息模式。
    pub fn with_single_decode(mut self, single_decode: bool) -> Self {
        self.single_decode = single_decode;
        self
    }

    /// 设置故障处置策略。
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// 设置压缩间隔。
    pub fn with_discard_after_reads(mut self, reads: u32) -> Self {
        self.discard_after_reads = reads;
        self
    }

    /// 设置初始容量。
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// 设置滞留字节上限。
    pub fn with_max_buffered_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_buffered_bytes = limit;
        self
    }

    /// 设置单帧上限。
    pub fn with_max_frame_size(mut self, limit: Option<usize>) -> Self {
        self.max_frame_size = limit;
        self
    }
}
