//! 观测约定：`tracing` 目标与稳定字段取值。
//!
//! 目标名以 crate 名为前缀，订阅方可用 `spark_replay_core=debug` 一次性打开链路与解码器日志。

/// 链路变更与链尾事件的日志目标。
pub const PIPELINE_TARGET: &str = "spark_replay_core::pipeline";

/// 解码器生命周期与故障的日志目标。
pub const DECODER_TARGET: &str = "spark_replay_core::decoder";

/// 链路变更日志中 `op` 字段的取值。
pub mod ops {
    /// 插入 Handler。
    pub const ADD: &str = "add";
    /// 移除 Handler。
    pub const REMOVE: &str = "remove";
    /// 替换 Handler。
    pub const REPLACE: &str = "replace";
}

/// 解码器日志中 `transition` 字段的取值。
pub mod transitions {
    /// 解码逻辑请求自我移除。
    pub const SELF_REMOVAL: &str = "self_removal";
    /// 链路从外部摘除解码器。
    pub const EXTERNAL_REMOVAL: &str = "external_removal";
    /// 故障后停止解码。
    pub const HALT: &str = "halt";
    /// 故障后按策略自我移除。
    pub const FAULT_REMOVAL: &str = "fault_removal";
}
