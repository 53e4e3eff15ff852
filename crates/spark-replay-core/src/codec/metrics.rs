/// 解码器累计统计的只读快照。
///
/// 计数在解码器生命周期内单调递增，读取时复制一份，不受后续事件影响。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// 成功产出的消息数。
    pub messages_decoded: u64,
    /// 因字节不足回滚的尝试次数。
    pub underflows: u64,
    /// 已报告的故障数（含预算超限）。
    pub faults: u64,
    /// 收到并进入累积缓冲的字节数。
    pub bytes_received: u64,
    /// 移除时作为剩余字节转发的字节数。
    pub bytes_forwarded_on_removal: u64,
}
