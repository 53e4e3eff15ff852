use core::cell::Cell;

use bytes::Bytes;

use super::Cumulation;
use crate::error::Underflow;

/// 一次解码尝试内的可回放读取视图。
///
/// # 设计背景（Why）
/// - 解码逻辑希望“假装”完整报文已经在手，逐字段顺序读取；
/// - 传输层却只按任意大小的分片交付，读取随时可能越过已缓冲的末尾。
///
/// # 逻辑解析（How）
/// - 游标借用 [`Cumulation`] 的存储，自身只维护 `position` 与 `checkpoint` 两个绝对下标；
/// - 读取越界时返回 [`Underflow`]，不修改任何状态，由驱动器把读指针复位到检查点；
/// - 读取成功时只推进游标内的 `position`，真正的提交发生在尝试结束后的驱动器中，
///   因而一次失败的尝试对缓冲不留任何副作用；
/// - [`checkpoint`](Self::checkpoint) 把回滚目标前移到当前位置，已确认的前缀字段在重试时不再重复解析。
///
/// # 契约说明（What）
/// - **前置条件**：游标只在 [`ReplayingDecoder`](crate::codec::ReplayingDecoder) 的一次尝试内存活；
/// - **后置条件**：`checkpoint <= position <= writer_index` 恒成立；
/// - 一旦本次尝试请求了自我移除，`checkpoint()` 不再移动回滚目标，
///   随后的 `Underflow` 会把读指针恢复到移除请求之前的检查点。
///
/// # 风险提示（Trade-offs）
/// - `read_bytes` 返回拷贝后的 [`Bytes`]，便于消息脱离缓冲独立存活；对热点路径可改用零拷贝的
///   [`read_slice`](Self::read_slice)，代价是结果的生命周期受限于本次尝试。
pub struct ReplayCursor<'a> {
    data: &'a [u8],
    start: usize,
    position: usize,
    checkpoint: usize,
    removal_requested: &'a Cell<bool>,
}

/// 一次尝试结束时游标的最终位置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CursorOutcome {
    pub(crate) position: usize,
    pub(crate) checkpoint: usize,
}

impl<'a> ReplayCursor<'a> {
    pub(crate) fn new(cumulation: &'a Cumulation, removal_requested: &'a Cell<bool>) -> Self {
        let start = cumulation.reader_index();
        Self {
            data: cumulation.as_slice(),
            start,
            position: start,
            checkpoint: start,
            removal_requested,
        }
    }

    /// 当前位置之后仍可读取的字节数。
    pub fn buffered(&self) -> usize {
        self.data.len() - self.position
    }

    /// 本次尝试已读取的字节数。
    pub fn consumed(&self) -> usize {
        self.position - self.start
    }

    /// 自检查点起已读取、重试时将被重放的字节数。
    pub fn since_checkpoint(&self) -> usize {
        self.position - self.checkpoint
    }

    /// 将回滚目标移动到当前位置。移除请求之后调用无效果。
    pub fn checkpoint(&mut self) {
        if self.removal_requested.get() {
            return;
        }
        self.checkpoint = self.position;
    }

    fn ensure(&self, needed: usize) -> Result<(), Underflow> {
        let available = self.buffered();
        if needed > available {
            return Err(Underflow::new(needed, available));
        }
        Ok(())
    }

    /// 查看下一个字节但不前进。
    pub fn peek_u8(&self) -> Result<u8, Underflow> {
        self.ensure(1)?;
        Ok(self.data[self.position])
    }

    /// 读取一个字节。
    pub fn read_u8(&mut self) -> Result<u8, Underflow> {
        let byte = self.peek_u8()?;
        self.position += 1;
        Ok(byte)
    }

    /// 读取 `len` 个字节的借用视图。
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Underflow> {
        self.ensure(len)?;
        let data = self.data;
        let slice = &data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// 读取 `len` 个字节，返回独立的拷贝。
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, Underflow> {
        self.read_slice(len).map(Bytes::copy_from_slice)
    }

    /// 跳过 `len` 个字节。
    pub fn skip_bytes(&mut self, len: usize) -> Result<(), Underflow> {
        self.ensure(len)?;
        self.position += len;
        Ok(())
    }

    /// 从当前位置起寻找 `needle`，返回其之前的字节数；不移动读位置。
    ///
    /// 与普通查找不同，未找到时返回 [`Underflow`]：后续分片仍可能带来该字节。
    pub fn scan_for(&self, needle: u8) -> Result<usize, Underflow> {
        let window = &self.data[self.position..];
        window
            .iter()
            .position(|byte| *byte == needle)
            .ok_or_else(|| Underflow::new(window.len() + 1, window.len()))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Underflow> {
        let slice = self.read_slice(N)?;
        let mut out = [0_u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// 读取大端 `u16`。
    pub fn read_u16(&mut self) -> Result<u16, Underflow> {
        self.read_array().map(u16::from_be_bytes)
    }

    /// 读取大端 `u32`。
    pub fn read_u32(&mut self) -> Result<u32, Underflow> {
        self.read_array().map(u32::from_be_bytes)
    }

    /// 读取大端 `u64`。
    pub fn read_u64(&mut self) -> Result<u64, Underflow> {
        self.read_array().map(u64::from_be_bytes)
    }

    pub(crate) fn finish(self) -> CursorOutcome {
        CursorOutcome {
            position: self.position,
            checkpoint: self.checkpoint,
        }
    }
}
