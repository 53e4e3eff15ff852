use bytes::{Buf, Bytes, BytesMut};

/// 累积缓冲：按到达顺序拼接分片，维护“已读/未读”边界。
///
/// # 逻辑解析（How）
/// - 底层存储为 [`BytesMut`]，`reader_index` 标记已被成功解码消费的前缀长度；
/// - [`append`](Self::append) 复制分片内容，调用方随后对原分片的任何修改都不会影响累积内容；
/// - [`discard_consumed`](Self::discard_consumed) 通过 `advance` 丢弃已读前缀并把读指针归零，
///   不改变可读内容。
///
/// # 契约说明（What）
/// - 不变式：`reader_index <= storage.len()`；
/// - 读指针只会被驱动器在提交时前移、在回滚时复位，解码逻辑只能通过游标间接观察。
#[derive(Debug, Default)]
pub struct Cumulation {
    storage: BytesMut,
    reader_index: usize,
}

impl Cumulation {
    /// 以给定初始容量创建空缓冲。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: BytesMut::with_capacity(capacity),
            reader_index: 0,
        }
    }

    /// 追加一个分片（复制）。
    pub fn append(&mut self, fragment: &[u8]) {
        self.storage.extend_from_slice(fragment);
    }

    /// 尚未消费的字节数。
    pub fn readable(&self) -> usize {
        self.storage.len() - self.reader_index
    }

    /// 是否还有未消费字节。
    pub fn is_readable(&self) -> bool {
        self.readable() > 0
    }

    /// 当前读指针（相对存储起点）。
    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    /// 已写入的总字节数（含已消费前缀）。
    pub fn writer_index(&self) -> usize {
        self.storage.len()
    }

    /// 全部存储内容，游标据此做绝对位置读取。
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    /// 设置读指针，越界时截断到写指针。
    pub(crate) fn set_reader_index(&mut self, index: usize) {
        self.reader_index = index.min(self.storage.len());
    }

    /// 未消费内容的切片视图。
    pub fn readable_slice(&self) -> &[u8] {
        &self.storage[self.reader_index..]
    }

    /// 复制未消费内容为独立的 [`Bytes`]；之后对缓冲的修改不影响返回值。
    pub fn snapshot_readable(&self) -> Bytes {
        Bytes::copy_from_slice(self.readable_slice())
    }

    /// 丢弃已消费前缀，读指针归零。
    pub fn discard_consumed(&mut self) {
        if self.reader_index == 0 {
            return;
        }
        self.storage.advance(self.reader_index);
        self.reader_index = 0;
    }

    /// 清空全部内容，保留已分配容量。
    pub fn clear(&mut self) {
        self.storage.clear();
        self.reader_index = 0;
    }
}
