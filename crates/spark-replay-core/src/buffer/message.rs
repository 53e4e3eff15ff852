use alloc::boxed::Box;
use bytes::Bytes;
use core::{any::Any, fmt};

/// `PipelineMessage` 统一承载网络层字节与业务层对象。
///
/// # 设计背景（Why）
/// - Handler 链在同一通道内既要传递传输层的原始分片，也要传递解码后的业务消息；
/// - 解码器需要区分两者：字节分片进入累积缓冲，业务对象原样透传。
///
/// # 逻辑解析（How）
/// - `Buffer` 变体封装不可变的 [`Bytes`]：分片、移除时的剩余字节快照都以值语义传递，
///   后续任何对源缓冲的写入都不会影响已转发的内容；
/// - `User` 变体封装任意 `Send + Sync` 对象，对应解码产出的消息，通过 `Any` 支持运行时下转型。
///
/// # 契约说明（What）
/// - 消息所有权在转发瞬间交给下一个 Handler，转发方不得保留引用；
/// - 消费 `User` 前必须处理下转型失败分支，参见 [`PipelineMessage::downcast_user`]。
pub enum PipelineMessage {
    /// 原始字节。
    Buffer(Bytes),
    /// 业务消息。
    User(Box<dyn Any + Send + Sync>),
}

impl PipelineMessage {
    /// 将任意业务对象包装为消息。
    pub fn from_user<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        PipelineMessage::User(Box::new(value))
    }

    /// 以拷贝方式从切片构造字节消息。
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        PipelineMessage::Buffer(Bytes::copy_from_slice(bytes))
    }

    /// 是否为字节消息。
    pub fn is_buffer(&self) -> bool {
        matches!(self, PipelineMessage::Buffer(_))
    }

    /// 借用字节内容；业务消息返回 `None`。
    pub fn as_buffer(&self) -> Option<&Bytes> {
        match self {
            PipelineMessage::Buffer(bytes) => Some(bytes),
            PipelineMessage::User(_) => None,
        }
    }

    /// 取出字节内容；业务消息原样退回。
    pub fn into_buffer(self) -> Result<Bytes, Self> {
        match self {
            PipelineMessage::Buffer(bytes) => Ok(bytes),
            other => Err(other),
        }
    }

    /// 尝试将业务消息下转型为 `T`；类型不符或为字节消息时原样退回。
    pub fn downcast_user<T>(self) -> Result<Box<T>, Self>
    where
        T: Any + Send + Sync,
    {
        match self {
            PipelineMessage::User(value) => value.downcast::<T>().map_err(PipelineMessage::User),
            other => Err(other),
        }
    }
}

impl From<Bytes> for PipelineMessage {
    fn from(bytes: Bytes) -> Self {
        PipelineMessage::Buffer(bytes)
    }
}

impl From<&'static [u8]> for PipelineMessage {
    fn from(bytes: &'static [u8]) -> Self {
        PipelineMessage::Buffer(Bytes::from_static(bytes))
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMessage::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            PipelineMessage::User(_) => f.debug_tuple("User").field(&"<erased-user>").finish(),
        }
    }
}
