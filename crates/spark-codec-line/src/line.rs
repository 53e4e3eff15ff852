use alloc::{format, string::String};

use bytes::Bytes;
use spark_replay_core::{DecodeContext, DecodeError, DecodeResult, ReplayCursor, ReplayDecode};

const NEWLINE: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// 基于换行符的字节帧解码器，实现 [`ReplayDecode`] 契约。
///
/// # 行为概览（How）
/// - 以 `scan_for(b'\n')` 定位行尾：换行符尚未到达时游标返回 `Underflow`，驱动器回滚并等待更多分片；
/// - 找到后读出换行符之前的字节，跳过换行符本身；
/// - 开启 `strip_carriage_return` 时去掉行尾的 `\r`，兼容 `\r\n` 文本协议。
///
/// # 契约说明（What）
/// - **输出**：不含分隔符的 [`Bytes`]，与缓冲脱离，可独立存活；
/// - **前置条件**：若驱动器配置了 `max_frame_size`，行长（不含换行）超过上限即报告
///   `protocol.budget_exceeded`；换行符未到但已缓冲字节超过上限时同样报告，避免无界累积。
///
/// # 权衡与风险（Trade-offs）
/// - 每次重试都会从行首重新扫描；行很长且分片很碎时，可改用带检查点的长度前缀协议。
#[derive(Clone, Copy, Debug, Default)]
pub struct LineDecoder {
    strip_carriage_return: bool,
}

impl LineDecoder {
    /// 构建新的换行分帧解码器，保留 `\r`。
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否去掉行尾 `\r`。
    pub fn with_strip_carriage_return(mut self, strip: bool) -> Self {
        self.strip_carriage_return = strip;
        self
    }

    fn decode_line(
        &self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Bytes> {
        let len = match src.scan_for(NEWLINE) {
            Ok(len) => len,
            Err(underflow) => {
                ctx.check_frame_constraints(src.buffered())?;
                return Err(underflow.into());
            }
        };
        ctx.check_frame_constraints(len)?;
        let mut line = src.read_bytes(len)?;
        src.skip_bytes(1)?;
        if self.strip_carriage_return && line.last() == Some(&CARRIAGE_RETURN) {
            line.truncate(len - 1);
        }
        Ok(line)
    }
}

impl ReplayDecode for LineDecoder {
    type Message = Bytes;

    fn decode(
        &mut self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Self::Message>> {
        self.decode_line(src, ctx).map(Some)
    }

    fn describe(&self) -> &'static str {
        "line-decoder"
    }
}

/// 在 [`LineDecoder`] 之上解析 UTF-8 文本。
///
/// - 默认去掉行尾 `\r`；
/// - 非法 UTF-8 报告 `protocol.decode`，该行字节不会被重试。
#[derive(Clone, Copy, Debug)]
pub struct TextLineDecoder {
    lines: LineDecoder,
}

impl Default for TextLineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TextLineDecoder {
    /// 构建文本行解码器。
    pub fn new() -> Self {
        Self {
            lines: LineDecoder::new().with_strip_carriage_return(true),
        }
    }
}

impl ReplayDecode for TextLineDecoder {
    type Message = String;

    fn decode(
        &mut self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Self::Message>> {
        let line = self.lines.decode_line(src, ctx)?;
        match core::str::from_utf8(&line) {
            Ok(text) => Ok(Some(String::from(text))),
            Err(err) => Err(DecodeError::malformed(format!(
                "line payload is not valid UTF-8: {err}"
            ))),
        }
    }

    fn describe(&self) -> &'static str {
        "text-line-decoder"
    }
}
