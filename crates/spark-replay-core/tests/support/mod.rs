//! 集成测试共用的解码逻辑夹具。
#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use spark_replay_core::{
    DecodeContext, DecodeError, DecodeResult, DecoderConfig, ReplayCursor, ReplayDecode,
    ReplayingDecoder,
    pipeline::InboundHandler,
    test_stubs::pipeline::EmbeddedPipeline,
};

/// 读到 `\n` 为止，产出不含分隔符的字节。
#[derive(Default)]
pub struct LineFixture;

impl ReplayDecode for LineFixture {
    type Message = Bytes;

    fn decode(
        &mut self,
        src: &mut ReplayCursor<'_>,
        _ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Bytes>> {
        let len = src.scan_for(b'\n')?;
        let line = src.read_bytes(len)?;
        src.skip_bytes(1)?;
        Ok(Some(line))
    }

    fn describe(&self) -> &'static str {
        "line-fixture"
    }
}

/// `u16` 长度前缀 + 正文；读完长度后立即设置检查点，重试时只重放正文。
#[derive(Default)]
pub struct LengthPrefixed {
    pending: Option<usize>,
    pub header_reads: Arc<AtomicUsize>,
}

impl ReplayDecode for LengthPrefixed {
    type Message = Bytes;

    fn decode(
        &mut self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Bytes>> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                let len = usize::from(src.read_u16()?);
                self.header_reads.fetch_add(1, Ordering::SeqCst);
                ctx.check_frame_constraints(len)?;
                self.pending = Some(len);
                src.checkpoint();
                len
            }
        };
        let body = src.read_bytes(len)?;
        self.pending = None;
        Ok(Some(body))
    }
}

/// 行协议，遇到以 `!` 开头的行报告畸形输入。
#[derive(Default)]
pub struct StrictLine;

impl ReplayDecode for StrictLine {
    type Message = Bytes;

    fn decode(
        &mut self,
        src: &mut ReplayCursor<'_>,
        ctx: &mut DecodeContext<'_>,
    ) -> DecodeResult<Option<Bytes>> {
        if src.peek_u8()? == b'!' {
            return Err(DecodeError::malformed("line starts with `!`"));
        }
        LineFixture.decode(src, ctx)
    }
}

/// 以默认链路装配单个解码器，返回链路与解码器句柄。
pub fn decoder_channel<D: ReplayDecode>(
    decoder: D,
    config: DecoderConfig,
) -> (EmbeddedPipeline, Arc<ReplayingDecoder<D>>) {
    let decoder = Arc::new(ReplayingDecoder::with_config(decoder, config));
    let channel = EmbeddedPipeline::new();
    channel
        .add_last("decoder", Arc::clone(&decoder) as Arc<dyn InboundHandler>)
        .expect("add decoder");
    (channel, decoder)
}

/// 读出下一条解码消息（以 `Bytes` 为载荷）。
pub fn next_line(channel: &EmbeddedPipeline) -> Option<Bytes> {
    channel.read_inbound_user::<Bytes>()
}
