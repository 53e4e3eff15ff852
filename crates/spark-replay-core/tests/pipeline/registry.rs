use std::{sync::Arc, thread};

use spark_replay_core::{
    DecoderConfig, PipelineMessage, ReplayingDecoder,
    error::codes,
    pipeline::{HandlerRegistration, HotSwapPipeline, InboundHandler, Pipeline},
    test_stubs::pipeline::EmbeddedPipeline,
};

use super::hot_swap::{RecordingInbound, TestMessage};

/// 验证每次成功变更都会自增 epoch，失败的变更保持不变。
#[test]
fn mutations_advance_epoch_only_on_success() {
    let events = Default::default();
    let pipeline = HotSwapPipeline::new();
    assert_eq!(pipeline.epoch(), 0);

    let a = pipeline
        .add_last("a", RecordingInbound::new("a", &events))
        .expect("add");
    assert_eq!(pipeline.epoch(), 1);

    assert!(pipeline.add_last("a", RecordingInbound::new("a", &events)).is_err());
    assert_eq!(pipeline.epoch(), 1, "冲突不改变 epoch");

    let a2 = pipeline
        .replace_handler(a, "a2", RecordingInbound::new("a2", &events))
        .expect("replace");
    assert_eq!(pipeline.epoch(), 2);

    assert!(pipeline.remove_handler(a2));
    assert!(!pipeline.remove_handler(a2));
    assert_eq!(pipeline.epoch(), 3);
    assert!(pipeline.is_empty());
}

#[test]
fn registry_snapshot_reports_order_and_descriptors() {
    let events = Default::default();
    let pipeline = HotSwapPipeline::new();
    let decoder: Arc<dyn InboundHandler> = Arc::new(ReplayingDecoder::with_config(
        fixture::Upper,
        DecoderConfig::default(),
    ));
    let recorder = pipeline
        .add_last("recorder", RecordingInbound::new("r", &events))
        .expect("add recorder");
    let decoder_id = pipeline.add_first("decoder", decoder).expect("add decoder");

    let snapshot = pipeline.handlers();
    assert_eq!(
        snapshot,
        [
            HandlerRegistration::new(decoder_id, "decoder", "upper-fixture"),
            HandlerRegistration::new(recorder, "recorder", "recording-inbound"),
        ]
    );
    assert_eq!(pipeline.find("recorder"), Some(recorder));
    assert_eq!(pipeline.len(), 2);
    assert!(format!("{pipeline:?}").contains("decoder"));
}

#[test]
fn embedded_channel_rejects_duplicate_labels() {
    let events = Default::default();
    let result = EmbeddedPipeline::with_handlers([
        ("dup", RecordingInbound::new("first", &events)),
        ("dup", RecordingInbound::new("second", &events)),
    ]);
    let err = result.err().expect("duplicate label rejected");
    assert_eq!(err.code(), codes::PIPELINE_HANDLER_CONFLICT);

    let channel = EmbeddedPipeline::with_handlers([
        ("a", RecordingInbound::new("a", &events)),
        ("b", RecordingInbound::new("b", &events)),
    ])
    .expect("unique labels");
    assert_eq!(channel.pipeline().len(), 2);
}

/// 并发派发与变更：所有消息都必须抵达链尾。
#[test]
fn concurrent_dispatch_and_mutation_never_lose_messages() {
    const MESSAGES: u32 = 500;
    let events = Default::default();
    let channel = Arc::new(EmbeddedPipeline::new());
    channel
        .add_last("stable", RecordingInbound::new("stable", &events))
        .expect("add stable");

    let reader = {
        let channel = Arc::clone(&channel);
        thread::spawn(move || {
            for id in 0..MESSAGES {
                channel.write_inbound_message(PipelineMessage::from_user(
                    TestMessage { id },
                ));
            }
        })
    };
    let mutator = {
        let channel = Arc::clone(&channel);
        let events = Arc::clone(&events);
        thread::spawn(move || {
            for _ in 0..100 {
                let handle = channel
                    .pipeline()
                    .add_first("flicker", RecordingInbound::new("flicker", &events))
                    .expect("add flicker");
                assert!(channel.pipeline().remove_handler(handle));
            }
        })
    };

    reader.join().expect("reader thread");
    mutator.join().expect("mutator thread");

    let delivered: Vec<u32> =
        std::iter::from_fn(|| channel.read_inbound_user::<TestMessage>())
            .map(|message| message.id)
            .collect();
    assert_eq!(delivered, (0..MESSAGES).collect::<Vec<_>>());
    assert_eq!(channel.pipeline().epoch(), 1 + 200);
}

mod fixture {
    use bytes::Bytes;
    use spark_replay_core::{DecodeContext, DecodeResult, ReplayCursor, ReplayDecode};

    /// 每次读一个字节并转为大写。
    pub(super) struct Upper;

    impl ReplayDecode for Upper {
        type Message = Bytes;

        fn decode(
            &mut self,
            src: &mut ReplayCursor<'_>,
            _ctx: &mut DecodeContext<'_>,
        ) -> DecodeResult<Option<Bytes>> {
            let byte = src.read_u8()?;
            Ok(Some(Bytes::copy_from_slice(&[byte.to_ascii_uppercase()])))
        }

        fn describe(&self) -> &'static str {
            "upper-fixture"
        }
    }
}
