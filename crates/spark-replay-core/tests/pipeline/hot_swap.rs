use std::sync::{Arc, Mutex};

use spark_replay_core::{
    CoreError,
    buffer::PipelineMessage,
    error::codes,
    pipeline::{Context, HotSwapPipeline, InboundHandler, Pipeline, PipelineHandleId},
    test_stubs::pipeline::EmbeddedPipeline,
};

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TestMessage {
    pub(crate) id: u32,
}

fn message(id: u32) -> PipelineMessage {
    PipelineMessage::from_user(TestMessage { id })
}

fn payload(msg: &PipelineMessage) -> String {
    match msg {
        PipelineMessage::User(user) => user
            .downcast_ref::<TestMessage>()
            .map(|message| message.id.to_string())
            .unwrap_or_else(|| "?".to_string()),
        PipelineMessage::Buffer(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn recorded(events: &Events) -> Vec<String> {
    events.lock().expect("recording lock").clone()
}

/// 记录 `名称:载荷` 后转发。
pub(crate) struct RecordingInbound {
    name: &'static str,
    events: Events,
}

impl RecordingInbound {
    pub(crate) fn new(name: &'static str, events: &Events) -> Arc<dyn InboundHandler> {
        Arc::new(Self {
            name,
            events: Arc::clone(events),
        })
    }
}

impl InboundHandler for RecordingInbound {
    fn describe(&self) -> &'static str {
        "recording-inbound"
    }

    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        self.events
            .lock()
            .expect("recording lock")
            .push(format!("{}:{}", self.name, payload(&msg)));
        ctx.forward_read(msg);
    }

    fn on_handler_added(&self, ctx: &dyn Context) {
        self.events
            .lock()
            .expect("recording lock")
            .push(format!("added:{}", ctx.label()));
    }

    fn on_handler_removed(&self, ctx: &dyn Context) {
        self.events
            .lock()
            .expect("recording lock")
            .push(format!("removed:{}", ctx.label()));
    }
}

/// 处理第一条消息时把自己移出链路，再继续转发。
struct RemoveSelfOnRead {
    events: Events,
}

impl InboundHandler for RemoveSelfOnRead {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        self.events
            .lock()
            .expect("recording lock")
            .push(format!("once:{}", payload(&msg)));
        assert!(ctx.pipeline().remove_handler(ctx.handle()));
        ctx.forward_read(msg);
    }
}

/// 处理消息时把自己替换为记录器，再继续转发。
struct ReplaceSelfOnRead {
    events: Events,
}

impl InboundHandler for ReplaceSelfOnRead {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        let successor = RecordingInbound::new("upgraded", &self.events);
        let replaced = ctx
            .pipeline()
            .replace_handler(ctx.handle(), "upgraded", successor);
        assert!(replaced.is_some());
        ctx.forward_read(msg);
    }
}

/// 处理消息时移除指定标签的下游 Handler。
struct RemoveDownstream {
    victim: &'static str,
}

impl InboundHandler for RemoveDownstream {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        if let Some(handle) = ctx.pipeline().find(self.victim) {
            ctx.pipeline().remove_handler(handle);
        }
        ctx.forward_read(msg);
    }
}

/// 处理消息时在自己之后插入新 Handler。
struct InsertAfterSelf {
    events: Events,
}

impl InboundHandler for InsertAfterSelf {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        if ctx.pipeline().find("late").is_none() {
            ctx.pipeline()
                .add_handler_after(ctx.handle(), "late", RecordingInbound::new("late", &self.events))
                .expect("insert after self");
        }
        ctx.forward_read(msg);
    }
}

/// 验证热插拔在运行期不会丢包或打乱顺序。
#[test]
fn hot_swap_inserts_handler_without_dropping_messages() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    let tls = channel
        .add_last("tls", RecordingInbound::new("tls", &events))
        .expect("add tls");

    channel.write_inbound_message(message(1));
    channel
        .pipeline()
        .add_handler_after(tls, "logging", RecordingInbound::new("log", &events))
        .expect("insert logging");
    channel.write_inbound_message(message(2));

    assert_eq!(
        recorded(&events),
        ["added:tls", "tls:1", "added:logging", "tls:2", "log:2"],
        "热插拔后应保持顺序且仅新消息经过 Logging"
    );
    let delivered: Vec<u32> = std::iter::from_fn(|| channel.read_inbound_user::<TestMessage>())
        .map(|message| message.id)
        .collect();
    assert_eq!(delivered, [1, 2]);
}

#[test]
fn self_removal_during_dispatch_keeps_event_flowing() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    channel
        .add_last("once", Arc::new(RemoveSelfOnRead { events: Arc::clone(&events) }))
        .expect("add once");
    channel
        .add_last("sink", RecordingInbound::new("sink", &events))
        .expect("add sink");

    channel.write_inbound_message(message(1));
    channel.write_inbound_message(message(2));

    assert_eq!(
        recorded(&events),
        ["added:sink", "once:1", "sink:1", "sink:2"]
    );
    assert!(channel.pipeline().find("once").is_none());
    assert_eq!(channel.drain_inbound().len(), 2);
}

#[test]
fn replacement_during_dispatch_reaches_successor() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    channel
        .add_last("swapper", Arc::new(ReplaceSelfOnRead { events: Arc::clone(&events) }))
        .expect("add swapper");
    channel
        .add_last("sink", RecordingInbound::new("sink", &events))
        .expect("add sink");

    channel.write_inbound_message(message(7));
    channel.write_inbound_message(message(8));

    assert_eq!(
        recorded(&events),
        [
            "added:sink",
            "added:upgraded",
            "upgraded:7",
            "sink:7",
            "upgraded:8",
            "sink:8"
        ]
    );
    let labels: Vec<_> = channel
        .pipeline()
        .handlers()
        .iter()
        .map(|entry| entry.label().to_string())
        .collect();
    assert_eq!(labels, ["upgraded", "sink"]);
}

#[test]
fn replacement_announces_successor_before_removal() {
    let events = Events::default();
    let pipeline = HotSwapPipeline::new();
    let old = pipeline
        .add_last("old", RecordingInbound::new("old", &events))
        .expect("add old");
    pipeline
        .replace_handler(old, "new", RecordingInbound::new("new", &events))
        .expect("replace");

    assert_eq!(recorded(&events), ["added:old", "added:new", "removed:old"]);
}

#[test]
fn removing_next_handler_mid_dispatch_skips_it() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    channel
        .add_last("cutter", Arc::new(RemoveDownstream { victim: "middle" }))
        .expect("add cutter");
    channel
        .add_last("middle", RecordingInbound::new("middle", &events))
        .expect("add middle");
    channel
        .add_last("sink", RecordingInbound::new("sink", &events))
        .expect("add sink");

    channel.write_inbound_message(message(3));

    assert_eq!(
        recorded(&events),
        ["added:middle", "added:sink", "removed:middle", "sink:3"]
    );
    assert_eq!(channel.pipeline().len(), 2);
}

#[test]
fn handler_inserted_after_current_sees_same_event() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    channel
        .add_last("inserter", Arc::new(InsertAfterSelf { events: Arc::clone(&events) }))
        .expect("add inserter");

    channel.write_inbound_message(message(4));
    assert_eq!(recorded(&events), ["added:late", "late:4"]);
    assert_eq!(
        channel.read_inbound_user::<TestMessage>(),
        Some(TestMessage { id: 4 })
    );
}

#[test]
fn dispatch_at_stale_positions_resolves_forward() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    let pipeline = channel.pipeline();
    let a = pipeline
        .add_last("a", RecordingInbound::new("a", &events))
        .expect("add a");
    let b = pipeline
        .add_last("b", RecordingInbound::new("b", &events))
        .expect("add b");
    pipeline
        .add_last("c", RecordingInbound::new("c", &events))
        .expect("add c");

    assert!(pipeline.remove_handler(b));
    let a2 = pipeline
        .replace_handler(a, "a2", RecordingInbound::new("a2", &events))
        .expect("replace a");
    events.lock().expect("recording lock").clear();

    pipeline.dispatch_read(b, message(5));
    pipeline.dispatch_read(a, message(6));
    assert_eq!(recorded(&events), ["c:5", "a2:6", "c:6"]);
    assert_ne!(a2, a, "替换生成新句柄");

    // 已移除句柄不可再次移除或替换。
    assert!(!pipeline.remove_handler(b));
    assert!(
        pipeline
            .replace_handler(b, "b2", RecordingInbound::new("b2", &events))
            .is_none()
    );
}

#[test]
fn insertion_after_replaced_anchor_follows_successor() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    let pipeline = channel.pipeline();
    let a = pipeline
        .add_last("a", RecordingInbound::new("a", &events))
        .expect("add a");
    pipeline
        .add_last("z", RecordingInbound::new("z", &events))
        .expect("add z");
    pipeline
        .replace_handler(a, "a2", RecordingInbound::new("a2", &events))
        .expect("replace");
    pipeline
        .add_handler_after(a, "b", RecordingInbound::new("b", &events))
        .expect("anchor resolves to successor");

    let labels: Vec<_> = pipeline
        .handlers()
        .iter()
        .map(|entry| entry.label().to_string())
        .collect();
    assert_eq!(labels, ["a2", "b", "z"]);
}

#[test]
fn conflicts_and_missing_anchors_are_reported() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    let pipeline = channel.pipeline();
    let first = pipeline
        .add_last("dup", RecordingInbound::new("dup", &events))
        .expect("add");
    pipeline
        .add_last("other", RecordingInbound::new("other", &events))
        .expect("add");

    let conflict = pipeline
        .add_last("dup", RecordingInbound::new("dup", &events))
        .expect_err("duplicate label");
    assert_eq!(conflict.code(), codes::PIPELINE_HANDLER_CONFLICT);

    assert!(
        pipeline
            .replace_handler(first, "other", RecordingInbound::new("x", &events))
            .is_none(),
        "替换为他人占用的标签被拒绝"
    );
    assert!(
        pipeline
            .replace_handler(first, "dup", RecordingInbound::new("dup2", &events))
            .is_some(),
        "替换者可以沿用原标签"
    );

    let gone = pipeline
        .add_last("gone", RecordingInbound::new("gone", &events))
        .expect("add");
    assert!(pipeline.remove_handler(gone));
    let missing = pipeline
        .add_handler_after(gone, "late", RecordingInbound::new("late", &events))
        .expect_err("removed anchor");
    assert_eq!(missing.code(), codes::PIPELINE_HANDLER_MISSING);
    assert_ne!(gone, PipelineHandleId::HEAD);
}

/// 未覆盖的事件回调默认转发到链尾。
#[test]
fn default_callbacks_forward_to_tail() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    channel
        .add_last("relay", RecordingInbound::new("relay", &events))
        .expect("add");

    channel.pipeline().emit_exception(CoreError::new(
        codes::PROTOCOL_DECODE,
        "injected",
    ));
    channel.read();
    assert!(!channel.finish());

    let error = channel.take_exception().expect("exception reaches tail");
    assert_eq!(error.message(), "injected");
    assert_eq!(channel.tail().read_requests(), 1);
    assert!(channel.tail().is_inactive());
}

#[test]
fn add_first_places_handler_at_head() {
    let events = Events::default();
    let channel = EmbeddedPipeline::new();
    let pipeline = channel.pipeline();
    pipeline
        .add_last("second", RecordingInbound::new("second", &events))
        .expect("add");
    pipeline
        .add_first("first", RecordingInbound::new("first", &events))
        .expect("add first");
    events.lock().expect("recording lock").clear();

    channel.write_inbound(b"hi");
    assert_eq!(recorded(&events), ["first:hi", "second:hi"]);
    assert_eq!(channel.read_inbound_bytes().as_deref(), Some(&b"hi"[..]));
}
