//! Change feed over the realtime Phoenix-channel websocket.
//!
//! Each subscription owns one socket: join the topic with `postgres_changes`
//! INSERT bindings, heartbeat every 25 s, forward inserted records, and send
//! `phx_leave` when released. Server-side bindings only support a single
//! column filter, so they are a superset of the requested [`Filter`]; every
//! record is re-checked against the exact filter before it is forwarded.

use crate::config::SupabaseConfig;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use helf_chat::backend::{ChangeFeed, FeedChannel, FeedSpec};
use helf_chat::filter::Filter;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const CHANNEL_BUFFER: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketSource = SplitStream<Socket>;

/// One Phoenix channel frame (JSON serializer v1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhxMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhxMessage {
    pub fn join(
        topic: &str,
        table: &str,
        filter: &Filter,
        access_token: &str,
        reference: u64,
    ) -> Self {
        let changes: Vec<Value> = bindings(filter)
            .into_iter()
            .map(|binding| {
                let mut change = json!({ "event": "INSERT", "schema": "public", "table": table });
                if let Some(binding) = binding {
                    change["filter"] = Value::String(binding);
                }
                change
            })
            .collect();
        Self {
            topic: topic.to_string(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": changes,
                    "private": false,
                },
                "access_token": access_token,
            }),
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// `status` of a `phx_reply`.
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != "phx_reply" {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }

    /// The new row carried by a `postgres_changes` INSERT.
    pub fn inserted_record(&self) -> Option<&Value> {
        if self.event != "postgres_changes" {
            return None;
        }
        let data = self.payload.get("data")?;
        if data.get("type").and_then(Value::as_str) != Some("INSERT") {
            return None;
        }
        data.get("record")
    }
}

/// Server-side binding filters covering `filter`. `None` = unfiltered.
///
/// `Or` binds each branch, `And` binds its first conjunct. The union of the
/// bindings always contains every row `filter` matches.
pub fn bindings(filter: &Filter) -> Vec<Option<String>> {
    let mut out: Vec<Option<String>> = Vec::new();
    for binding in coarse(filter) {
        if !out.contains(&binding) {
            out.push(binding);
        }
    }
    if out.contains(&None) {
        return vec![None];
    }
    out
}

fn coarse(filter: &Filter) -> Vec<Option<String>> {
    match filter {
        Filter::Eq(column, value) => vec![Some(format!("{column}=eq.{value}"))],
        Filter::Neq(column, value) => vec![Some(format!("{column}=neq.{value}"))],
        Filter::And(filters) => filters.first().map(coarse).unwrap_or_else(|| vec![None]),
        Filter::Or(filters) if filters.is_empty() => vec![None],
        Filter::Or(filters) => filters.iter().flat_map(coarse).collect(),
    }
}

pub fn topic(channel: &str) -> String {
    format!("realtime:{channel}")
}

struct Running {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct SupabaseRealtime {
    config: SupabaseConfig,
    channels: Mutex<HashMap<u64, Running>>,
    next_id: AtomicU64,
}

impl SupabaseRealtime {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            config,
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

async fn send(sink: &mut SocketSink, msg: &PhxMessage) -> Result<()> {
    let text = serde_json::to_string(msg)?;
    sink.send(Message::Text(text))
        .await
        .context("realtime socket write")
}

async fn await_join(source: &mut SocketSource, topic: &str, join_ref: &str) -> Result<()> {
    while let Some(frame) = source.next().await {
        let Message::Text(text) = frame.context("realtime socket read")? else {
            continue;
        };
        let Ok(msg) = serde_json::from_str::<PhxMessage>(&text) else {
            continue;
        };
        if msg.topic != topic || msg.reference.as_deref() != Some(join_ref) {
            continue;
        }
        match msg.reply_status() {
            Some("ok") => return Ok(()),
            Some(status) => bail!(
                "join {topic} rejected ({status}): {}",
                msg.payload.get("response").cloned().unwrap_or_default()
            ),
            None => continue,
        }
    }
    bail!("realtime socket closed while joining {topic}")
}

struct Pump {
    sink: SocketSink,
    source: SocketSource,
    topic: String,
    filter: Filter,
    rows: mpsc::Sender<Value>,
    next_ref: u64,
}

impl Pump {
    fn next_ref(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        let start = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
        let mut heartbeat = tokio::time::interval_at(start, HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                _ = &mut stop => {
                    let reference = self.next_ref();
                    let leave = PhxMessage::leave(&self.topic, reference);
                    if let Err(e) = send(&mut self.sink, &leave).await {
                        tracing::debug!(topic = %self.topic, err = %e, "leave not sent");
                    }
                    let _ = self.sink.close().await;
                    break;
                }
                _ = heartbeat.tick() => {
                    let beat = PhxMessage::heartbeat(self.next_ref());
                    if let Err(e) = send(&mut self.sink, &beat).await {
                        tracing::warn!(topic = %self.topic, err = %e, "heartbeat failed");
                        break;
                    }
                }
                frame = self.source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let msg: PhxMessage = match serde_json::from_str(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                tracing::debug!(err = %e, "ignoring undecodable realtime frame");
                                continue;
                            }
                        };
                        if msg.topic != self.topic {
                            continue;
                        }
                        if msg.event == "phx_error" || msg.event == "phx_close" {
                            tracing::warn!(topic = %self.topic, event = %msg.event, "channel closed by server");
                            break;
                        }
                        let Some(record) = msg.inserted_record() else {
                            continue;
                        };
                        if !self.filter.matches(record) {
                            continue;
                        }
                        if self.rows.send(record.clone()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!(topic = %self.topic, "realtime socket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(topic = %self.topic, err = %e, "realtime socket error");
                        break;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for SupabaseRealtime {
    async fn subscribe(&self, spec: FeedSpec) -> Result<FeedChannel> {
        let (socket, _) = connect_async(self.config.realtime_url())
            .await
            .context("connect realtime socket")?;
        let (mut sink, mut source) = socket.split();

        let topic = topic(&spec.channel);
        let join_ref = 1;
        let join = PhxMessage::join(
            &topic,
            &spec.table,
            &spec.filter,
            self.config.bearer(),
            join_ref,
        );
        send(&mut sink, &join).await?;
        tokio::time::timeout(
            JOIN_TIMEOUT,
            await_join(&mut source, &topic, &join_ref.to_string()),
        )
        .await
        .with_context(|| format!("timed out joining {topic}"))??;

        let (rows, rx) = mpsc::channel(CHANNEL_BUFFER);
        let (stop, stop_rx) = oneshot::channel();
        let pump = Pump {
            sink,
            source,
            topic: topic.clone(),
            filter: spec.filter,
            rows,
            next_ref: join_ref,
        };
        let task = tokio::spawn(pump.run(stop_rx));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.channels
            .lock()
            .await
            .insert(id, Running { stop, task });
        tracing::info!(topic = %topic, table = %spec.table, "realtime channel joined");
        Ok(FeedChannel::new(id, spec.channel, rx))
    }

    async fn unsubscribe(&self, channel: FeedChannel) {
        let Some(running) = self.channels.lock().await.remove(&channel.id()) else {
            return;
        };
        let _ = running.stop.send(());
        if let Err(e) = running.task.await {
            tracing::warn!(channel = %channel.name(), err = %e, "realtime task ended abnormally");
        }
        tracing::debug!(channel = %channel.name(), "realtime channel left");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_filter() -> Filter {
        Filter::any(vec![
            Filter::all(vec![Filter::eq("sender_id", "a"), Filter::eq("receiver_id", "b")]),
            Filter::all(vec![Filter::eq("sender_id", "b"), Filter::eq("receiver_id", "a")]),
        ])
    }

    #[test]
    fn pair_binds_each_sender() {
        assert_eq!(
            bindings(&pair_filter()),
            vec![
                Some("sender_id=eq.a".to_string()),
                Some("sender_id=eq.b".to_string())
            ]
        );
    }

    #[test]
    fn task_binds_exactly() {
        assert_eq!(
            bindings(&Filter::eq("task_id", "t")),
            vec![Some("task_id=eq.t".to_string())]
        );
    }

    #[test]
    fn unfilterable_branch_widens_to_table() {
        let filter = Filter::any(vec![Filter::eq("a", "1"), Filter::all(vec![])]);
        assert_eq!(bindings(&filter), vec![None]);
    }

    #[test]
    fn join_frame_shape() {
        let msg = PhxMessage::join("realtime:messages_a_b", "chats", &pair_filter(), "jwt", 1);
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["event"], "phx_join");
        assert_eq!(wire["ref"], "1");
        assert_eq!(wire["payload"]["access_token"], "jwt");
        let changes = wire["payload"]["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["event"], "INSERT");
        assert_eq!(changes[0]["table"], "chats");
        assert_eq!(changes[1]["filter"], "sender_id=eq.b");
    }

    #[test]
    fn extracts_inserted_record() {
        let frame = r#"{
            "topic": "realtime:messages_a_b",
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "type": "INSERT",
                    "table": "chats",
                    "record": { "message_id": "m1", "sender_id": "a" }
                },
                "ids": [1]
            },
            "ref": null
        }"#;
        let msg: PhxMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(msg.inserted_record().unwrap()["message_id"], "m1");
        assert!(msg.reply_status().is_none());
    }

    #[test]
    fn update_events_are_not_inserts() {
        let msg = PhxMessage {
            topic: topic("x"),
            event: "postgres_changes".to_string(),
            payload: json!({ "data": { "type": "UPDATE", "record": {} } }),
            reference: None,
        };
        assert!(msg.inserted_record().is_none());
    }

    #[test]
    fn reply_status_only_for_replies() {
        let reply: PhxMessage = serde_json::from_value(json!({
            "topic": "realtime:x",
            "event": "phx_reply",
            "payload": { "status": "ok", "response": {} },
            "ref": "1"
        }))
        .unwrap();
        assert_eq!(reply.reply_status(), Some("ok"));
        assert_eq!(PhxMessage::heartbeat(2).reply_status(), None);
        assert_eq!(PhxMessage::leave("realtime:x", 3).event, "phx_leave");
    }
}
