//! Realtime-database subscription over the REST streaming API.
//!
//! The node state object is streamed as server-sent events: an initial `put`
//! at `/` with the whole object, then `put`/`patch` events for whatever the
//! bridge changes. The events are folded back into one JSON object and the
//! full snapshot is forwarded after every change, like a `value` listener.
//!
//! The reader blocks, so it runs on its own thread and hands snapshots to
//! the telemetry task over a bounded channel.

use anyhow::{Context, bail};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::UIRefreshQueueSender;
use crate::config::TelemetryConfig;
use crate::ui::{SubscriptionStatus, UIRefreshState};

use super::sample::NodeSnapshot;

pub const SNAPSHOT_QUEUE_SIZE: usize = 16;
/// Bounded channel carrying snapshots from the subscription thread.
pub type SnapshotQueue = embassy_sync::channel::Channel<CriticalSectionRawMutex, NodeSnapshot, SNAPSHOT_QUEUE_SIZE>;
pub type SnapshotQueueReceiver = embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, NodeSnapshot, SNAPSHOT_QUEUE_SIZE>;
pub type SnapshotQueueSender = embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, NodeSnapshot, SNAPSHOT_QUEUE_SIZE>;

/// How often a paused subscription checks whether it was re-enabled.
const PAUSED_POLL: Duration = Duration::from_millis(250);

/// One complete server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Line-oriented server-sent events parser.
#[derive(Debug, Default)]
pub struct SseParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator). Returns a message when a
    /// blank line completes one.
    pub fn push_line(&mut self, line: &str) -> Option<SseMessage> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }
            let message = SseMessage {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(message);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

/// Database stream events.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    /// The server ended the stream (`cancel` or `auth_revoked`).
    Closed(String),
    Other(String),
}

impl StreamEvent {
    pub fn parse(message: &SseMessage) -> Result<Self, serde_json::Error> {
        Ok(match message.event.as_str() {
            "put" => {
                let PathData { path, data } = serde_json::from_str(&message.data)?;
                StreamEvent::Put { path, data }
            }
            "patch" => {
                let PathData { path, data } = serde_json::from_str(&message.data)?;
                StreamEvent::Patch { path, data }
            }
            "keep-alive" => StreamEvent::KeepAlive,
            "cancel" | "auth_revoked" => StreamEvent::Closed(format!("{} {}", message.event, message.data).trim().to_string()),
            other => StreamEvent::Other(other.to_string()),
        })
    }
}

/// Rebuilds the subscribed object from `put`/`patch` events.
#[derive(Debug, Default)]
pub struct SnapshotAssembler {
    root: Value,
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value at `path`; `null` deletes it.
    pub fn put(&mut self, path: &str, data: Value) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            self.root = data;
            return;
        };
        if data.is_null() {
            self.remove(parents, last);
            return;
        }

        let mut node = &mut self.root;
        for segment in parents {
            node = object_mut(node).entry(segment.to_string()).or_insert(Value::Null);
        }
        object_mut(node).insert(last.to_string(), data);
    }

    fn remove(&mut self, parents: &[&str], last: &str) {
        let mut node = &mut self.root;
        for segment in parents {
            match node.get_mut(*segment) {
                Some(child) => node = child,
                None => return,
            }
        }
        if let Value::Object(map) = node {
            map.remove(last);
        }
    }

    /// Merge each child of `data` into the object at `path`.
    pub fn patch(&mut self, path: &str, data: Value) {
        let Value::Object(children) = data else {
            return;
        };
        let base = path.trim_end_matches('/');
        for (key, value) in children {
            self.put(&format!("{}/{}", base, key), value);
        }
    }

    /// Fold a `put` or `patch` into the object; other events are ignored.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Put { path, data } => self.put(&path, data),
            StreamEvent::Patch { path, data } => self.patch(&path, data),
            _ => {}
        }
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn snapshot(&self) -> Option<NodeSnapshot> {
        NodeSnapshot::from_value(&self.root)
    }
}

/// The object at `node`, replacing any non-object value with an empty one.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

/// How a stream ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// The toggle was switched off.
    Paused,
    /// The server closed the connection.
    Closed,
}

/// Start the subscription thread.
///
/// `enabled` pauses and resumes the stream; a pause takes effect at the
/// next event or keep-alive.
pub fn spawn_subscription(
    config: TelemetryConfig,
    enabled: Arc<AtomicBool>,
    snapshot_tx: SnapshotQueueSender,
    ui_refresh_tx: UIRefreshQueueSender,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("telemetry-subscription".to_string()).spawn(move || {
        match Client::builder().timeout(None::<Duration>).connect_timeout(Duration::from_secs(10)).build() {
            Ok(client) => run_subscription(client, config, enabled, snapshot_tx, ui_refresh_tx),
            Err(e) => {
                log::error!("Failed to create subscription client: {}", e);
                let _ = ui_refresh_tx.try_send(UIRefreshState::Subscription(SubscriptionStatus::Failed(e.to_string())));
            }
        }
    })
}

fn run_subscription(
    client: Client,
    config: TelemetryConfig,
    enabled: Arc<AtomicBool>,
    snapshot_tx: SnapshotQueueSender,
    ui_refresh_tx: UIRefreshQueueSender,
) {
    let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);
    let mut was_enabled = None;

    loop {
        let is_enabled = enabled.load(Ordering::Relaxed);
        if was_enabled != Some(is_enabled) && !is_enabled {
            log::info!("Telemetry subscription paused");
            let _ = ui_refresh_tx.try_send(UIRefreshState::Subscription(SubscriptionStatus::Off));
        }
        was_enabled = Some(is_enabled);
        if !is_enabled {
            std::thread::sleep(PAUSED_POLL);
            continue;
        }

        let failure = match stream_once(&client, &config, &enabled, snapshot_tx, ui_refresh_tx) {
            Ok(StreamEnd::Paused) => continue,
            Ok(StreamEnd::Closed) => {
                log::info!("Telemetry stream closed by server");
                "stream closed".to_string()
            }
            Err(e) => {
                log::warn!("Telemetry stream failed: {:#}", e);
                format!("{:#}", e)
            }
        };
        let _ = ui_refresh_tx.try_send(UIRefreshState::Subscription(SubscriptionStatus::Failed(failure)));
        std::thread::sleep(reconnect_delay);
    }
}

fn stream_once(
    client: &Client,
    config: &TelemetryConfig,
    enabled: &AtomicBool,
    snapshot_tx: SnapshotQueueSender,
    ui_refresh_tx: UIRefreshQueueSender,
) -> anyhow::Result<StreamEnd> {
    let url = config.node_url();
    log::info!("Subscribing to {}", url);

    let response = client
        .get(&url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .with_context(|| format!("Failed to connect to {}", url))?;
    let status = response.status();
    if !status.is_success() {
        bail!("Subscription rejected ({})", status.as_u16());
    }
    let _ = ui_refresh_tx.try_send(UIRefreshState::Subscription(SubscriptionStatus::Ok));

    let mut parser = SseParser::new();
    let mut assembler = SnapshotAssembler::new();

    for line in BufReader::new(response).lines() {
        let line = line.context("Stream read failed")?;
        if !enabled.load(Ordering::Relaxed) {
            return Ok(StreamEnd::Paused);
        }
        let Some(message) = parser.push_line(&line) else { continue };

        let event = StreamEvent::parse(&message).with_context(|| format!("Malformed {} event", message.event))?;
        match event {
            StreamEvent::Closed(reason) => bail!("Stream closed by server: {}", reason),
            StreamEvent::KeepAlive => {}
            StreamEvent::Other(name) => log::debug!("Ignoring stream event {}", name),
            event => {
                assembler.apply(event);
                if let Some(snapshot) = assembler.snapshot() {
                    embassy_futures::block_on(snapshot_tx.send(snapshot));
                }
            }
        }
    }
    Ok(StreamEnd::Closed)
}
