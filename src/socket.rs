//! Real-time channel transport.
//!
//! A subscription delivers the events bound on its channel through an
//! unbounded queue. `LocalSocket` is an in-process broker; `WsSocket` speaks
//! the Pusher websocket protocol.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use crate::events::SocketEvent;

/// Events of one subscribed channel
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next event; `None` once the channel is unsubscribed
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Channel-scoped publish/subscribe transport
#[async_trait]
pub trait RealtimeSocket: Send + Sync {
    /// Subscribe to a channel. No events are delivered until bound.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;

    /// Start delivering events with this name on the channel
    fn bind(&self, channel: &str, event: &str);

    /// Stop delivering events with this name on the channel
    fn unbind(&self, channel: &str, event: &str);

    /// Drop the channel; its subscription receives no further events
    async fn unsubscribe(&self, channel: &str) -> Result<()>;
}

struct ChannelEntry {
    sender: mpsc::UnboundedSender<SocketEvent>,
    bound: HashSet<String>,
}

/// Channel bookkeeping shared by the transports
#[derive(Clone, Default)]
struct ChannelRegistry {
    channels: Arc<Mutex<HashMap<String, ChannelEntry>>>,
}

impl ChannelRegistry {
    fn register(&self, channel: &str) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let entry = ChannelEntry {
            sender,
            bound: HashSet::new(),
        };
        if let Ok(mut channels) = self.channels.lock() {
            if channels.insert(channel.to_string(), entry).is_some() {
                warn!("[Socket] channel {} subscribed twice, replacing", channel);
            }
        }
        Subscription {
            channel: channel.to_string(),
            receiver,
        }
    }

    fn bind(&self, channel: &str, event: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            match channels.get_mut(channel) {
                Some(entry) => {
                    entry.bound.insert(event.to_string());
                }
                None => warn!("[Socket] bind {} on unsubscribed channel {}", event, channel),
            }
        }
    }

    fn unbind(&self, channel: &str, event: &str) {
        if let Ok(mut channels) = self.channels.lock() {
            if let Some(entry) = channels.get_mut(channel) {
                entry.bound.remove(event);
            }
        }
    }

    fn remove(&self, channel: &str) -> bool {
        self.channels
            .lock()
            .map(|mut channels| channels.remove(channel).is_some())
            .unwrap_or(false)
    }

    fn is_subscribed(&self, channel: &str) -> bool {
        self.channels
            .lock()
            .map(|channels| channels.contains_key(channel))
            .unwrap_or(false)
    }

    /// Deliver an event; returns whether a bound subscriber received it
    fn dispatch(&self, channel: &str, event: SocketEvent) -> bool {
        let Ok(channels) = self.channels.lock() else {
            return false;
        };
        let Some(entry) = channels.get(channel) else {
            return false;
        };
        if !entry.bound.contains(event.name()) {
            debug!("[Socket] {} on {} has no binding", event.name(), channel);
            return false;
        }
        entry.sender.send(event).is_ok()
    }
}

/// In-process broker used for offline sessions and tests
#[derive(Clone, Default)]
pub struct LocalSocket {
    registry: ChannelRegistry,
}

impl LocalSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to a channel
    pub fn publish(&self, channel: &str, event: SocketEvent) -> bool {
        self.registry.dispatch(channel, event)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.registry.is_subscribed(channel)
    }
}

#[async_trait]
impl RealtimeSocket for LocalSocket {
    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        Ok(self.registry.register(channel))
    }

    fn bind(&self, channel: &str, event: &str) {
        self.registry.bind(channel, event);
    }

    fn unbind(&self, channel: &str, event: &str) {
        self.registry.unbind(channel, event);
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.registry.remove(channel);
        Ok(())
    }
}

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Frame of the Pusher protocol
#[derive(Debug, Deserialize)]
struct PusherFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl PusherFrame {
    /// Pusher sends `data` as a JSON-encoded string; accept raw objects too
    fn data_text(&self) -> String {
        match &self.data {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        }
    }
}

/// Websocket transport speaking the Pusher channel protocol
pub struct WsSocket {
    registry: ChannelRegistry,
    writer: Arc<tokio::sync::Mutex<WsWriter>>,
    reader_task: JoinHandle<()>,
}

impl WsSocket {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("[Socket] connecting to {}", url);
        let (stream, _response) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        let (write, mut read) = stream.split();

        let registry = ChannelRegistry::default();
        let writer = Arc::new(tokio::sync::Mutex::new(write));

        let reader_registry = registry.clone();
        let reader_writer = writer.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        Self::handle_frame(&reader_registry, &reader_writer, &text).await;
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                    Ok(WsMessage::Close(frame)) => {
                        info!("[Socket] closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("[Socket] read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            registry,
            writer,
            reader_task,
        })
    }

    async fn handle_frame(
        registry: &ChannelRegistry,
        writer: &Arc<tokio::sync::Mutex<WsWriter>>,
        text: &str,
    ) {
        let frame: PusherFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[Socket] unparseable frame: {}", e);
                return;
            }
        };

        if frame.event == "pusher:ping" {
            let pong = serde_json::json!({ "event": "pusher:pong", "data": {} }).to_string();
            if let Err(e) = writer.lock().await.send(WsMessage::Text(pong)).await {
                warn!("[Socket] failed to answer ping: {}", e);
            }
            return;
        }
        if frame.event.starts_with("pusher") {
            debug!("[Socket] protocol frame {}", frame.event);
            return;
        }

        let Some(channel) = frame.channel.as_deref() else {
            return;
        };
        match SocketEvent::decode(&frame.event, &frame.data_text()) {
            Ok(Some(event)) => {
                registry.dispatch(channel, event);
            }
            Ok(None) => debug!("[Socket] ignoring {} on {}", frame.event, channel),
            Err(e) => warn!("[Socket] bad {} payload on {}: {:#}", frame.event, channel, e),
        }
    }

    async fn send_control(&self, event: &str, channel: &str) -> Result<()> {
        let frame = serde_json::json!({ "event": event, "data": { "channel": channel } }).to_string();
        self.writer
            .lock()
            .await
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| anyhow!("Failed to send {}: {}", event, e))
    }
}

#[async_trait]
impl RealtimeSocket for WsSocket {
    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let subscription = self.registry.register(channel);
        self.send_control("pusher:subscribe", channel).await?;
        Ok(subscription)
    }

    fn bind(&self, channel: &str, event: &str) {
        self.registry.bind(channel, event);
    }

    fn unbind(&self, channel: &str, event: &str) {
        self.registry.unbind(channel, event);
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        if self.registry.remove(channel) {
            self.send_control("pusher:unsubscribe", channel).await?;
        }
        Ok(())
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
