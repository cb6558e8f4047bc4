//! Push channel client.
//!
//! One WebSocket carries named JSON events in both directions. A reader
//! task forwards inbound events in arrival order; a writer task drains
//! queued intents. Neither task reorders or coalesces.
//!
//! [`ReconnectingChannel`] wraps a [`PushChannel`] for long-running
//! screens: losing the server is reported as an event and the connection
//! is retried on a fixed delay.

use std::time::Duration;

use async_trait::async_trait;
use common::events::{ClientIntent, ServerEvent};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{ConsoleError, Result};

const EVENT_BUFFER: usize = 256;

/// Anything that can carry an operator intent to the server.
#[async_trait]
pub trait IntentSink: Send + Sync {
    async fn send(&self, intent: ClientIntent) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Event(ServerEvent),
    Disconnected { reason: Option<String> },
}

#[derive(Clone, Debug)]
pub struct IntentSender {
    tx: mpsc::UnboundedSender<ClientIntent>,
}

#[async_trait]
impl IntentSink for IntentSender {
    async fn send(&self, intent: ClientIntent) -> Result<()> {
        self.tx.send(intent).map_err(|_| ConsoleError::ChannelClosed)
    }
}

pub struct PushChannel {
    sender: IntentSender,
    events: mpsc::Receiver<ChannelEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PushChannel {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url).await?;
        info!(url = %url, "push channel connected");
        let (mut sink, mut stream) = ws.split();

        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (intent_tx, mut intent_rx) = mpsc::unbounded_channel::<ClientIntent>();

        event_tx
            .send(ChannelEvent::Connected)
            .await
            .map_err(|_| ConsoleError::ChannelClosed)?;

        let writer = tokio::spawn(async move {
            while let Some(intent) = intent_rx.recv().await {
                let text = match intent.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(intent = %intent, error = %e, "failed to encode intent");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(intent = %intent, error = %e, "failed to send intent");
                    break;
                }
                debug!(intent = %intent, "intent sent");
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            let mut reason = None;
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerEvent::from_json(&text) {
                        Ok(Some(event)) => {
                            if event_tx.send(ChannelEvent::Event(event)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => debug!("ignoring unhandled push event"),
                        Err(e) => warn!(error = %e, "malformed push event"),
                    },
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }
            info!(reason = ?reason, "push channel disconnected");
            let _ = event_tx.send(ChannelEvent::Disconnected { reason }).await;
        });

        Ok(Self {
            sender: IntentSender { tx: intent_tx },
            events,
            reader,
            writer,
        })
    }

    pub fn sender(&self) -> IntentSender {
        self.sender.clone()
    }

    /// Next inbound event; `None` once the channel is fully drained.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub async fn send(&self, intent: ClientIntent) -> Result<()> {
        self.sender.send(intent).await
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// A push channel that survives server restarts.
///
/// Every successful connection yields [`ChannelEvent::Connected`] and every
/// loss, including a failed attempt after a previous loss, yields
/// [`ChannelEvent::Disconnected`] once. [`next_event`](Self::next_event) is
/// cancel safe.
pub struct ReconnectingChannel {
    url: String,
    retry_delay: Duration,
    channel: Option<PushChannel>,
    retry_at: Option<Instant>,
    reported_down: bool,
}

impl ReconnectingChannel {
    /// Does not connect yet; the first attempt runs on the first
    /// `next_event` call.
    pub fn new(url: impl Into<String>, retry_delay: Duration) -> Self {
        Self {
            url: url.into(),
            retry_delay,
            channel: None,
            retry_at: None,
            reported_down: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Intent sender of the live connection, if any.
    pub fn sender(&self) -> Option<IntentSender> {
        self.channel.as_ref().map(PushChannel::sender)
    }

    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            if let Some(channel) = self.channel.as_mut() {
                let event = channel.next_event().await;
                match event {
                    Some(ChannelEvent::Disconnected { reason }) => {
                        self.lose_connection();
                        return ChannelEvent::Disconnected { reason };
                    }
                    None => {
                        self.lose_connection();
                        return ChannelEvent::Disconnected { reason: None };
                    }
                    Some(event) => return event,
                }
            }

            if let Some(at) = self.retry_at {
                tokio::time::sleep_until(at).await;
            }
            match PushChannel::connect(&self.url).await {
                Ok(channel) => {
                    self.channel = Some(channel);
                    self.retry_at = None;
                    self.reported_down = false;
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "push channel unavailable, retrying");
                    self.retry_at = Some(Instant::now() + self.retry_delay);
                    if !std::mem::replace(&mut self.reported_down, true) {
                        return ChannelEvent::Disconnected {
                            reason: Some(e.to_string()),
                        };
                    }
                }
            }
        }
    }

    fn lose_connection(&mut self) {
        self.channel = None;
        self.retry_at = Some(Instant::now() + self.retry_delay);
        self.reported_down = true;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records intents instead of sending them.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) sent: Mutex<Vec<ClientIntent>>,
    }

    impl RecordingSink {
        pub(crate) fn sent(&self) -> Vec<ClientIntent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IntentSink for RecordingSink {
        async fn send(&self, intent: ClientIntent) -> Result<()> {
            self.sent.lock().unwrap().push(intent);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sender_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = IntentSender { tx };
        assert!(matches!(
            sender.send(ClientIntent::StopDetection).await,
            Err(ConsoleError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_reported_once() {
        let mut channel = ReconnectingChannel::new("ws://127.0.0.1:1/ws", Duration::from_millis(20));
        assert!(matches!(
            channel.next_event().await,
            ChannelEvent::Disconnected { reason: Some(_) }
        ));
        assert!(!channel.is_connected());
        assert!(channel.sender().is_none());

        // Further failed attempts stay quiet.
        let again = tokio::time::timeout(Duration::from_millis(200), channel.next_event()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn connect_to_nothing_fails() {
        let result = PushChannel::connect("ws://127.0.0.1:1/ws").await;
        assert!(matches!(result, Err(ConsoleError::Socket(_))));
    }
}
