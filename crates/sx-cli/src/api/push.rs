//! Reconnecting client for the `/ws` status stream
//!
//! Every (re)connection is greeted by the server with the full current
//! snapshot, so a client never has to reconcile missed updates. When the
//! stream drops for any reason the client waits a fixed delay and connects
//! again, until cancelled or until the event receiver goes away.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use sx_core::api::PushMessage;
use sx_core::types::StatusSnapshot;

/// Delay between a dropped stream and the next connection attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What the push client observed
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// The stream is open
    Connected,
    /// A status frame arrived
    Snapshot(StatusSnapshot),
    /// The stream dropped or could not be opened; a retry follows
    Disconnected { reason: String },
}

/// Follows the orchestrator's push stream across disconnects
#[derive(Debug, Clone)]
pub struct PushClient {
    url: String,
    reconnect_delay: Duration,
}

impl PushClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Override the delay between reconnection attempts
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Run the client on its own task
    pub fn spawn(self, cancel: CancellationToken) -> (mpsc::Receiver<PushEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(self.run(tx, cancel));
        (rx, task)
    }

    /// Connect, forward events and reconnect until `cancel` fires or `events`
    /// is closed
    pub async fn run(self, events: mpsc::Sender<PushEvent>, cancel: CancellationToken) {
        loop {
            let reason = tokio::select! {
                reason = self.session(&events) => reason,
                _ = cancel.cancelled() => break,
            };
            let Some(reason) = reason else {
                break;
            };

            tracing::warn!(
                "Push stream lost ({}). Reconnecting in {:?}",
                reason,
                self.reconnect_delay
            );
            if events
                .send(PushEvent::Disconnected { reason })
                .await
                .is_err()
            {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::debug!("Push client for {} stopped", self.url);
    }

    /// One connection. Returns why it ended, or `None` when nobody is
    /// listening for events any more.
    async fn session(&self, events: &mpsc::Sender<PushEvent>) -> Option<String> {
        tracing::debug!("Connecting to {}", self.url);
        let mut stream = match connect_async(self.url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => return Some(format!("connect failed: {}", e)),
        };

        tracing::info!("Push stream connected to {}", self.url);
        events.send(PushEvent::Connected).await.ok()?;

        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<PushMessage>(text.as_str()) {
                        Ok(PushMessage::Status(snapshot)) => {
                            events.send(PushEvent::Snapshot(snapshot)).await.ok()?;
                        }
                        Err(e) => tracing::warn!("Ignoring malformed push frame: {}", e),
                    }
                }
                Ok(Message::Close(_)) => return Some("closed by server".to_string()),
                Ok(_) => {}
                Err(e) => return Some(e.to_string()),
            }
        }

        Some("stream ended".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delay_is_fixed() {
        let client = PushClient::new("ws://127.0.0.1:8080/ws");
        assert_eq!(client.reconnect_delay(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let cancel = CancellationToken::new();
        let (mut events, task) = PushClient::new(format!("ws://{}/ws", addr))
            .with_reconnect_delay(Duration::from_millis(20))
            .spawn(cancel.clone());

        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(event, PushEvent::Disconnected { .. }));
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (events, task) = PushClient::new(format!("ws://{}/ws", addr))
            .with_reconnect_delay(Duration::from_millis(10))
            .spawn(CancellationToken::new());
        drop(events);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
