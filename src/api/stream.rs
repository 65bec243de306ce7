use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;
use crate::api::Session;
use crate::clinical::{Alert, VitalReading};
use crate::config::StreamConfig;
use crate::error::StreamError;

/// A decoded push-stream message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Vital(VitalReading),
    Alert(Alert),
    /// Well-formed envelope with an event type this client does not handle
    Unknown { kind: String },
    /// Anything that failed shape validation, kept verbatim
    Unrecognized(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl StreamEvent {
    /// Validate a raw message and map it to its variant
    pub fn decode(raw: &str) -> StreamEvent {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(_) => return StreamEvent::Unrecognized(raw.to_string()),
        };

        match envelope.kind.as_str() {
            "vital" => serde_json::from_value(envelope.payload)
                .map(StreamEvent::Vital)
                .unwrap_or_else(|_| StreamEvent::Unrecognized(raw.to_string())),
            "alert" => serde_json::from_value(envelope.payload)
                .map(StreamEvent::Alert)
                .unwrap_or_else(|_| StreamEvent::Unrecognized(raw.to_string())),
            _ => StreamEvent::Unknown { kind: envelope.kind },
        }
    }
}

/// One connection to the push channel.
///
/// `run` connects, forwards every text message to `sink` and returns the
/// number of messages forwarded once the connection ends. A failure before
/// the connection is established must be reported as `StreamError::Connect`.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn run(&self, token: &str, sink: mpsc::UnboundedSender<String>) -> Result<u64, StreamError>;
}

/// WebSocket push channel at `<base>/ws/stream?token=...`
#[derive(Debug, Clone)]
pub struct WebSocketChannel {
    endpoint: Url,
}

impl WebSocketChannel {
    /// `path` is appended to whatever path `base_url` already carries
    pub fn new(base_url: &str, path: &str) -> Result<Self, StreamError> {
        let mut endpoint = Url::parse(base_url)?;
        let scheme = match endpoint.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        endpoint
            .set_scheme(scheme)
            .map_err(|_| StreamError::Connect(format!("cannot use {} for a websocket", base_url)))?;
        endpoint
            .path_segments_mut()
            .map_err(|_| StreamError::Connect(format!("{} cannot carry a path", base_url)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        endpoint.set_query(None);

        Ok(WebSocketChannel { endpoint })
    }

    /// Connection url carrying the token
    pub fn url_for(&self, token: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("token", token);
        url
    }
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn run(&self, token: &str, sink: mpsc::UnboundedSender<String>) -> Result<u64, StreamError> {
        let url = self.url_for(token);
        let (mut socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        info!(endpoint = %self.endpoint, "push stream connected");

        let mut forwarded = 0;
        while let Some(message) = socket.next().await {
            let message = message.map_err(|e| StreamError::Transport(e.to_string()))?;
            let text = match message {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("dropping non-utf8 binary frame");
                        continue;
                    }
                },
                Message::Close(frame) => {
                    debug!(?frame, "push stream closed by server");
                    break;
                }
                // Pings are answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            if sink.send(text).is_err() {
                debug!("stream consumer gone, closing");
                break;
            }
            forwarded += 1;
        }

        Ok(forwarded)
    }
}

/// Reconnect timing for the push stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub stable_after: Duration,    // a connection up this long counts as healthy
    pub max_attempts: Option<u32>, // consecutive failures before giving up
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            stable_after: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl From<&StreamConfig> for ReconnectPolicy {
    fn from(config: &StreamConfig) -> Self {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            stable_after: Duration::from_millis(config.stable_after_ms),
            max_attempts: config.max_attempts,
        }
    }
}

/// Exponential backoff, doubling up to a cap
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff { initial, max, next: initial.min(max) }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial.min(self.max);
    }
}

/// Long-lived subscription to the push channel.
///
/// Reconnects with backoff after every drop. The backoff resets only after
/// a healthy connection: one that delivered a message or stayed up for
/// `stable_after`. Anything shorter counts as a failed attempt. Events
/// missed while disconnected are not replayed; the next selection or
/// refresh fetch resynchronizes state.
pub struct StreamIngestor {
    channel: Arc<dyn PushChannel>,
    session: Session,
    policy: ReconnectPolicy,
}

impl StreamIngestor {
    pub fn new(channel: Arc<dyn PushChannel>, session: Session, policy: ReconnectPolicy) -> Self {
        StreamIngestor { channel, session, policy }
    }

    pub fn spawn(self, sink: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
        tokio::spawn(self.run(sink))
    }

    pub async fn run(self, sink: mpsc::UnboundedSender<String>) {
        let mut backoff = Backoff::new(self.policy.initial_backoff, self.policy.max_backoff);
        let mut failures: u32 = 0;

        loop {
            // No credential, no identity to stream for
            let Some(token) = self.session.token() else {
                info!("no session credential, push stream not connected");
                return;
            };

            let started = Instant::now();
            let healthy = match self.channel.run(&token, sink.clone()).await {
                Ok(forwarded) => {
                    info!(forwarded, "push stream disconnected");
                    forwarded > 0 || started.elapsed() >= self.policy.stable_after
                }
                Err(StreamError::Connect(reason)) => {
                    warn!(%reason, "push stream connect failed");
                    false
                }
                Err(err) => {
                    warn!(error = %err, "push stream dropped");
                    started.elapsed() >= self.policy.stable_after
                }
            };

            if healthy {
                backoff.reset();
                failures = 0;
            } else {
                failures += 1;
            }

            if sink.is_closed() {
                return;
            }
            if let Some(max) = self.policy.max_attempts {
                if failures >= max {
                    warn!(failures, "giving up on push stream");
                    return;
                }
            }

            let delay = backoff.next_delay();
            debug!(?delay, "reconnecting push stream");
            tokio::time::sleep(delay).await;
        }
    }
}
