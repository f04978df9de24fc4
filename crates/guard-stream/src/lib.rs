pub mod doctor;

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use guard_proto::{decode_message, ConnectionState, FrameMessage};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000/ws".into(),
            connect_timeout_ms: 10_000,
            channel_capacity: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    State(ConnectionState),
    Frame(FrameMessage),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub messages: u64,
    pub frames: u64,
    pub dropped: u64,
}

/// Receive-only client for the detection backend's WebSocket feed.
///
/// One instance drives one connection: `run` publishes CONNECTING, OPEN on establishment,
/// every decoded frame in arrival order, and CLOSED exactly once when the connection ends
/// for any reason. There is no reconnect.
pub struct StreamClient {
    cfg: StreamConfig,
    stats: LinkStats,
    next_seq: u64,
}

impl StreamClient {
    pub fn new(cfg: StreamConfig) -> Self {
        Self { cfg, stats: LinkStats::default(), next_seq: 1 }
    }

    pub async fn run(mut self, tx: mpsc::Sender<StreamEvent>) -> LinkStats {
        self.receive(&tx).await;
        let _ = tx.send(StreamEvent::State(ConnectionState::Closed)).await;
        info!(
            "stream: closed (messages={}, frames={}, dropped={})",
            self.stats.messages, self.stats.frames, self.stats.dropped
        );
        self.stats
    }

    async fn receive(&mut self, tx: &mpsc::Sender<StreamEvent>) {
        if tx.send(StreamEvent::State(ConnectionState::Connecting)).await.is_err() {
            return;
        }

        let timeout = Duration::from_millis(self.cfg.connect_timeout_ms);
        let mut ws = match tokio::time::timeout(timeout, connect_async(self.cfg.endpoint.as_str())).await {
            Ok(Ok((ws, _resp))) => ws,
            Ok(Err(e)) => {
                warn!("stream: connect to {} failed: {}", self.cfg.endpoint, e);
                return;
            }
            Err(_) => {
                warn!("stream: connect to {} timed out after {:?}", self.cfg.endpoint, timeout);
                return;
            }
        };
        info!("stream: connected to {}", self.cfg.endpoint);
        if tx.send(StreamEvent::State(ConnectionState::Open)).await.is_err() {
            return;
        }

        while let Some(msg) = ws.next().await {
            let text = match msg {
                Ok(Message::Text(t)) => t,
                Ok(Message::Binary(b)) => match String::from_utf8(b) {
                    Ok(t) => t,
                    Err(_) => {
                        self.stats.messages += 1;
                        self.stats.dropped += 1;
                        warn!("stream: dropped non-utf8 binary message");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("stream: close frame {:?}", frame);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("stream: connection error: {}", e);
                    break;
                }
            };

            let Some(frame) = self.decode(&text) else { continue };
            if tx.send(StreamEvent::Frame(frame)).await.is_err() {
                debug!("stream: consumer gone");
                break;
            }
        }
    }

    fn decode(&mut self, text: &str) -> Option<FrameMessage> {
        self.stats.messages += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        match decode_message(text, seq) {
            Ok(frame) => {
                self.stats.frames += 1;
                debug!("stream: frame #{} with {} detections", seq, frame.detections.len());
                Some(frame)
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("stream: dropped malformed message #{}: {}", seq, e);
                None
            }
        }
    }
}
