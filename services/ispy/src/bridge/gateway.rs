//! [`RobotGateway`] over the WebSocket bridge.

use super::protocol::{BridgeReply, BridgeRequest, Frame};
use anyhow::{Context, bail};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use ispy_core::{GameError, Posture, RobotGateway, ScanDescriptor, ScanMode};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time the bridge gets on top of a listen timeout to deliver the transcript.
const LISTEN_GRACE: Duration = Duration::from_secs(3);

/// Why a bridge request did not produce the expected reply.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("robot reported: {0}")]
    Robot(String),
    #[error("connection lost: {0}")]
    Connection(String),
    #[error("unexpected reply: {0}")]
    Protocol(String),
}

pub struct BridgeGateway {
    sink: SplitSink<WsStream, WsMessage>,
    stream: SplitStream<WsStream>,
    reply_timeout: Duration,
    next_id: u64,
}

impl BridgeGateway {
    /// Connects to the bridge at `url` and joins `realm`.
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket URL of the bridge, e.g. `ws://127.0.0.1:8765`.
    /// * `realm` - The robot's realm; the bridge rejects unknown realms.
    /// * `reply_timeout` - How long to wait for speak, scan and posture replies.
    pub async fn connect(url: &str, realm: &str, reply_timeout: Duration) -> anyhow::Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to robot bridge at {}", url))?;
        let (sink, stream) = ws_stream.split();
        let mut gateway = Self {
            sink,
            stream,
            reply_timeout,
            next_id: 0,
        };

        let hello = BridgeRequest::Hello {
            realm: realm.to_string(),
        };
        match gateway.call(hello, reply_timeout).await {
            Ok(BridgeReply::Ready) => {}
            Ok(other) => bail!("Unexpected handshake reply: {:?}", other),
            Err(e) => bail!("Robot bridge rejected realm '{}': {}", realm, e),
        }
        info!(%url, %realm, "Connected to robot bridge.");
        Ok(gateway)
    }

    /// Sends one request and waits for the reply with the same id.
    async fn call(
        &mut self,
        request: BridgeRequest,
        wait: Duration,
    ) -> Result<BridgeReply, BridgeError> {
        self.next_id += 1;
        let id = self.next_id;
        let payload = serde_json::to_string(&Frame { id, body: request })
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;
        debug!(id, %payload, "Sending bridge request");
        self.sink
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| BridgeError::Connection(e.to_string()))?;

        tokio::time::timeout(wait, self.reply_for(id))
            .await
            .map_err(|_| BridgeError::Timeout(wait))?
    }

    async fn reply_for(&mut self, id: u64) -> Result<BridgeReply, BridgeError> {
        while let Some(message) = self.stream.next().await {
            let text = match message.map_err(|e| BridgeError::Connection(e.to_string()))? {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => {
                    return Err(BridgeError::Connection(
                        "bridge closed the connection".to_string(),
                    ));
                }
                _ => continue,
            };
            let frame: Frame<BridgeReply> = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed bridge message");
                    continue;
                }
            };
            if frame.id != id {
                debug!(expected = id, got = frame.id, "Skipping stale bridge reply");
                continue;
            }
            return match frame.body {
                BridgeReply::Error { message } => Err(BridgeError::Robot(message)),
                reply => Ok(reply),
            };
        }
        Err(BridgeError::Connection("stream ended".to_string()))
    }

    async fn expect_done(&mut self, request: BridgeRequest) -> Result<(), BridgeError> {
        match self.call(request, self.reply_timeout).await? {
            BridgeReply::Done => Ok(()),
            other => Err(BridgeError::Protocol(format!("{:?}", other))),
        }
    }
}

#[async_trait]
impl RobotGateway for BridgeGateway {
    async fn speak(&mut self, text: &str) -> Result<(), GameError> {
        self.expect_done(BridgeRequest::Speak {
            text: text.to_string(),
        })
        .await
        .map_err(|e| GameError::SpeechOutputFailed(e.to_string()))
    }

    async fn listen(&mut self, timeout: Duration) -> Result<String, GameError> {
        let request = BridgeRequest::Listen {
            timeout_ms: timeout.as_millis() as u64,
        };
        match self.call(request, timeout + LISTEN_GRACE).await {
            Ok(BridgeReply::Utterance { text }) => Ok(text.trim().to_string()),
            Ok(other) => Err(GameError::SpeechInputFailed(format!(
                "unexpected reply: {:?}",
                other
            ))),
            Err(BridgeError::Timeout(_)) => {
                warn!("Bridge did not deliver a transcript in time");
                Ok(String::new())
            }
            Err(e) => Err(GameError::SpeechInputFailed(e.to_string())),
        }
    }

    async fn scan(&mut self, mode: ScanMode) -> Result<ScanDescriptor, GameError> {
        match self.call(BridgeRequest::Scan { mode }, self.reply_timeout).await {
            Ok(BridgeReply::ScanResult { descriptor }) => Ok(descriptor),
            Ok(other) => Err(GameError::ScanFailed(format!(
                "unexpected reply: {:?}",
                other
            ))),
            Err(e) => Err(GameError::ScanFailed(e.to_string())),
        }
    }

    async fn posture(&mut self, posture: Posture) -> Result<(), GameError> {
        self.expect_done(BridgeRequest::Posture { posture })
            .await
            .map_err(|e| GameError::PostureFailed(e.to_string()))
    }
}
