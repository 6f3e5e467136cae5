use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::types::{AudioMessage, FlushMessage, InitMessage, TextMessage};

mod config;
mod consts;
mod utils;

pub use config::{Config, ConfigBuilder};

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub type TtsTx = tokio::sync::mpsc::Sender<TtsEvent>;
pub type TtsRx = tokio::sync::mpsc::Receiver<TtsEvent>;

/// Events delivered to the owner of the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtsEvent {
    /// One decoded audio chunk, in arrival order.
    Audio(Bytes),
    /// All audio for the flushed text has been emitted. Sent exactly once per
    /// completed stream; not guaranteed after `stop()`.
    Done,
    /// The socket closed without a completion marker.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("missing synthesis credentials: {0}")]
    Config(String),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct Shared {
    state: Mutex<LinkState>,
    stopped: AtomicBool,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    events: TtsTx,
}

impl Shared {
    fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// A streaming text-to-speech connection for a single response.
///
/// The connector lives for one turn: open it, feed it sentences, flush, and
/// collect audio until `TtsEvent::Done`. `stop()` aborts mid-synthesis and is
/// idempotent. Text sent while the link is not open is dropped, never queued.
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Opens the synthesis stream, sends the voice-settings handshake, and
    /// spawns the read task. Resolves once the WebSocket handshake completes,
    /// or fails after a bounded connect timeout.
    pub async fn start(config: Config, events: TtsTx) -> Result<Self, TtsError> {
        use secrecy::ExposeSecret;
        if config.api_key().expose_secret().is_empty() {
            return Err(TtsError::Config(format!(
                "{} is not set",
                consts::ELEVENLABS_API_KEY
            )));
        }
        if config.voice_id().is_empty() {
            return Err(TtsError::Config(format!(
                "{} is not set",
                consts::ELEVENLABS_VOICE_ID
            )));
        }

        let request = utils::build_request(&config)?;
        let connect = tokio_tungstenite::connect_async(request);
        let (ws_stream, _) = match tokio::time::timeout(consts::CONNECT_TIMEOUT, connect).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(TtsError::ConnectTimeout(consts::CONNECT_TIMEOUT)),
        };

        let (mut write, read) = ws_stream.split();

        // A single-space text opens the stream and pins the voice settings.
        let init = serde_json::to_string(&InitMessage {
            text: " ",
            voice_settings: config.voice_settings(),
        })?;
        write.send(Message::Text(init)).await?;

        let shared = Arc::new(Shared {
            state: Mutex::new(LinkState::Open),
            stopped: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(Some(write)),
            events,
        });
        tokio::spawn(read_loop(shared.clone(), read));
        tracing::info!("synthesis stream open");
        Ok(Self { shared })
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Enqueues one sentence for synthesis if the link is open; drops it
    /// otherwise.
    pub async fn send_text(&self, sentence: &str) {
        if self.shared.state() != LinkState::Open {
            tracing::trace!("dropping sentence, synthesis link not open");
            return;
        }
        // The provider segments on trailing whitespace.
        let padded;
        let text = if sentence.ends_with(' ') {
            sentence
        } else {
            padded = format!("{} ", sentence);
            &padded
        };
        let message = TextMessage {
            text,
            try_trigger_generation: true,
        };
        self.send_json(&message).await;
    }

    /// Signals that no more text is coming for this turn so the provider
    /// finalizes and emits any trailing audio.
    pub async fn flush(&self) {
        if self.shared.state() != LinkState::Open {
            return;
        }
        self.send_json(&FlushMessage { text: "" }).await;
    }

    /// Aborts synthesis. Idempotent; after this no completion signal is
    /// guaranteed.
    pub async fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.shared.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!("websocket close failed: {}", e);
            }
        }
        self.shared.set_state(LinkState::Closed);
        tracing::debug!("synthesis stream stopped");
    }

    async fn send_json<T: serde::Serialize>(&self, message: &T) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize synthesis message: {}", e);
                return;
            }
        };
        let mut writer = self.shared.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(Message::Text(json)).await {
            tracing::error!("failed to send synthesis message: {}", e);
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut read: WsReader) {
    let mut completed = false;
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if handle_text(&shared, &text).await {
                    completed = true;
                }
            }
            Ok(Message::Close(reason)) => {
                tracing::debug!("synthesis stream closed: {:?}", reason);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("failed to read from synthesis stream: {}", e);
                break;
            }
        }
    }
    shared.writer.lock().await.take();
    shared.set_state(LinkState::Closed);
    if !completed && !shared.stopped.load(Ordering::SeqCst) {
        let _ = shared.events.send(TtsEvent::Closed).await;
    }
}

/// Returns true once the completion marker has been seen.
async fn handle_text(shared: &Arc<Shared>, text: &str) -> bool {
    let message = match serde_json::from_str::<AudioMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            // Protocol errors are logged and the stream continues.
            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
            return false;
        }
    };
    if let Some(audio) = message.audio.as_deref() {
        match base64::engine::general_purpose::STANDARD.decode(audio) {
            Ok(pcm) => {
                if shared
                    .events
                    .send(TtsEvent::Audio(Bytes::from(pcm)))
                    .await
                    .is_err()
                {
                    tracing::warn!("audio receiver dropped");
                }
            }
            Err(e) => {
                tracing::error!("failed to decode audio chunk: {}", e);
            }
        }
    }
    if message.is_final == Some(true) {
        let _ = shared.events.send(TtsEvent::Done).await;
        return true;
    }
    false
}
