use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::types::ServerEvent;

mod config;
mod consts;
mod policy;
mod utils;

pub use config::{Config, ConfigBuilder};
pub use policy::ReconnectPolicy;

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub type SttTx = tokio::sync::mpsc::Sender<SttEvent>;
pub type SttRx = tokio::sync::mpsc::Receiver<SttEvent>;

/// Events delivered to the owner of the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    /// A transcription hypothesis. Interim results supersede each other;
    /// `is_final` marks the end of one spoken utterance.
    Transcript { text: String, is_final: bool },
    /// The link went down (it may come back via reconnect).
    Closed,
    /// Reconnect attempts are exhausted; the connector is permanently dead
    /// and every further `send_audio` is a silent no-op.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("missing transcription credentials: {0}")]
    Config(String),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

struct Shared {
    config: Config,
    state: Mutex<LinkState>,
    stopped: AtomicBool,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    events: SttTx,
    policy: Mutex<ReconnectPolicy>,
}

impl Shared {
    fn state(&self) -> LinkState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A streaming speech-to-text connection.
///
/// Owns one live-listen WebSocket. Unintentional disconnects are retried with
/// bounded exponential backoff; `stop()` marks the close as intentional and
/// suppresses the retry. Audio sent while the link is not open is dropped,
/// never queued.
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Opens the transcription stream and spawns the read and keep-alive
    /// tasks. Resolves once the WebSocket handshake completes, or fails after
    /// a bounded connect timeout.
    pub async fn start(config: Config, events: SttTx) -> Result<Self, SttError> {
        use secrecy::ExposeSecret;
        if config.api_key().expose_secret().is_empty() {
            return Err(SttError::Config(format!(
                "{} is not set",
                consts::DEEPGRAM_API_KEY
            )));
        }

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(LinkState::Idle),
            stopped: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(None),
            events,
            policy: Mutex::new(ReconnectPolicy::new(
                consts::MAX_RECONNECT_ATTEMPTS,
                consts::RECONNECT_BASE_DELAY,
            )),
        });

        open(&shared).await?;
        tokio::spawn(keep_alive_loop(shared.clone()));
        Ok(Self { shared })
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Forwards one Opus frame if the link is open; drops it otherwise.
    pub async fn send_audio(&self, frame: Bytes) {
        if self.shared.state() != LinkState::Open {
            tracing::trace!("dropping audio frame, transcription link not open");
            return;
        }
        let mut writer = self.shared.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return;
        };
        if let Err(e) = sink.send(Message::Binary(frame.into())).await {
            tracing::error!("failed to send audio frame: {}", e);
        }
    }

    /// Graceful close. Idempotent; suppresses automatic reconnect.
    pub async fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.shared.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            if let Err(e) = sink
                .send(Message::Text(consts::CLOSE_STREAM_MESSAGE.to_string()))
                .await
            {
                tracing::debug!("close-stream message not delivered: {}", e);
            }
            if let Err(e) = sink.close().await {
                tracing::debug!("websocket close failed: {}", e);
            }
        }
        self.shared.set_state(LinkState::Closed);
        tracing::info!("transcription stream stopped");
    }
}

/// Performs the full connect sequence: build the request, dial with a bounded
/// timeout, install the writer, spawn the reader. Used for both the initial
/// start and every reconnect attempt.
async fn open(shared: &Arc<Shared>) -> Result<(), SttError> {
    shared.set_state(LinkState::Connecting);
    let request = utils::build_request(&shared.config)?;
    let connect = tokio_tungstenite::connect_async(request);
    let (ws_stream, _) = match tokio::time::timeout(consts::CONNECT_TIMEOUT, connect).await {
        Ok(Ok(ok)) => ok,
        Ok(Err(e)) => {
            shared.set_state(LinkState::Closed);
            return Err(e.into());
        }
        Err(_) => {
            shared.set_state(LinkState::Closed);
            return Err(SttError::ConnectTimeout(consts::CONNECT_TIMEOUT));
        }
    };

    let (write, read) = ws_stream.split();
    *shared.writer.lock().await = Some(write);
    shared.set_state(LinkState::Open);
    shared
        .policy
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .reset();
    tokio::spawn(read_loop(shared.clone(), read));
    tracing::info!("transcription stream open");
    Ok(())
}

async fn read_loop(shared: Arc<Shared>, mut read: WsReader) {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => handle_text(&shared, &text).await,
            Ok(Message::Close(reason)) => {
                tracing::info!("transcription stream closed: {:?}", reason);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("failed to read from transcription stream: {}", e);
                break;
            }
        }
    }
    link_down(shared).await;
}

async fn handle_text(shared: &Arc<Shared>, text: &str) {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(ServerEvent::Results(results)) => {
            let Some(transcript) = results.transcript() else {
                return;
            };
            let event = SttEvent::Transcript {
                text: transcript.to_string(),
                is_final: results.ends_utterance(),
            };
            if shared.events.send(event).await.is_err() {
                tracing::warn!("transcript receiver dropped");
            }
        }
        Ok(ServerEvent::UtteranceEnd(_)) => {
            tracing::debug!("utterance end");
        }
        Ok(ServerEvent::SpeechStarted(_)) => {
            tracing::debug!("speech started");
        }
        Ok(ServerEvent::Metadata(meta)) => {
            tracing::debug!("stream metadata: request_id={:?}", meta.request_id);
        }
        Err(e) => {
            // Protocol errors are logged and the stream continues.
            tracing::error!("failed to deserialize event: {}, text=> {:?}", e, text);
        }
    }
}

async fn link_down(shared: Arc<Shared>) {
    shared.writer.lock().await.take();
    if shared.is_stopped() {
        shared.set_state(LinkState::Closed);
        return;
    }
    shared.set_state(LinkState::Closed);
    if shared.events.send(SttEvent::Closed).await.is_err() {
        tracing::warn!("event receiver dropped during close");
    }
    reconnect(shared).await;
}

/// Retries the full start sequence under one shared attempt counter. A
/// connect failure inside the loop keeps counting against the same episode;
/// only a successful open (inside `open`) resets it.
fn reconnect(
    shared: Arc<Shared>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    // Returning a boxed `dyn Future + Send` (rather than an `async fn`'s opaque
    // type) breaks the `read_loop -> link_down -> reconnect -> open ->
    // spawn(read_loop)` cycle that otherwise defeats `Send` auto-trait inference.
    Box::pin(async move {
    loop {
        if shared.is_stopped() {
            return;
        }
        let next = {
            let mut policy = shared.policy.lock().unwrap_or_else(|e| e.into_inner());
            policy.next_delay().map(|delay| (policy.attempt(), delay))
        };
        let Some((attempt, delay)) = next else {
            tracing::error!(
                "max reconnect attempts ({}) reached, transcription unavailable",
                consts::MAX_RECONNECT_ATTEMPTS
            );
            shared.set_state(LinkState::Failed);
            let _ = shared.events.send(SttEvent::Unavailable).await;
            return;
        };
        tracing::warn!(
            "reconnecting transcription stream in {:?} (attempt {}/{})",
            delay,
            attempt,
            consts::MAX_RECONNECT_ATTEMPTS
        );
        tokio::time::sleep(delay).await;
        if shared.is_stopped() {
            return;
        }
        match open(&shared).await {
            Ok(()) => {
                tracing::info!("transcription stream reconnected");
                return;
            }
            Err(e) => {
                tracing::error!("reconnect attempt failed: {}", e);
            }
        }
    }
    })
}

async fn keep_alive_loop(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(consts::KEEP_ALIVE_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if shared.is_stopped() || shared.state() == LinkState::Failed {
            return;
        }
        // The ping is a no-op unless the link is open.
        if shared.state() != LinkState::Open {
            continue;
        }
        let mut writer = shared.writer.lock().await;
        if let Some(sink) = writer.as_mut() {
            if let Err(e) = sink
                .send(Message::Text(consts::KEEP_ALIVE_MESSAGE.to_string()))
                .await
            {
                tracing::warn!("keep-alive ping failed: {}", e);
            }
        }
    }
}
