//! Generic connector contracts between the session core and the streaming
//! providers.
//!
//! The session and turn orchestrator only see these traits and event enums;
//! the provider adapters in [`crate::pipeline`] map the concrete wire clients
//! onto them. Tests drive the core with mocks instead of sockets.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::llm::CoachModel;
use crate::session::SessionParams;

/// Events from the transcription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A hypothesis for the current utterance. Interim results supersede each
    /// other; `is_final` closes the utterance.
    Transcript { text: String, is_final: bool },
    /// The link dropped (reconnect may bring it back).
    Closed,
    /// Reconnects are exhausted; the session has gone deaf and should tell
    /// the user.
    Unavailable,
}

/// Events from a per-turn synthesis stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthEvent {
    /// One raw audio chunk, in arrival order.
    Audio(Bytes),
    /// All audio for the flushed text has been emitted.
    Done,
    /// The stream ended without a completion marker.
    Closed,
}

/// A live speech-to-text connection owned by the session.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Forwards one audio frame; a silent no-op when the link is down.
    async fn send_audio(&self, frame: Bytes);
    /// Idempotent graceful close; suppresses reconnect.
    async fn stop(&self);
}

/// Opens the session-lifetime transcription stream.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SttFactory: Send + Sync {
    async fn open(&self)
    -> Result<(Box<dyn SpeechToText>, mpsc::Receiver<TranscriptEvent>)>;
}

/// A text-to-speech connection owned by a single turn.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Enqueues one sentence; a silent no-op when the link is down.
    async fn send_text(&self, sentence: &str);
    /// No more text is coming for this turn.
    async fn flush(&self);
    /// Idempotent mid-synthesis abort.
    async fn stop(&self);
}

/// Opens a fresh synthesis stream for one turn.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SynthFactory: Send + Sync {
    async fn open(&self) -> Result<(Box<dyn SpeechSynth>, mpsc::Receiver<SynthEvent>)>;
}

/// Builds the session's conversational model from its identity parameters.
#[cfg_attr(test, automock)]
pub trait ModelFactory: Send + Sync {
    fn build(&self, params: &SessionParams) -> Result<Box<dyn CoachModel>>;
}
