//! Provider adapters: concrete wire clients behind the generic connector
//! traits.
//!
//! Each adapter owns the translation from a provider's event type to the
//! core's, so the session and orchestrator never see a wire type.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::CoachConfig;
use crate::connectors::{
    ModelFactory, SpeechSynth, SpeechToText, SttFactory, SynthEvent, SynthFactory, TranscriptEvent,
};
use crate::llm::{CoachModel, DeepSeekCoach};
use crate::session::SessionParams;

/// Live transcription over Deepgram.
pub struct DeepgramFactory {
    config: deepgram_live::Config,
}

impl DeepgramFactory {
    pub fn new(config: deepgram_live::Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SttFactory for DeepgramFactory {
    async fn open(&self) -> Result<(Box<dyn SpeechToText>, mpsc::Receiver<TranscriptEvent>)> {
        let (raw_tx, mut raw_rx) = mpsc::channel(64);
        let client = deepgram_live::Client::start(self.config.clone(), raw_tx)
            .await
            .context("failed to open transcription stream")?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                let mapped = match event {
                    deepgram_live::SttEvent::Transcript { text, is_final } => {
                        TranscriptEvent::Transcript { text, is_final }
                    }
                    deepgram_live::SttEvent::Closed => TranscriptEvent::Closed,
                    deepgram_live::SttEvent::Unavailable => TranscriptEvent::Unavailable,
                };
                if tx.send(mapped).await.is_err() {
                    tracing::warn!("transcript receiver dropped, stopping adapter task");
                    break;
                }
            }
        });

        Ok((Box::new(DeepgramStt { client }), rx))
    }
}

struct DeepgramStt {
    client: deepgram_live::Client,
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn send_audio(&self, frame: Bytes) {
        self.client.send_audio(frame).await;
    }

    async fn stop(&self) {
        self.client.stop().await;
    }
}

/// Per-turn synthesis over ElevenLabs.
pub struct ElevenLabsFactory {
    config: elevenlabs_live::Config,
}

impl ElevenLabsFactory {
    pub fn new(config: elevenlabs_live::Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SynthFactory for ElevenLabsFactory {
    async fn open(&self) -> Result<(Box<dyn SpeechSynth>, mpsc::Receiver<SynthEvent>)> {
        let (raw_tx, mut raw_rx) = mpsc::channel(64);
        let client = elevenlabs_live::Client::start(self.config.clone(), raw_tx)
            .await
            .context("failed to open synthesis stream")?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                let mapped = match event {
                    elevenlabs_live::TtsEvent::Audio(chunk) => SynthEvent::Audio(chunk),
                    elevenlabs_live::TtsEvent::Done => SynthEvent::Done,
                    elevenlabs_live::TtsEvent::Closed => SynthEvent::Closed,
                };
                if tx.send(mapped).await.is_err() {
                    tracing::warn!("audio receiver dropped, stopping adapter task");
                    break;
                }
            }
        });

        Ok((Box::new(ElevenLabsSynth { client }), rx))
    }
}

struct ElevenLabsSynth {
    client: elevenlabs_live::Client,
}

#[async_trait]
impl SpeechSynth for ElevenLabsSynth {
    async fn send_text(&self, sentence: &str) {
        self.client.send_text(sentence).await;
    }

    async fn flush(&self) {
        self.client.flush().await;
    }

    async fn stop(&self) {
        self.client.stop().await;
    }
}

/// Builds a DeepSeek-backed model seeded with the session's wallet context.
pub struct DeepSeekFactory {
    config: CoachConfig,
}

impl DeepSeekFactory {
    pub fn new(config: CoachConfig) -> Self {
        Self { config }
    }
}

impl ModelFactory for DeepSeekFactory {
    fn build(&self, params: &SessionParams) -> Result<Box<dyn CoachModel>> {
        let model = DeepSeekCoach::from_config(&self.config, params)
            .context("failed to build the coaching model")?;
        Ok(Box::new(model))
    }
}
