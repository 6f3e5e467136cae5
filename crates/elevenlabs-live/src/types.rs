//! Wire-level messages for the ElevenLabs stream-input protocol.
//!
//! Outbound frames are JSON text; the session is driven entirely by the
//! `text` field: a single space opens the stream, a sentence appends input,
//! and an empty string flushes it. Inbound frames carry base64 audio and a
//! final-marker.

#[derive(Debug, Clone, serde::Serialize)]
pub struct InitMessage<'a> {
    pub text: &'a str,
    pub voice_settings: VoiceSettings,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TextMessage<'a> {
    pub text: &'a str,
    pub try_trigger_generation: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FlushMessage<'a> {
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AudioMessage {
    /// Base64-encoded PCM, absent on pure status frames.
    #[serde(default)]
    pub audio: Option<String>,
    /// Set once all audio for the flushed text has been emitted.
    #[serde(default, rename = "isFinal")]
    pub is_final: Option<bool>,
}
