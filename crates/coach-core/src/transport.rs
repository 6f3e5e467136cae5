//! Contract with the audio transport that owns the voice channel.
//!
//! The transport demultiplexes the channel into per-speaker frame feeds and
//! plays assembled buffers back into it. The core never owns the connection;
//! it must release its subscription and player before a session is removed,
//! on both graceful end and unexpected disconnect.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

/// What the transport reports about the subscribed speaker. The feed closing
/// altogether means the transport dropped the connection.
#[derive(Debug, Clone)]
pub enum SpeakerEvent {
    /// One Opus frame from the speaker (48 kHz stereo).
    Frame(Bytes),
    /// The speaker went quiet.
    Silence,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Registers for the speaker's audio. The returned feed delivers frames
    /// in arrival order until [`VoiceTransport::unsubscribe`] is called or the
    /// transport disconnects.
    async fn subscribe(&self, speaker_id: &str) -> Result<mpsc::Receiver<SpeakerEvent>>;

    /// Releases the per-speaker subscription. Must be invoked on cleanup.
    async fn unsubscribe(&self, speaker_id: &str);

    /// Plays one fully-assembled buffer and resolves when playback completes
    /// (or is stopped).
    async fn play(&self, group_id: &str, audio: Bytes) -> Result<()>;

    /// Interrupts any in-flight playback for the group.
    async fn stop_playback(&self, group_id: &str);

    /// Tears down the group's player on session end.
    async fn destroy_player(&self, group_id: &str);
}
