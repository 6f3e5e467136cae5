//! Wire-level types for the Deepgram live-listen protocol.
//!
//! Transcription results arrive as JSON text frames tagged by `type`. Anything
//! that fails to deserialize is logged and skipped so one malformed event
//! cannot take the stream down.

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    Results(ResultsEvent),
    UtteranceEnd(UtteranceEndEvent),
    SpeechStarted(SpeechStartedEvent),
    Metadata(MetadataEvent),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ResultsEvent {
    #[serde(default)]
    pub is_final: bool,
    /// End-of-utterance flag from endpointing. Takes precedence over
    /// `is_final` when present.
    #[serde(default)]
    pub speech_final: Option<bool>,
    pub channel: ResultsChannel,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub start: Option<f64>,
}

impl ResultsEvent {
    /// The best current hypothesis, if the provider produced one.
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .filter(|t| !t.is_empty())
    }

    /// Whether this result ends the utterance.
    pub fn ends_utterance(&self) -> bool {
        self.speech_final.unwrap_or(self.is_final)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ResultsChannel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct UtteranceEndEvent {
    #[serde(default)]
    pub last_word_end: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SpeechStartedEvent {
    #[serde(default)]
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetadataEvent {
    #[serde(default)]
    pub request_id: Option<String>,
}
