//! Core of the real-time voice-coaching pipeline.
//!
//! Audio from a live speaker is transcribed continuously, final utterances
//! drive a streaming language model, the response is synthesized sentence by
//! sentence, and the assembled audio is played back -- with cooperative
//! barge-in the moment the speaker talks over an in-flight response.
//!
//! The HTTP surface, durable persistence, chat commands, and the audio
//! transport itself live outside this crate; they plug in through the traits
//! in [`transport`] and [`store`].

pub mod config;
pub mod connectors;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod transport;
pub mod turn;

pub use connectors::{
    ModelFactory, SpeechSynth, SpeechToText, SttFactory, SynthEvent, SynthFactory, TranscriptEvent,
};
pub use llm::{ChatMessage, ChatRole, CoachModel, DeepSeekCoach};
pub use session::{CoachingSession, SessionNotice, SessionParams, SessionRegistry};
pub use store::{SessionRecord, SessionStore};
pub use transport::{SpeakerEvent, VoiceTransport};
