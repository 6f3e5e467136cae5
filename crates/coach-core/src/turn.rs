//! One conversational turn: model stream -> sentence-chunked synthesis ->
//! single playback.
//!
//! Cancellation is cooperative. The turn checks its token at every stage
//! boundary (after connecting synthesis, per model chunk, before flush,
//! before and during audio collection, before playback) and on cancellation
//! stops its own synthesis stream and exits. The synthesis connector is owned
//! by the turn; nothing outside it ever holds a reference.

use anyhow::Result;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::connectors::{SpeechSynth, SynthEvent};
use crate::session::CoachingSession;

/// Splits a token stream into sentences on `.`, `!` or `?` followed by
/// whitespace, retaining the unterminated remainder.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk and returns any sentences it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut sentences = Vec::new();
        while let Some((end, ws_len)) = find_sentence_boundary(&self.buffer) {
            let sentence: String = self.buffer.drain(..end).collect();
            self.buffer.drain(..ws_len);
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
        }
        sentences
    }

    /// Takes whatever is left once the stream ends, if it is non-empty.
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

/// Byte offset just past the first sentence terminator that is followed by
/// whitespace, plus the width of that whitespace character.
fn find_sentence_boundary(text: &str) -> Option<(usize, usize)> {
    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some((index + ch.len_utf8(), next.len_utf8()));
                }
            }
        }
    }
    None
}

/// Runs one turn for a finalized utterance. Every exit path stops the turn's
/// synthesis stream; the caller clears the session's processing flag.
pub(crate) async fn run_turn(session: &CoachingSession, text: &str, cancel: &CancellationToken) {
    debug!(speaker = %session.speaker_id(), "starting turn");

    let (synth, mut synth_events) = match session.synth_factory().open().await {
        Ok(pair) => pair,
        Err(e) => {
            error!("failed to open synthesis stream: {:#}", e);
            return;
        }
    };

    // A barge-in may have landed while synthesis was connecting.
    if cancel.is_cancelled() {
        synth.stop().await;
        return;
    }

    let full = match stream_model(session, text, synth.as_ref(), cancel).await {
        Ok(Some(full)) => full,
        Ok(None) => {
            debug!(speaker = %session.speaker_id(), "turn interrupted during generation");
            synth.stop().await;
            return;
        }
        Err(e) => {
            error!("model response failed: {:#}", e);
            synth.stop().await;
            return;
        }
    };

    if cancel.is_cancelled() {
        synth.stop().await;
        return;
    }
    session.push_nudge(full);

    // Collect the synthesized audio in arrival order.
    let mut chunks: Vec<Bytes> = Vec::new();
    let completed = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                synth.stop().await;
                return;
            }
            event = synth_events.recv() => match event {
                Some(SynthEvent::Audio(chunk)) => chunks.push(chunk),
                Some(SynthEvent::Done) => break true,
                Some(SynthEvent::Closed) | None => break false,
            }
        }
    };
    if !completed {
        warn!(speaker = %session.speaker_id(), "synthesis stream ended without completing");
    }

    if cancel.is_cancelled() {
        synth.stop().await;
        return;
    }

    if chunks.is_empty() {
        warn!(speaker = %session.speaker_id(), "no audio received from synthesis, skipping playback");
    } else {
        let total: usize = chunks.iter().map(Bytes::len).sum();
        let mut audio = Vec::with_capacity(total);
        for chunk in &chunks {
            audio.extend_from_slice(chunk);
        }
        debug!(speaker = %session.speaker_id(), "playing {} bytes", audio.len());
        if let Err(e) = session
            .transport()
            .play(session.group_id(), Bytes::from(audio))
            .await
        {
            error!("audio playback failed: {:#}", e);
        }
    }

    synth.stop().await;
}

/// Streams one model response, forwarding completed sentences to synthesis as
/// they form. Returns `Ok(None)` if the turn was cancelled mid-stream (the
/// in-flight request is dropped), `Ok(Some(full))` after a successful flush.
async fn stream_model(
    session: &CoachingSession,
    text: &str,
    synth: &dyn SpeechSynth,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::channel::<String>(64);
    let mut llm = session.llm().lock().await;
    let mut splitter = SentenceSplitter::new();

    let respond = llm.respond(text, chunk_tx);
    tokio::pin!(respond);
    let mut outcome: Option<Result<String>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            chunk = chunk_rx.recv() => match chunk {
                Some(chunk) => {
                    if cancel.is_cancelled() {
                        continue;
                    }
                    for sentence in splitter.push(&chunk) {
                        synth.send_text(&sentence).await;
                    }
                }
                // The sender lives inside `respond`; the channel draining to
                // None means the stream is over.
                None => break,
            },
            result = &mut respond, if outcome.is_none() => outcome = Some(result),
        }
    }

    let full = match outcome {
        Some(result) => result?,
        None => anyhow::bail!("model stream ended without a result"),
    };

    if cancel.is_cancelled() {
        return Ok(None);
    }
    if let Some(rest) = splitter.take_remainder() {
        synth.send_text(&rest).await;
    }
    synth.flush().await;
    Ok(Some(full))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::*;
    use crate::transport::MockVoiceTransport;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[test]
    fn splitter_emits_sentences_and_keeps_the_remainder() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("Hi the").is_empty());
        assert_eq!(splitter.push("re. How"), vec!["Hi there.".to_string()]);
        assert!(splitter.push(" can I help?").is_empty());
        assert_eq!(splitter.take_remainder(), Some("How can I help?".to_string()));
        assert_eq!(splitter.take_remainder(), None);
    }

    #[test]
    fn splitter_handles_multiple_sentences_in_one_chunk() {
        let mut splitter = SentenceSplitter::new();
        assert_eq!(
            splitter.push("One. Two! Three? Four"),
            vec!["One.".to_string(), "Two!".to_string(), "Three?".to_string()]
        );
        assert_eq!(splitter.take_remainder(), Some("Four".to_string()));
    }

    #[test]
    fn splitter_ignores_terminators_without_whitespace() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("version 2.5 is out").is_empty());
        assert_eq!(
            splitter.take_remainder(),
            Some("version 2.5 is out".to_string())
        );
    }

    #[tokio::test]
    async fn full_turn_sends_sentences_flushes_and_plays_once() {
        let mut transport = MockVoiceTransport::new();
        transport
            .expect_play()
            .withf(|group, audio| group == "group-1" && audio.as_ref() == b"chunk-achunk-b")
            .times(1)
            .returning(|_, _| Ok(()));

        let script = SynthScript::new(vec![
            SynthEvent::Audio(Bytes::from_static(b"chunk-a")),
            SynthEvent::Audio(Bytes::from_static(b"chunk-b")),
            SynthEvent::Done,
        ]);
        let sentences = Arc::clone(&script.sentences);
        let flushed = Arc::clone(&script.flushed);
        let stopped = Arc::clone(&script.stopped);

        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::new(vec![script])),
            Box::new(ScriptedModel::new(
                vec!["Hi the", "re. How", " can I help?"],
                "Hi there. How can I help?",
            )),
        );

        session.begin_turn("hello".to_string()).await;
        session.await_active_turn().await;

        assert_eq!(
            sentences.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            vec!["Hi there.".to_string(), "How can I help?".to_string()]
        );
        assert!(flushed.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(
            session.nudges_delivered(),
            vec!["Hi there. How can I help?".to_string()]
        );
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn model_failure_aborts_the_turn_without_playback() {
        // No play expectation: any playback call fails the test.
        let transport = MockVoiceTransport::new();

        let script = SynthScript::new(vec![]);
        let stopped = Arc::clone(&script.stopped);
        let flushed = Arc::clone(&script.flushed);

        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::new(vec![script])),
            Box::new(ScriptedModel::failing()),
        );

        session.begin_turn("hello".to_string()).await;
        session.await_active_turn().await;

        assert!(stopped.load(Ordering::SeqCst));
        assert!(!flushed.load(Ordering::SeqCst));
        assert!(session.nudges_delivered().is_empty());
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn synthesis_open_failure_aborts_the_turn() {
        let transport = MockVoiceTransport::new();
        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::empty()),
            Box::new(ScriptedModel::new(vec!["Hi."], "Hi.")),
        );

        session.begin_turn("hello".to_string()).await;
        session.await_active_turn().await;

        assert!(session.nudges_delivered().is_empty());
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn cancellation_before_streaming_stops_the_fresh_connector() {
        let transport = MockVoiceTransport::new();

        let script = SynthScript::new(vec![]);
        let stopped = Arc::clone(&script.stopped);
        let sentences = Arc::clone(&script.sentences);

        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::new(vec![script])),
            Box::new(ScriptedModel::new(vec!["Hi."], "Hi.")),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        run_turn(&session, "hello", &cancel).await;

        assert!(stopped.load(Ordering::SeqCst));
        assert!(sentences.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
        assert!(session.nudges_delivered().is_empty());
    }

    #[tokio::test]
    async fn zero_audio_chunks_skip_playback() {
        // Completion arrives with no audio: log and skip, no play call.
        let transport = MockVoiceTransport::new();

        let script = SynthScript::new(vec![SynthEvent::Done]);
        let flushed = Arc::clone(&script.flushed);

        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::new(vec![script])),
            Box::new(ScriptedModel::new(vec!["Quiet."], "Quiet.")),
        );

        session.begin_turn("hello".to_string()).await;
        session.await_active_turn().await;

        assert!(flushed.load(Ordering::SeqCst));
        assert_eq!(session.nudges_delivered(), vec!["Quiet.".to_string()]);
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn closed_without_done_still_plays_what_arrived() {
        let mut transport = MockVoiceTransport::new();
        transport
            .expect_play()
            .withf(|_, audio| audio.as_ref() == b"partial")
            .times(1)
            .returning(|_, _| Ok(()));

        let script = SynthScript::new(vec![
            SynthEvent::Audio(Bytes::from_static(b"partial")),
            SynthEvent::Closed,
        ]);

        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::new(vec![script])),
            Box::new(ScriptedModel::new(vec!["Hm."], "Hm.")),
        );

        session.begin_turn("hello".to_string()).await;
        session.await_active_turn().await;

        assert!(!session.is_processing());
    }
}
