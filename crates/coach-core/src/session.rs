//! Session state and the process-wide registry.
//!
//! One [`CoachingSession`] exists per active speaker. It owns the
//! transcription stream and the conversational model for its whole life,
//! while each turn owns its own synthesis stream. Barge-in is cooperative: a
//! new final utterance cancels the in-flight turn's token, stops playback,
//! and waits for the turn to release its connector before the next one
//! starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connectors::{ModelFactory, SpeechToText, SttFactory, SynthFactory, TranscriptEvent};
use crate::llm::{CoachModel, GREETING_PROMPT};
use crate::store::{SessionRecord, SessionStore, render_summary};
use crate::transport::{SpeakerEvent, VoiceTransport};
use crate::turn;

/// Identity of the speaker a session is created for.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub speaker_id: String,
    pub account_id: String,
    pub wallet_address: String,
    pub group_id: String,
    pub channel_id: String,
    pub token_address: Option<String>,
}

/// Out-of-band conditions the command layer should relay to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Transcription reconnects are exhausted; the session can no longer
    /// hear the speaker.
    TranscriptionUnavailable,
}

/// The in-flight turn: its cancellation token and the handle the next turn
/// awaits before starting.
pub(crate) struct ActiveTurn {
    pub(crate) cancel: CancellationToken,
    pub(crate) done: JoinHandle<()>,
}

/// Aggregate state for one active speaker.
pub struct CoachingSession {
    speaker_id: String,
    account_id: String,
    wallet_address: String,
    group_id: String,
    channel_id: String,
    started_at: DateTime<Utc>,
    transport: Arc<dyn VoiceTransport>,
    synth_factory: Arc<dyn SynthFactory>,
    llm: tokio::sync::Mutex<Box<dyn CoachModel>>,
    stt: Box<dyn SpeechToText>,
    turn: tokio::sync::Mutex<Option<ActiveTurn>>,
    is_processing: AtomicBool,
    transcription_down: AtomicBool,
    closing: AtomicBool,
    utterance_buffer: std::sync::Mutex<String>,
    topics_discussed: std::sync::Mutex<Vec<String>>,
    nudges_delivered: std::sync::Mutex<Vec<String>>,
    notices: mpsc::Sender<SessionNotice>,
}

impl CoachingSession {
    pub fn speaker_id(&self) -> &str {
        &self.speaker_id
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True while a turn is in flight. At most one turn runs per session.
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    pub fn transcription_unavailable(&self) -> bool {
        self.transcription_down.load(Ordering::SeqCst)
    }

    /// Every finalized user utterance, in order.
    pub fn topics_discussed(&self) -> Vec<String> {
        self.topics_discussed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Every completed assistant response, in order.
    pub fn nudges_delivered(&self) -> Vec<String> {
        self.nudges_delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn transport(&self) -> &Arc<dyn VoiceTransport> {
        &self.transport
    }

    pub(crate) fn synth_factory(&self) -> &Arc<dyn SynthFactory> {
        &self.synth_factory
    }

    pub(crate) fn llm(&self) -> &tokio::sync::Mutex<Box<dyn CoachModel>> {
        &self.llm
    }

    pub(crate) fn push_nudge(&self, text: String) {
        self.nudges_delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text);
    }

    pub(crate) async fn forward_audio(&self, frame: Bytes) {
        self.stt.send_audio(frame).await;
    }

    /// Handles one transcript event from the transcription stream.
    ///
    /// Interim hypotheses overwrite the utterance buffer (latest wins, never
    /// queued). A final transcript takes the provider text or falls back to
    /// the buffer, and schedules a turn unless it is empty after trimming.
    pub(crate) async fn handle_transcript(self: &Arc<Self>, text: String, is_final: bool) {
        if !is_final {
            *self
                .utterance_buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = text;
            return;
        }

        let buffered = std::mem::take(
            &mut *self
                .utterance_buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        let final_text = if text.trim().is_empty() { buffered } else { text };
        let final_text = final_text.trim().to_string();
        if final_text.is_empty() {
            return;
        }

        info!(speaker = %self.speaker_id, "user said: {:?}", final_text);
        self.topics_discussed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(final_text.clone());
        self.begin_turn(final_text).await;
    }

    /// Schedules a turn for `text`, interrupting any turn already in flight.
    pub(crate) async fn begin_turn(self: &Arc<Self>, text: String) {
        let mut slot = self.turn.lock().await;
        if let Some(active) = slot.take() {
            if !active.done.is_finished() {
                info!(speaker = %self.speaker_id, "barge-in, interrupting current response");
                active.cancel.cancel();
                self.transport.stop_playback(&self.group_id).await;
                // Wait for the cancelled turn to release its synthesis
                // stream; no prior-turn audio can play past this point.
                if let Err(e) = active.done.await {
                    error!("interrupted turn panicked: {}", e);
                }
            }
        }
        *slot = Some(self.spawn_turn(text));
    }

    fn spawn_turn(self: &Arc<Self>, text: String) -> ActiveTurn {
        let cancel = CancellationToken::new();
        self.is_processing.store(true, Ordering::SeqCst);
        let session = Arc::clone(self);
        let token = cancel.clone();
        let done = tokio::spawn(async move {
            turn::run_turn(&session, &text, &token).await;
            session.is_processing.store(false, Ordering::SeqCst);
        });
        ActiveTurn { cancel, done }
    }

    pub(crate) async fn mark_transcription_unavailable(&self) {
        self.transcription_down.store(true, Ordering::SeqCst);
        warn!(speaker = %self.speaker_id, "transcription is permanently unavailable");
        if self
            .notices
            .send(SessionNotice::TranscriptionUnavailable)
            .await
            .is_err()
        {
            debug!("notice receiver dropped");
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub(crate) async fn record(&self, ended_at: DateTime<Utc>) -> SessionRecord {
        let history = self.llm.lock().await.history();
        SessionRecord {
            speaker_id: self.speaker_id.clone(),
            account_id: self.account_id.clone(),
            wallet_address: self.wallet_address.clone(),
            group_id: self.group_id.clone(),
            channel_id: self.channel_id.clone(),
            started_at: self.started_at,
            ended_at,
            nudges_delivered: self.nudges_delivered(),
            topics_discussed: self.topics_discussed(),
            session_summary: render_summary(&history),
        }
    }

    /// Waits for the current turn, if any, to finish. Test-only.
    #[cfg(test)]
    pub(crate) async fn await_active_turn(&self) {
        let mut slot = self.turn.lock().await;
        if let Some(active) = slot.take() {
            let _ = active.done.await;
        }
    }
}

/// Process-wide mapping from speaker identity to session.
///
/// An explicit object rather than a global: created at process start, drained
/// via [`SessionRegistry::shutdown`] at teardown.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CoachingSession>>,
    transport: Arc<dyn VoiceTransport>,
    store: Arc<dyn SessionStore>,
    stt_factory: Arc<dyn SttFactory>,
    synth_factory: Arc<dyn SynthFactory>,
    model_factory: Arc<dyn ModelFactory>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        store: Arc<dyn SessionStore>,
        stt_factory: Arc<dyn SttFactory>,
        synth_factory: Arc<dyn SynthFactory>,
        model_factory: Arc<dyn ModelFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            transport,
            store,
            stt_factory,
            synth_factory,
            model_factory,
        })
    }

    /// Creates a session for the speaker and wires the full pipeline:
    /// transport audio -> transcription -> model -> synthesis -> playback.
    ///
    /// Returns the notice channel for out-of-band conditions. The opening
    /// greeting is scheduled like any other turn; if it fails the session
    /// stays usable.
    pub async fn start_session(
        self: &Arc<Self>,
        params: SessionParams,
    ) -> Result<mpsc::Receiver<SessionNotice>> {
        if self.sessions.contains_key(&params.speaker_id) {
            anyhow::bail!("session already active for {}", params.speaker_id);
        }
        info!(
            speaker = %params.speaker_id,
            wallet = %params.wallet_address,
            "starting coaching session"
        );

        let llm = self
            .model_factory
            .build(&params)
            .context("failed to build the coaching model")?;
        let (stt, stt_events) = self
            .stt_factory
            .open()
            .await
            .context("failed to start transcription")?;
        let frames = match self.transport.subscribe(&params.speaker_id).await {
            Ok(frames) => frames,
            Err(e) => {
                // Don't leak the freshly opened transcription stream.
                stt.stop().await;
                return Err(e).context("failed to subscribe to speaker audio");
            }
        };
        let (notices, notice_rx) = mpsc::channel(8);

        let session = Arc::new(CoachingSession {
            speaker_id: params.speaker_id.clone(),
            account_id: params.account_id,
            wallet_address: params.wallet_address,
            group_id: params.group_id,
            channel_id: params.channel_id,
            started_at: Utc::now(),
            transport: Arc::clone(&self.transport),
            synth_factory: Arc::clone(&self.synth_factory),
            llm: tokio::sync::Mutex::new(llm),
            stt,
            turn: tokio::sync::Mutex::new(None),
            is_processing: AtomicBool::new(false),
            transcription_down: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            utterance_buffer: std::sync::Mutex::new(String::new()),
            topics_discussed: std::sync::Mutex::new(Vec::new()),
            nudges_delivered: std::sync::Mutex::new(Vec::new()),
            notices,
        });
        self.sessions
            .insert(params.speaker_id.clone(), Arc::clone(&session));

        tokio::spawn(transcript_pump(Arc::clone(&session), stt_events));
        tokio::spawn(audio_pump(Arc::clone(self), Arc::clone(&session), frames));

        session.begin_turn(GREETING_PROMPT.to_string()).await;

        Ok(notice_rx)
    }

    /// Graceful end: tears the pipeline down and persists the summary.
    pub async fn end_session(&self, speaker_id: &str) {
        let Some(session) = self
            .sessions
            .get(speaker_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        self.teardown(&session, true).await;
    }

    /// Unexpected-disconnect cleanup: same teardown, nothing persisted.
    pub async fn cleanup_session(&self, speaker_id: &str) {
        let Some(session) = self
            .sessions
            .get(speaker_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return;
        };
        self.teardown(&session, false).await;
    }

    /// Stops all connectors and releases the transport before the session
    /// leaves the registry, so no stream or callback outlives it.
    async fn teardown(&self, session: &Arc<CoachingSession>, persist: bool) {
        if session.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut slot = session.turn.lock().await;
            if let Some(active) = slot.take() {
                active.cancel.cancel();
                self.transport.stop_playback(session.group_id()).await;
                if let Err(e) = active.done.await {
                    error!("turn task panicked during teardown: {}", e);
                }
            }
        }

        session.stt.stop().await;
        self.transport.unsubscribe(session.speaker_id()).await;
        self.transport.destroy_player(session.group_id()).await;

        if persist {
            let record = session.record(Utc::now()).await;
            if let Err(e) = self.store.save(record).await {
                // Best-effort: a failed save must not break teardown.
                error!("failed to save session record: {:#}", e);
            }
        }

        self.sessions.remove(session.speaker_id());
        info!(speaker = %session.speaker_id(), "session closed");
    }

    pub fn has_session(&self, speaker_id: &str) -> bool {
        self.sessions.contains_key(speaker_id)
    }

    pub fn session(&self, speaker_id: &str) -> Option<Arc<CoachingSession>> {
        self.sessions
            .get(speaker_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Drains every active session. Called once at process teardown.
    pub async fn shutdown(&self) {
        let speakers: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for speaker in speakers {
            self.end_session(&speaker).await;
        }
    }
}

async fn transcript_pump(
    session: Arc<CoachingSession>,
    mut events: mpsc::Receiver<TranscriptEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TranscriptEvent::Transcript { text, is_final } => {
                session.handle_transcript(text, is_final).await;
            }
            TranscriptEvent::Closed => {
                debug!(speaker = %session.speaker_id(), "transcription link dropped");
            }
            TranscriptEvent::Unavailable => {
                session.mark_transcription_unavailable().await;
            }
        }
    }
    debug!(speaker = %session.speaker_id(), "transcript feed ended");
}

async fn audio_pump(
    registry: Arc<SessionRegistry>,
    session: Arc<CoachingSession>,
    mut frames: mpsc::Receiver<SpeakerEvent>,
) {
    while let Some(event) = frames.recv().await {
        match event {
            SpeakerEvent::Frame(frame) => session.forward_audio(frame).await,
            SpeakerEvent::Silence => {
                debug!(speaker = %session.speaker_id(), "speaker stopped talking");
            }
        }
    }
    // The transport dropped the feed underneath us: unexpected disconnect.
    if !session.is_closing() {
        info!(speaker = %session.speaker_id(), "audio feed closed, cleaning up session");
        registry.cleanup_session(session.speaker_id()).await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::connectors::{MockModelFactory, MockSttFactory, SynthEvent};
    use crate::llm::ChatMessage;
    use crate::store::MockSessionStore;
    use crate::transport::MockVoiceTransport;

    fn quiet_transport() -> MockVoiceTransport {
        let mut transport = MockVoiceTransport::new();
        transport.expect_stop_playback().returning(|_| ());
        transport
    }

    #[tokio::test]
    async fn interim_transcripts_overwrite_the_buffer() {
        let (session, _notices) = session_with(
            Arc::new(quiet_transport()),
            Arc::new(ScriptedSynthFactory::empty()),
            Box::new(ScriptedModel::new(vec![], "")),
        );

        session.handle_transcript("hel".to_string(), false).await;
        session.handle_transcript("hello".to_string(), false).await;
        session.handle_transcript("hello wor".to_string(), false).await;
        // Final event with no transcript of its own falls back to the most
        // recent interim, never an older one.
        session.handle_transcript(String::new(), true).await;
        session.await_active_turn().await;

        assert_eq!(session.topics_discussed(), vec!["hello wor".to_string()]);
    }

    #[tokio::test]
    async fn empty_final_transcript_is_discarded() {
        let (session, _notices) = session_with(
            Arc::new(quiet_transport()),
            Arc::new(ScriptedSynthFactory::empty()),
            Box::new(ScriptedModel::new(vec![], "")),
        );

        session.handle_transcript("   ".to_string(), true).await;

        assert!(session.topics_discussed().is_empty());
        assert!(!session.is_processing());
        assert!(session.turn.lock().await.is_none());
    }

    #[tokio::test]
    async fn final_transcript_prefers_provider_text_over_buffer() {
        let (session, _notices) = session_with(
            Arc::new(quiet_transport()),
            Arc::new(ScriptedSynthFactory::empty()),
            Box::new(ScriptedModel::new(vec![], "")),
        );

        session.handle_transcript("partial guess".to_string(), false).await;
        session.handle_transcript("full sentence".to_string(), true).await;
        session.await_active_turn().await;

        assert_eq!(session.topics_discussed(), vec!["full sentence".to_string()]);
        // The buffer was cleared on finalization.
        session.handle_transcript(String::new(), true).await;
        assert_eq!(session.topics_discussed().len(), 1);
    }

    #[tokio::test]
    async fn barge_in_cancels_the_old_turn_and_starts_one_new_turn() {
        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());

        let mut transport = MockVoiceTransport::new();
        // Barge-in must stop playback exactly once.
        transport
            .expect_stop_playback()
            .times(1)
            .returning(|_| ());
        // Only the new turn's audio may play.
        transport
            .expect_play()
            .withf(|group, audio| group == "group-1" && audio.as_ref() == b"wait-audio")
            .times(1)
            .returning(|_, _| Ok(()));

        let first = SynthScript::new(vec![]);
        let first_stopped = Arc::clone(&first.stopped);
        let second = SynthScript::new(vec![
            SynthEvent::Audio(Bytes::from_static(b"wait-audio")),
            SynthEvent::Done,
        ]);
        let second_sentences = Arc::clone(&second.sentences);

        let (session, _notices) = session_with(
            Arc::new(transport),
            Arc::new(ScriptedSynthFactory::new(vec![first, second])),
            Box::new(ScriptedModel::gated(
                Arc::clone(&started),
                Arc::clone(&release),
            )),
        );

        // First turn parks in LLM-streaming.
        session.begin_turn("tell me everything".to_string()).await;
        started.notified().await;
        assert!(session.is_processing());

        // The speaker talks over the response.
        session.handle_transcript("wait".to_string(), true).await;
        session.await_active_turn().await;

        // The old turn released its synthesis stream before the new one ran.
        assert!(first_stopped.load(Ordering::SeqCst));
        assert_eq!(session.topics_discussed(), vec!["wait".to_string()]);
        assert_eq!(session.nudges_delivered(), vec!["Okay.".to_string()]);
        assert_eq!(
            second_sentences
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            vec!["Okay.".to_string()]
        );
        assert!(!session.is_processing());
    }

    #[tokio::test]
    async fn transcription_unavailable_reaches_the_notice_channel() {
        let (session, mut notices) = session_with(
            Arc::new(quiet_transport()),
            Arc::new(ScriptedSynthFactory::empty()),
            Box::new(ScriptedModel::new(vec![], "")),
        );

        session.mark_transcription_unavailable().await;

        assert!(session.transcription_unavailable());
        assert_eq!(
            notices.recv().await,
            Some(SessionNotice::TranscriptionUnavailable)
        );
    }

    fn registry_with(
        transport: MockVoiceTransport,
        store: MockSessionStore,
        seeded_history: Vec<ChatMessage>,
    ) -> Arc<SessionRegistry> {
        let mut stt_factory = MockSttFactory::new();
        stt_factory.expect_open().returning(|| {
            let (_tx, rx) = mpsc::channel(8);
            Ok((Box::new(NoopStt) as Box<dyn SpeechToText>, rx))
        });

        let mut model_factory = MockModelFactory::new();
        model_factory.expect_build().returning(move |_| {
            let mut model = ScriptedModel::new(vec![], "");
            model.history = seeded_history.clone();
            Ok(Box::new(model) as Box<dyn CoachModel>)
        });

        SessionRegistry::new(
            Arc::new(transport),
            Arc::new(store),
            Arc::new(stt_factory),
            // No synth scripts: the greeting turn aborts cleanly and the
            // session stays usable.
            Arc::new(ScriptedSynthFactory::empty()),
            Arc::new(model_factory),
        )
    }

    fn params() -> SessionParams {
        SessionParams {
            speaker_id: "speaker-1".to_string(),
            account_id: "account-1".to_string(),
            wallet_address: "0xabc".to_string(),
            group_id: "group-1".to_string(),
            channel_id: "channel-1".to_string(),
            token_address: None,
        }
    }

    #[tokio::test]
    async fn start_session_registers_and_rejects_duplicates() {
        let mut transport = MockVoiceTransport::new();
        let (_frames_tx, frames_rx) = mpsc::channel(8);
        transport
            .expect_subscribe()
            .times(1)
            .return_once(move |_| Ok(frames_rx));
        transport.expect_stop_playback().returning(|_| ());

        let registry = registry_with(transport, MockSessionStore::new(), Vec::new());
        registry.start_session(params()).await.unwrap();
        assert!(registry.has_session("speaker-1"));
        assert_eq!(registry.active_sessions(), 1);

        let err = registry.start_session(params()).await.err().unwrap();
        assert!(err.to_string().contains("already active"));
    }

    #[tokio::test]
    async fn end_session_persists_the_summary_and_releases_everything() {
        let mut transport = MockVoiceTransport::new();
        let (_frames_tx, frames_rx) = mpsc::channel(8);
        transport
            .expect_subscribe()
            .times(1)
            .return_once(move |_| Ok(frames_rx));
        transport.expect_stop_playback().returning(|_| ());
        transport
            .expect_unsubscribe()
            .withf(|speaker| speaker == "speaker-1")
            .times(1)
            .returning(|_| ());
        transport
            .expect_destroy_player()
            .withf(|group| group == "group-1")
            .times(1)
            .returning(|_| ());

        let history = vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("Hi there."),
            ChatMessage::user("thanks"),
            ChatMessage::assistant("Any time."),
            ChatMessage::user("bye"),
            ChatMessage::assistant("Good luck out there."),
        ];
        let expected_summary = render_summary(&history);

        let mut store = MockSessionStore::new();
        store
            .expect_save()
            .withf(move |record| {
                record.speaker_id == "speaker-1"
                    && record.account_id == "account-1"
                    && record.session_summary == expected_summary
                    && record.ended_at >= record.started_at
            })
            .times(1)
            .returning(|_| Ok(()));

        let registry = registry_with(transport, store, history);
        registry.start_session(params()).await.unwrap();

        registry.end_session("speaker-1").await;
        assert!(!registry.has_session("speaker-1"));

        // A second end is a no-op; the save expectation above stays at one.
        registry.end_session("speaker-1").await;
    }

    #[tokio::test]
    async fn failed_save_does_not_block_teardown() {
        let mut transport = MockVoiceTransport::new();
        let (_frames_tx, frames_rx) = mpsc::channel(8);
        transport
            .expect_subscribe()
            .times(1)
            .return_once(move |_| Ok(frames_rx));
        transport.expect_stop_playback().returning(|_| ());
        transport.expect_unsubscribe().returning(|_| ());
        transport.expect_destroy_player().returning(|_| ());

        let mut store = MockSessionStore::new();
        store
            .expect_save()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("database offline")));

        let registry = registry_with(transport, store, Vec::new());
        registry.start_session(params()).await.unwrap();

        registry.end_session("speaker-1").await;
        assert!(!registry.has_session("speaker-1"));
    }

    #[tokio::test]
    async fn dropped_audio_feed_triggers_cleanup_without_persisting() {
        let mut transport = MockVoiceTransport::new();
        let (frames_tx, frames_rx) = mpsc::channel(8);
        transport
            .expect_subscribe()
            .times(1)
            .return_once(move |_| Ok(frames_rx));
        transport.expect_stop_playback().returning(|_| ());
        transport.expect_unsubscribe().times(1).returning(|_| ());
        transport.expect_destroy_player().times(1).returning(|_| ());

        // No save expectation: cleanup must not persist anything.
        let registry = registry_with(transport, MockSessionStore::new(), Vec::new());
        registry.start_session(params()).await.unwrap();
        assert!(registry.has_session("speaker-1"));

        // Transport disconnect: the frame feed closes.
        drop(frames_tx);
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while registry.has_session("speaker-1") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("session should be cleaned up after the feed closed");
    }

    #[tokio::test]
    async fn shutdown_drains_every_session() {
        let mut transport = MockVoiceTransport::new();
        let (_frames_tx, frames_rx) = mpsc::channel(8);
        transport
            .expect_subscribe()
            .times(1)
            .return_once(move |_| Ok(frames_rx));
        transport.expect_stop_playback().returning(|_| ());
        transport.expect_unsubscribe().returning(|_| ());
        transport.expect_destroy_player().returning(|_| ());

        let mut store = MockSessionStore::new();
        store.expect_save().times(1).returning(|_| Ok(()));

        let registry = registry_with(transport, store, Vec::new());
        registry.start_session(params()).await.unwrap();

        registry.shutdown().await;
        assert_eq!(registry.active_sessions(), 0);
    }
}
