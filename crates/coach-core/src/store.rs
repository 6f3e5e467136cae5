//! Contract with the durable store that keeps session summaries.
//!
//! Persistence is best-effort: a failed save is logged by the caller and the
//! teardown proceeds regardless.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::llm::ChatMessage;

/// The summary string is capped so records stay bounded no matter how long
/// the conversation ran.
pub const SUMMARY_MAX_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SessionRecord {
    pub speaker_id: String,
    pub account_id: String,
    pub wallet_address: String,
    pub group_id: String,
    pub channel_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub nudges_delivered: Vec<String>,
    pub topics_discussed: Vec<String>,
    pub session_summary: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: SessionRecord) -> Result<()>;
}

/// Renders the conversation as `role: content` lines, truncated to
/// [`SUMMARY_MAX_CHARS`] characters.
pub fn render_summary(history: &[ChatMessage]) -> String {
    let rendered = history
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect::<Vec<_>>()
        .join("\n");
    if rendered.chars().count() <= SUMMARY_MAX_CHARS {
        rendered
    } else {
        rendered.chars().take(SUMMARY_MAX_CHARS).collect()
    }
}
