//! Streaming language-model connector.
//!
//! One streaming generation request per turn, seeded with the session's full
//! rolling conversation history. Incremental token groups are forwarded over a
//! channel in arrival order and the full response is returned once the stream
//! ends. Errors propagate to the caller; turn-level recovery is the
//! orchestrator's job, not this module's.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;

use crate::config::CoachConfig;
use crate::session::SessionParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Accumulated token usage across a session's turns.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    total_tokens: i64,
    prompt_tokens: i64,
    completion_tokens: i64,
}

impl Stats {
    pub(crate) fn update_usage(&mut self, total: i64, prompt: i64, completion: i64) {
        self.total_tokens += total;
        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
    }

    pub fn total_tokens(&self) -> i64 {
        self.total_tokens
    }

    pub fn prompt_tokens(&self) -> i64 {
        self.prompt_tokens
    }

    pub fn completion_tokens(&self) -> i64 {
        self.completion_tokens
    }
}

/// The conversational model behind a coaching session.
///
/// Abstracting the provider keeps the turn orchestrator independent of the
/// chat backend and lets tests drive it with a mock instead of the network.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoachModel: Send + Sync {
    /// Streams one response to `prompt`. Token groups are sent on `chunks` in
    /// arrival order; the full text is returned exactly once on success.
    /// On success both the prompt and the response join the rolling history.
    async fn respond(&mut self, prompt: &str, chunks: mpsc::Sender<String>) -> Result<String>;

    /// The ordered role-tagged conversation so far, for end-of-session
    /// summarization.
    fn history(&self) -> Vec<ChatMessage>;
}

/// Prompt used for the opening turn of a session, before the speaker has said
/// anything.
pub const GREETING_PROMPT: &str = "The user just joined the coaching session. \
    Give a brief, warm greeting and reference one interesting pattern from \
    their wallet data.";

/// Persona for the coaching model, seeded with the speaker's wallet context.
pub fn coaching_system_prompt(wallet_address: &str, token_address: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a friendly, sharp trading coach speaking with a user over \
         voice. Their wallet address is {wallet_address}. Keep every answer \
         short and conversational -- two or three spoken sentences. Nudge \
         them toward disciplined habits and reference their own activity \
         where it helps."
    );
    if let Some(token) = token_address {
        prompt.push_str(&format!(
            " The session is focused on the token at {token}."
        ));
    }
    prompt
}

// --- OpenAI-compatible streaming wire types ---

#[derive(serde::Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
}

#[derive(Debug, serde::Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, serde::Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

/// Extracts the JSON payload from one SSE line, skipping non-data lines and
/// the terminal `[DONE]` marker.
fn sse_data(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Streaming chat client for DeepSeek's OpenAI-compatible API.
pub struct DeepSeekCoach {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    history: Vec<ChatMessage>,
    stats: Stats,
}

impl DeepSeekCoach {
    pub fn new(api_key: SecretString, model: String, system_prompt: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: crate::config::DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            api_key,
            model,
            history: vec![ChatMessage::system(system_prompt)],
            stats: Stats::default(),
        }
    }

    /// Builds a session model from config, failing if the key is absent.
    pub fn from_config(config: &CoachConfig, params: &SessionParams) -> Result<Self> {
        let api_key = config.deepseek_api_key()?.clone();
        let system_prompt =
            coaching_system_prompt(&params.wallet_address, params.token_address.as_deref());
        Ok(Self::new(api_key, config.chat_model().to_string(), system_prompt)
            .with_base_url(config.deepseek_base_url()))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

#[async_trait]
impl CoachModel for DeepSeekCoach {
    async fn respond(&mut self, prompt: &str, chunks: mpsc::Sender<String>) -> Result<String> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(prompt));

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: true,
            temperature: 0.7,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion request rejected")?;

        let mut stream = response.bytes_stream();
        let mut pending = String::new();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("chat completion stream failed")?;
            pending.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                let Some(data) = sse_data(&line) else {
                    continue;
                };
                match serde_json::from_str::<ChatCompletionChunk>(data) {
                    Ok(parsed) => {
                        if let Some(usage) = parsed.usage {
                            self.stats.update_usage(
                                usage.total_tokens,
                                usage.prompt_tokens,
                                usage.completion_tokens,
                            );
                        }
                        let Some(choice) = parsed.choices.first() else {
                            continue;
                        };
                        if let Some(content) = choice.delta.content.as_deref() {
                            full.push_str(content);
                            if chunks.send(content.to_string()).await.is_err() {
                                tracing::debug!("chunk receiver dropped, still accumulating");
                            }
                        }
                        if let Some(reason) = choice.finish_reason.as_deref() {
                            tracing::debug!("generation finished: {}", reason);
                        }
                    }
                    Err(e) => {
                        // One malformed chunk must not kill the stream.
                        tracing::error!("failed to parse stream chunk: {}, data=> {:?}", e, data);
                    }
                }
            }
        }

        self.history.push(ChatMessage::user(prompt));
        self.history.push(ChatMessage::assistant(full.clone()));
        tracing::debug!(
            "model response complete ({} chars, {} total tokens)",
            full.len(),
            self.stats.total_tokens()
        );
        Ok(full)
    }

    fn history(&self) -> Vec<ChatMessage> {
        self.history.clone()
    }
}
