//! Configuration for the language-model side of the pipeline.
//!
//! The two audio connectors carry their own env-driven configs
//! (`deepgram_live::Config`, `elevenlabs_live::Config`); this module covers
//! the chat backend. A missing key is a connector start-time failure surfaced
//! as an error, never a panic.

use secrecy::SecretString;
use std::env;

pub const DEEPSEEK_API_KEY: &str = "DEEPSEEK_API_KEY";
pub const CHAT_MODEL: &str = "CHAT_MODEL";
pub const DEEPSEEK_BASE_URL: &str = "DEEPSEEK_BASE_URL";

pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
}

/// Chat-backend settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    deepseek_api_key: Option<SecretString>,
    chat_model: String,
    deepseek_base_url: String,
}

impl CoachConfig {
    /// Loads configuration from environment variables.
    ///
    // *   `DEEPSEEK_API_KEY`: Secret key for the chat backend. Checked when the
    //     first session builds its model, not at load time.
    // *   `CHAT_MODEL`: (Optional) Defaults to "deepseek-chat".
    // *   `DEEPSEEK_BASE_URL`: (Optional) OpenAI-compatible endpoint base.
    pub fn from_env() -> Self {
        // Load .env if present; ignored otherwise.
        dotenvy::dotenv().ok();

        let deepseek_api_key = env::var(DEEPSEEK_API_KEY)
            .ok()
            .filter(|key| !key.is_empty())
            .map(SecretString::from);
        let chat_model = env::var(CHAT_MODEL).unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let deepseek_base_url =
            env::var(DEEPSEEK_BASE_URL).unwrap_or_else(|_| DEFAULT_DEEPSEEK_BASE_URL.to_string());

        Self {
            deepseek_api_key,
            chat_model,
            deepseek_base_url,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.deepseek_api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    /// The chat API key, or a `ConfigError` if it was never provided.
    pub fn deepseek_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.deepseek_api_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVar(DEEPSEEK_API_KEY.to_string()))
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    pub fn deepseek_base_url(&self) -> &str {
        &self.deepseek_base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_an_error_not_a_panic() {
        let config = CoachConfig {
            deepseek_api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
        };
        assert!(matches!(
            config.deepseek_api_key(),
            Err(ConfigError::MissingVar(_))
        ));
    }

    #[test]
    fn with_api_key_overrides() {
        let config = CoachConfig {
            deepseek_api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
        }
        .with_api_key("sk-test");
        assert!(config.deepseek_api_key().is_ok());
    }
}
