use secrecy::SecretString;

use crate::client::consts;

/// Connection parameters for a live transcription session.
///
/// The audio format fields are fixed by the voice transport (48 kHz stereo
/// Opus) and are not configurable per session; they are carried here so the
/// request builder has a single source of truth.
#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
    language: String,
    encoding: String,
    sample_rate: u32,
    channels: u32,
    punctuate: bool,
    interim_results: bool,
    utterance_end_ms: u32,
    endpointing_ms: u32,
    smart_format: bool,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.config.language = language.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: consts::BASE_URL.to_string(),
            api_key: std::env::var(consts::DEEPGRAM_API_KEY)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            model: consts::DEFAULT_MODEL.to_string(),
            language: consts::DEFAULT_LANGUAGE.to_string(),
            encoding: "opus".to_string(),
            sample_rate: 48_000,
            channels: 2,
            punctuate: true,
            interim_results: true,
            utterance_end_ms: 1500,
            endpointing_ms: 500,
            smart_format: true,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn punctuate(&self) -> bool {
        self.punctuate
    }

    pub fn interim_results(&self) -> bool {
        self.interim_results
    }

    pub fn utterance_end_ms(&self) -> u32 {
        self.utterance_end_ms
    }

    pub fn endpointing_ms(&self) -> u32 {
        self.endpointing_ms
    }

    pub fn smart_format(&self) -> bool {
        self.smart_format
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
