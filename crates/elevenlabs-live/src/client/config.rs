use secrecy::SecretString;

use crate::client::consts;
use crate::types::VoiceSettings;

#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    api_key: SecretString,
    voice_id: String,
    model_id: String,
    output_format: String,
    stability: f32,
    similarity_boost: f32,
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

    pub fn with_voice_id(mut self, voice_id: &str) -> Self {
        self.config.voice_id = voice_id.to_string();
        self
    }

    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.config.model_id = model_id.to_string();
        self
    }

    pub fn with_output_format(mut self, output_format: &str) -> Self {
        self.config.output_format = output_format.to_string();
        self
    }

    pub fn with_voice_settings(mut self, stability: f32, similarity_boost: f32) -> Self {
        self.config.stability = stability;
        self.config.similarity_boost = similarity_boost;
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
            api_key: std::env::var(consts::ELEVENLABS_API_KEY)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            voice_id: std::env::var(consts::ELEVENLABS_VOICE_ID).unwrap_or_else(|_| "".to_string()),
            model_id: consts::DEFAULT_MODEL.to_string(),
            output_format: consts::DEFAULT_OUTPUT_FORMAT.to_string(),
            stability: consts::DEFAULT_STABILITY,
            similarity_boost: consts::DEFAULT_SIMILARITY_BOOST,
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

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            stability: self.stability,
            similarity_boost: self.similarity_boost,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
