use std::time::Duration;

pub const ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const ELEVENLABS_VOICE_ID: &str = "ELEVENLABS_VOICE_ID";

pub const BASE_URL: &str = "wss://api.elevenlabs.io/v1";
pub const DEFAULT_MODEL: &str = "eleven_turbo_v2_5";

/// Raw PCM at the voice transport's playback rate.
pub const DEFAULT_OUTPUT_FORMAT: &str = "pcm_48000";

pub const API_KEY_HEADER: &str = "xi-api-key";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_STABILITY: f32 = 0.5;
pub const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;
