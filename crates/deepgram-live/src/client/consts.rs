use std::time::Duration;

pub const DEEPGRAM_API_KEY: &str = "DEEPGRAM_API_KEY";

pub const BASE_URL: &str = "wss://api.deepgram.com/v1";
pub const DEFAULT_MODEL: &str = "nova-3";
pub const DEFAULT_LANGUAGE: &str = "en";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// How long a connect (or reconnect) attempt may take before it is abandoned.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Liveness ping cadence while the link is open.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub const KEEP_ALIVE_MESSAGE: &str = r#"{"type":"KeepAlive"}"#;
pub const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(2000);
