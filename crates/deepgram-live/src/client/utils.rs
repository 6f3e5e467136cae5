use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;
use crate::client::consts::AUTHORIZATION_HEADER;

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let url = format!(
        "{}/listen?model={}&language={}&encoding={}&sample_rate={}&channels={}&punctuate={}&interim_results={}&utterance_end_ms={}&endpointing={}&smart_format={}",
        config.base_url(),
        config.model(),
        config.language(),
        config.encoding(),
        config.sample_rate(),
        config.channels(),
        config.punctuate(),
        config.interim_results(),
        config.utterance_end_ms(),
        config.endpointing_ms(),
        config.smart_format(),
    );
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION_HEADER,
        format!("Token {}", config.api_key().expose_secret())
            .as_str()
            .parse()?,
    );
    Ok(request)
}
