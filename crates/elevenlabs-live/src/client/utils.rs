use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;
use crate::client::consts::API_KEY_HEADER;

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let url = format!(
        "{}/text-to-speech/{}/stream-input?model_id={}&output_format={}",
        config.base_url(),
        config.voice_id(),
        config.model_id(),
        config.output_format(),
    );
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        API_KEY_HEADER,
        config.api_key().expose_secret().parse()?,
    );
    Ok(request)
}
