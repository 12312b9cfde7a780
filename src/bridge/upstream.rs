//! # Upstream Session Negotiator
//!
//! Opens the WebSocket to the realtime transcription service and configures it
//! before any audio flows:
//! 1. picks the auth headers from the endpoint host (Azure `api-key` vs bearer token)
//! 2. connects with a capped message size
//! 3. sends `session.update` (server VAD, PCM16 input, transcription model/language, text only)
//! 4. sends `response.create` so transcription events start without a conversational turn

use super::error::BridgeError;
use super::protocol::{ResponseSettings, SessionSettings, UpstreamCommand};
use crate::config::UpstreamConfig;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// A connected, configured upstream socket.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const AZURE_HOST_SUFFIX: &str = ".openai.azure.com";

/// How the credential is presented to the upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Azure OpenAI: `api-key: <key>`.
    ApiKey,
    /// OpenAI: `Authorization: Bearer <key>` plus `OpenAI-Beta: realtime=v1`.
    BearerWithBeta,
}

impl AuthScheme {
    pub fn for_host(host: &str) -> Self {
        if host.to_ascii_lowercase().ends_with(AZURE_HOST_SUFFIX) {
            AuthScheme::ApiKey
        } else {
            AuthScheme::BearerWithBeta
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, BridgeError> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| BridgeError::Connect("credential is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Build the upgrade request with auth headers for `config.url`.
pub fn build_request(config: &UpstreamConfig, api_key: &str) -> Result<Request, BridgeError> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| BridgeError::Connect(e.to_string()))?;

    let scheme = AuthScheme::for_host(request.uri().host().unwrap_or_default());
    let headers = request.headers_mut();
    match scheme {
        AuthScheme::ApiKey => {
            headers.insert("api-key", header_value(api_key)?);
        }
        AuthScheme::BearerWithBeta => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
            headers.insert("openai-beta", HeaderValue::from_static("realtime=v1"));
        }
    }

    Ok(request)
}

/// Connect to upstream and bring the session to a transcription-ready state.
pub async fn negotiate(config: &UpstreamConfig) -> Result<UpstreamSocket, BridgeError> {
    let api_key = config.credential().ok_or(BridgeError::MissingCredential)?;
    let request = build_request(config, api_key)?;

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_bytes);
    ws_config.max_frame_size = Some(config.max_message_bytes);

    let (mut socket, response) = connect_async_with_config(request, Some(ws_config), false)
        .await
        .map_err(|e| BridgeError::Connect(e.to_string()))?;
    debug!(status = %response.status(), "Upstream websocket connected");

    let session_update = UpstreamCommand::SessionUpdate {
        session: SessionSettings::from_config(config),
    };
    socket
        .send(session_update.to_message()?)
        .await
        .map_err(|e| BridgeError::Handshake(e.to_string()))?;

    let kickoff = UpstreamCommand::ResponseCreate {
        response: ResponseSettings::transcription_only(&config.instructions),
    };
    if let Err(e) = socket.send(kickoff.to_message()?).await {
        warn!(error = %e, "Failed to request transcription response stream");
    }

    Ok(socket)
}
