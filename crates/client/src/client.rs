//! WebSocket client for the push channel.
//!
//! [`PushClient`] holds the endpoint of the push channel. Call
//! [`PushClient::connect`] to establish a live [`PushConnection`]; the
//! session id travels as the `sid` query parameter of the handshake.

use reqwest::Url;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// The raw WebSocket stream type used by the push channel.
pub type PushStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the push-channel endpoint.
#[derive(Debug, Clone)]
pub struct PushClient {
    ws_url: String,
}

/// A live push-channel connection.
pub struct PushConnection {
    /// Session id sent during the handshake, if any.
    pub sid: Option<String>,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: PushStream,
}

impl PushClient {
    /// * `ws_url` - Endpoint URL, e.g. `ws://host:8000/api/ws`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Handshake address for `sid`: the endpoint with `?sid=` appended.
    pub fn channel_url(&self, sid: Option<&str>) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.ws_url).map_err(|e| {
            ClientError::Connection(format!("Invalid push endpoint {}: {e}", self.ws_url))
        })?;
        if let Some(sid) = sid {
            url.query_pairs_mut().append_pair("sid", sid);
        }
        Ok(url)
    }

    /// Connect to the push endpoint as `sid`.
    pub async fn connect(&self, sid: Option<String>) -> Result<PushConnection, ClientError> {
        let url = self.channel_url(sid.as_deref())?;

        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            ClientError::Connection(format!(
                "Failed to connect to push channel at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            has_session = sid.is_some(),
            "Connected to push channel at {}",
            self.ws_url,
        );

        Ok(PushConnection { sid, ws_stream })
    }
}

/// Errors that can occur when working with the push channel.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
