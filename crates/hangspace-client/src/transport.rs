//! WebSocket channel and HTTP API transport.
//!
//! Thin I/O layers only: frames in and out of a socket, requests in and
//! JSON bodies out. Reconnect policy, acknowledgements and everything else
//! stay in the Sans-IO [`Client`](crate::Client).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hangspace_core::{DropReason, RequestError};
use hangspace_proto::{ApiRequest, Frame, Method};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::event::ClientEvent;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Socket error after connecting.
    #[error("socket error: {0}")]
    Socket(String),

    /// The HTTP client could not be built.
    #[error("http client setup failed: {0}")]
    Http(String),
}

/// Upper bound on one API request, connect to last body byte.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Something the socket task observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A decoded frame arrived.
    Frame(Frame),
    /// The socket closed.
    Closed(DropReason),
}

impl SocketEvent {
    /// Convert into the client event the state machine expects.
    pub fn into_client_event<I>(self) -> ClientEvent<I> {
        match self {
            Self::Frame(frame) => ClientEvent::FrameReceived(frame),
            Self::Closed(reason) => ClientEvent::ChannelDropped(reason),
        }
    }
}

/// Handle to an open WebSocket.
///
/// Frames are sent and received through the channels; an internal task does
/// the socket I/O.
pub struct ConnectedChannel {
    /// Send frames to the server.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames and close notifications from the server.
    pub from_server: mpsc::Receiver<SocketEvent>,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedChannel {
    /// Stop the socket task.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Open the event channel at `url`.
///
/// # Errors
///
/// - `TransportError::Connection` if the handshake fails
pub async fn connect(url: &str) -> Result<ConnectedChannel, TransportError> {
    let (socket, _) =
        connect_async(url).await.map_err(|e| TransportError::Connection(e.to_string()))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(64);
    let (from_server_tx, from_server_rx) = mpsc::channel::<SocketEvent>(64);

    let handle = tokio::spawn(run_socket(socket, to_server_rx, from_server_tx));

    Ok(ConnectedChannel {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_socket(
    socket: Socket,
    mut to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<SocketEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    let reason = loop {
        tokio::select! {
            outgoing = to_server.recv() => {
                let Some(frame) = outgoing else {
                    let _ = sink.close().await;
                    return;
                };
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(event = %frame.event, %err, "dropping unencodable frame");
                        continue;
                    },
                };
                if let Err(err) = sink.send(Message::Text(text)).await {
                    break DropReason::Network(err.to_string());
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match Frame::decode(&text) {
                    Ok(frame) => {
                        if from_server.send(SocketEvent::Frame(frame)).await.is_err() {
                            return;
                        }
                    },
                    Err(err) => tracing::warn!(%err, "dropping undecodable frame"),
                },
                Some(Ok(Message::Close(_))) => break DropReason::ServerInitiated,
                Some(Ok(_)) => {},
                Some(Err(err)) => break DropReason::Network(err.to_string()),
                None => break DropReason::Network("stream ended".to_string()),
            },
        }
    };

    tracing::info!(?reason, "socket closed");
    let _ = from_server.send(SocketEvent::Closed(reason)).await;
}

/// REST client for the notification, search, friend and chat endpoints.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    /// Client for the API rooted at `base_url` whose requests fail with
    /// `RequestError::Network` after `timeout`.
    ///
    /// # Errors
    ///
    /// `TransportError::Http` if the TLS backend cannot be initialised.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { client, base_url: base_url.into(), token: None })
    }

    /// Authenticate requests with a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Execute a request and return its JSON body.
    ///
    /// An empty body decodes as `Value::Null`.
    ///
    /// # Errors
    ///
    /// - `RequestError::Network` if the request never completed
    /// - `RequestError::Status` for non-2xx responses
    /// - `RequestError::Decode` if the body is not JSON
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, RequestError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), request.path());
        tracing::debug!(method = ?request.method(), %url, "api request");

        let mut builder = match request.method() {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| RequestError::Network(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| RequestError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(RequestError::Status { code: status.as_u16(), message: error_text(&text) });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RequestError::Decode(e.to_string()))
    }
}

/// Pull `error` or `message` out of a JSON error body, else the raw text.
fn error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_prefers_json_fields() {
        assert_eq!(error_text(r#"{"error":"nope"}"#), "nope");
        assert_eq!(error_text(r#"{"message":"gone"}"#), "gone");
        assert_eq!(error_text(" plain "), "plain");
    }

    #[test]
    fn close_maps_to_dropped_event() {
        let event: ClientEvent<std::time::Instant> =
            SocketEvent::Closed(DropReason::ServerInitiated).into_client_event();
        assert!(matches!(event, ClientEvent::ChannelDropped(DropReason::ServerInitiated)));
    }
}
