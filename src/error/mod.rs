use std::fmt;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

pub type ObsResult<T> = Result<T, ObsError>;

#[derive(Debug)]
pub enum ObsError {
    /// Inbound text (or a reply field) did not have the expected shape.
    MalformedMessage(String),
    /// A send was attempted while no connection is open.
    TransportUnavailable,
    /// A privileged command was attempted before the session reached `Ready`.
    NotAuthenticated,
    TimedOut {
        message_id: String,
        after: Duration,
    },
    /// The connection closed while the request was pending.
    ConnectionLost,
    /// The peer answered with `status: "error"`.
    Protocol {
        request_type: String,
        message: String,
    },
    UnknownCorrelationId(String),
    AuthenticationFailed(String),
    AlreadyConnected,
    /// Client options were rejected before any connection was attempted.
    InvalidConfig(String),
    Connect(String),
    WebSocket(tungstenite::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ObsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage(msg) => write!(f, "malformed message: {msg}"),
            Self::TransportUnavailable => write!(f, "transport unavailable: not connected"),
            Self::NotAuthenticated => write!(f, "not authenticated"),
            Self::TimedOut { message_id, after } => write!(
                f,
                "request {message_id} timed out after {} ms",
                after.as_millis()
            ),
            Self::ConnectionLost => write!(f, "connection lost while request was pending"),
            Self::Protocol {
                request_type,
                message,
            } => write!(f, "{request_type} failed: {message}"),
            Self::UnknownCorrelationId(id) => write!(f, "reply for unknown message-id {id}"),
            Self::AuthenticationFailed(msg) => write!(f, "authentication failed: {msg}"),
            Self::AlreadyConnected => write!(f, "session is already connecting or connected"),
            Self::InvalidConfig(msg) => write!(f, "invalid client configuration: {msg}"),
            Self::Connect(msg) => write!(f, "connect error: {msg}"),
            Self::WebSocket(err) => write!(f, "websocket error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for ObsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WebSocket(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for ObsError {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(err)
    }
}

impl From<serde_json::Error> for ObsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}
