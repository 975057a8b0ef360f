// Transport error types

use bellsync_schemas::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server or complete the handshake
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The server spoke something we do not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Channel authorization was refused
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// The server closed the connection
    #[error("Connection closed")]
    Closed,

    /// A single event could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Reconnect attempts ran out
    #[error("Gave up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },
}

impl TransportError {
    pub fn connect(msg: impl Into<String>) -> Self {
        TransportError::Connect(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        TransportError::Protocol(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        TransportError::Auth(msg.into())
    }

    /// Per-event failure; the connection stays usable
    pub fn is_decode(&self) -> bool {
        matches!(self, TransportError::Decode(_))
    }

    /// Reconnecting will not help
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Auth(_) | TransportError::RetriesExhausted { .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Io(e) => TransportError::Connect(e.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Connect(err.to_string())
    }
}
