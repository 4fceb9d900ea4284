//! Platform error types

use tokio_tungstenite::tungstenite;

/// Platform result type
pub type Result<T> = std::result::Result<T, Error>;

/// Platform errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Injected failure: {0}")]
    Injected(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Gateway closed the connection ({code}): {reason}")]
    GatewayClosed { code: u16, reason: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Gateway protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether the platform reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
