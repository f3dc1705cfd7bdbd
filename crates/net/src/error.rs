//! Network error types

use std::io;

use tokio_tungstenite::tungstenite;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Hub is not running")]
    HubClosed,

    #[error(transparent)]
    Core(#[from] signalhub_core::Error),
}
