//! Error types for the chat server
//!
//! Protocol mistakes made by a remote user are not errors at this level;
//! they are answered with an `[Error: ...]` line and the connection stays
//! open. The types here cover server lifecycle misuse, configuration, and
//! faults that end a single connection.

use thiserror::Error;

use crate::types::ServerStatus;

/// Server lifecycle and configuration errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called on a server that is not in `NotStarted`
    #[error("Server has already started")]
    AlreadyStarted,

    /// Operation requires a running server
    #[error("Server is not running (status: {0})")]
    NotRunning(ServerStatus),

    /// Listener or socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("JSON configuration error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-connection fatal errors
///
/// Any of these ends the connection it happened on and nothing else.
#[derive(Debug, Error)]
pub enum AppError {
    /// Writing to the remote stream failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a dequeue that did not deliver a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DequeueError {
    /// The cancellation token fired before a value arrived
    #[error("Dequeue cancelled")]
    Cancelled,

    /// The delivery slot was dropped without a value
    #[error("Queue closed")]
    Closed,
}
