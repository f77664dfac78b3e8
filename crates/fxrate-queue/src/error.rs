//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// No job became ready within the reserve timeout.
    #[error("Reserve timed out")]
    TimedOut,

    /// A job reserved by this connection is about to exceed its TTR.
    #[error("Deadline soon for a reserved job")]
    DeadlineSoon,

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid tube name: {0}")]
    InvalidTube(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Server rejected command: {0}")]
    Protocol(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn unexpected(line: impl Into<String>) -> Self {
        Self::UnexpectedResponse(line.into())
    }

    /// The benign "nothing to do" outcome of a reserve.
    pub fn is_idle_timeout(&self) -> bool {
        matches!(self, QueueError::TimedOut)
    }

    /// The connection can no longer be trusted and must be re-established.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            QueueError::Io(_)
                | QueueError::ConnectionClosed
                | QueueError::ConnectionFailed(_)
                | QueueError::UnexpectedResponse(_)
        )
    }

    /// Worth retrying after a pause.
    pub fn is_transient(&self) -> bool {
        self.is_connection_error() || matches!(self, QueueError::DeadlineSoon | QueueError::Protocol(_))
    }
}
