//! Fetch error types.

use std::fmt;

use thiserror::Error;

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The rate source answered with something other than a usable page
    /// (non-200 status, transport failure).
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The page was fetched but the amounts did not have the expected shape.
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),
}

/// Tag of a `FetchError`, for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    UnexpectedResponse,
    FormatMismatch,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::UnexpectedResponse => "unexpected_response",
            FetchErrorKind::FormatMismatch => "format_mismatch",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FetchError {
    pub fn unexpected_response(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponse(msg.into())
    }

    pub fn format_mismatch(msg: impl Into<String>) -> Self {
        Self::FormatMismatch(msg.into())
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::UnexpectedResponse(_) => FetchErrorKind::UnexpectedResponse,
            FetchError::FormatMismatch(_) => FetchErrorKind::FormatMismatch,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        Self::UnexpectedResponse(e.to_string())
    }
}
