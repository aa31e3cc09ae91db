//! Normalized failure taxonomy shared by every transport backend.

use std::time::Duration;
use thiserror::Error;

/// A failed call against the substrate, independent of which backend made it.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("process exited with code {exit_code:?}: {message}")]
    Process {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    /// Connection refused, DNS failure, or the CLI binary could not be spawned.
    #[error("substrate unreachable: {0}")]
    Unreachable(String),
}

/// Discriminant of [`BridgeError`], for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Http,
    Process,
    Remote,
    Parse,
    Unreachable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Http => "http_error",
            Self::Process => "process_error",
            Self::Remote => "remote_error",
            Self::Parse => "parse_error",
            Self::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Http { .. } => ErrorKind::Http,
            Self::Process { .. } => ErrorKind::Process,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Unreachable(_) => ErrorKind::Unreachable,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
