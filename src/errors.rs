//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Malformed operator input (bad interval, missing argument, unknown kind).
    Validation(String),
    /// Operation not allowed in the current state (server running, dirty tree).
    State(String),
    /// A handshake or backend command deadline elapsed.
    Timeout(String),
    /// An external program failed to start or exited unsuccessfully.
    ExternalCommand(String),
    /// Attempt to delete the snapshot that is currently checked out.
    ProtectedResource(String),
    /// Internal invariant violated by a caller inside this crate.
    Internal(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or stream I/O failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "invalid input: {msg}"),
            Self::State(msg) => write!(f, "invalid state: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::ExternalCommand(msg) => write!(f, "command failed: {msg}"),
            Self::ProtectedResource(msg) => write!(f, "protected: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
