//! Error types for Orrery
//!
//! This module defines `OrreryError`, the taxonomy shared by every crate in
//! the workspace. `InvalidArgument` and `ConfigError` are returned to callers;
//! the remaining variants describe conditions the replication protocol logs
//! and absorbs.

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrreryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("listener failure: {0}")]
    ListenerFailure(String),

    #[error("no direct channel to node '{0}'")]
    UnroutableNode(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl OrreryError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        OrreryError::InvalidArgument(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        OrreryError::MalformedPayload(message.into())
    }

    /// Whether this error is surfaced to callers rather than absorbed by the protocol
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            OrreryError::InvalidArgument(_) | OrreryError::ConfigError(_)
        )
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, OrreryError>;
