//! Error types for the feed cache

use std::fmt;

/// Failure reported by a remote fetcher.
///
/// Cloneable so a single failed fetch can be handed to every caller that was
/// coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    Transport(String),
    Status(u16),
    Decode(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Transport(msg) => write!(f, "Transport error: {}", msg),
            NetworkError::Status(code) => write!(f, "Remote returned status {}", code),
            NetworkError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

pub type Result<T> = std::result::Result<T, NetworkError>;
