use std::fmt;

use feed_cache::NetworkError;

/// Errors from the JSONPlaceholder client
#[derive(Debug)]
pub enum PlaceholderError {
    Http(reqwest::Error),
    Status(u16),
}

impl fmt::Display for PlaceholderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Status(code) => write!(f, "API returned status {code}"),
        }
    }
}

impl std::error::Error for PlaceholderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PlaceholderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<PlaceholderError> for NetworkError {
    fn from(err: PlaceholderError) -> Self {
        match err {
            PlaceholderError::Http(e) if e.is_decode() => NetworkError::Decode(e.to_string()),
            PlaceholderError::Http(e) => NetworkError::Transport(e.to_string()),
            PlaceholderError::Status(code) => NetworkError::Status(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaceholderError>;
