//! Error types for the feed console

use std::fmt;

use feed_cache::NetworkError;
use jsonplaceholder_client::PlaceholderError;

#[derive(Debug)]
pub enum ConsoleError {
    Config(String),
    Client(PlaceholderError),
    Network(NetworkError),
    Io(Box<std::io::Error>),
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ConsoleError::Client(err) => write!(f, "Client error: {}", err),
            ConsoleError::Network(err) => write!(f, "Network error: {}", err),
            ConsoleError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ConsoleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsoleError::Client(err) => Some(err),
            ConsoleError::Network(err) => Some(err),
            ConsoleError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<PlaceholderError> for ConsoleError {
    fn from(err: PlaceholderError) -> Self {
        ConsoleError::Client(err)
    }
}

impl From<NetworkError> for ConsoleError {
    fn from(err: NetworkError) -> Self {
        ConsoleError::Network(err)
    }
}

impl From<std::io::Error> for ConsoleError {
    fn from(err: std::io::Error) -> Self {
        ConsoleError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ConsoleError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ConsoleError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
