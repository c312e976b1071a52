use std::path::PathBuf;

use thiserror::Error;

/// Invalid parameter or config description. Fatal to startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("group '{group}' has {count} parameter(s), expected exactly 2")]
    GroupSize { group: String, count: usize },
    #[error("parameter '{key}' has zero-width bounds (min == max == {min})")]
    ZeroWidthBounds { key: String, min: f64 },
    #[error("parameter '{key}' has inverted bounds (min {min} > max {max})")]
    InvertedBounds { key: String, min: f64, max: f64 },
    #[error("parameter '{key}' has a non-finite {field}")]
    NonFinite { key: String, field: &'static str },
    #[error("duplicate parameter '{0}'")]
    DuplicateKey(String),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// A frame that could not be turned into a [`Response`](crate::protocol::Response).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("malformed {request_type} payload: {source}")]
    Payload {
        request_type: &'static str,
        source: serde_json::Error,
    },
    #[error("unknown request_type '{0}'")]
    UnknownRequestType(String),
    #[error("empty frame")]
    Empty,
}

impl ProtocolError {
    /// Unknown discriminants and empty acknowledgements are expected traffic,
    /// not faults.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownRequestType(_) | ProtocolError::Empty
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("channel not connected")]
    NotConnected,
    #[error("channel shut down")]
    Closed,
    #[error("failed to encode request: {0}")]
    Encode(String),
}
