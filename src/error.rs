//! Error types for the cache

use std::sync::Arc;
use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum Error {
    /// A sink was asked for its view before any value was set
    #[error("sink holds no value")]
    SinkUnset,

    /// A value could not be stored as text because it is not valid UTF-8
    #[error("value is not valid UTF-8: {0}")]
    InvalidText(#[from] std::str::Utf8Error),

    /// The user-supplied loader failed
    #[error("loader error: {0}")]
    Loader(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// A peer request could not be sent or its body could not be read
    #[error("peer request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A peer answered with a non-success HTTP status
    #[error("peer returned status {status}")]
    PeerStatus {
        /// The HTTP status code returned by the peer
        status: u16,
    },

    /// A wire message could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// A peer base URL could not be parsed or extended with path segments
    #[error("invalid peer URL: {0}")]
    PeerUrl(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The failure of one in-flight load, observed by every caller that
    /// was coalesced onto it
    #[error(transparent)]
    Shared(#[from] Arc<Error>),

    /// The in-flight load this caller was waiting on was cancelled or
    /// panicked before producing a result
    #[error("in-flight load was interrupted before completing")]
    LoadInterrupted,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
