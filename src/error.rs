use std::sync::Arc;

/// Represents a result type for operations of the autotune engine.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// autotune-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the autotune engine.
///
/// None of these is fatal: every failure path in the engine terminates in a valid, deliverable
/// [`SegmentConfig`](crate::SegmentConfig) (stale cache or client defaults).
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The engine was asked to fetch before [`init`](crate::ConfigEngine::init) was called.
    #[error("engine is not initialized")]
    Uninitialized,

    /// No cached configuration file exists at the configured storage root.
    #[error("no cached segment config found")]
    NotFound,

    /// The cache file exists but cannot be decoded into a full `SegmentConfig`.
    #[error("malformed segment config cache")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    MalformedCache(#[source] Arc<serde_json::Error>),

    /// The server response does not match the settings schema.
    #[error("invalid server response")]
    InvalidResponse(#[source] Arc<serde_json::Error>),

    /// Invalid endpoint URL configuration.
    #[error("invalid endpoint configuration")]
    InvalidEndpoint(#[source] url::ParseError),

    /// The in-flight request was cancelled by the transport.
    #[error("request cancelled by transport")]
    Cancelled,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}
