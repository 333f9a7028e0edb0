use thiserror::Error;
use std::io;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The default point extractor only understands point geometries.
    #[error("Unsupported geometry: expected Point, got {0}")]
    UnsupportedGeometry(String),

    #[error("Unknown projection: {0}")]
    UnknownProjection(String),

    #[error("No cluster with the specified id: {0}")]
    UnknownCluster(u64),

    // Raised by feature loaders of a wrapped source
    #[error("Source error: {0}")]
    Source(String),
}

// Type alias for Result
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn source_err<S: Into<String>>(msg: S) -> Self {
        Error::Source(msg.into())
    }

    pub fn unsupported_geometry<S: Into<String>>(kind: S) -> Self {
        Error::UnsupportedGeometry(kind.into())
    }
}
