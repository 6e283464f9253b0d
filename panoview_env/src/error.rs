//! Error types for panorama data sources.

use thiserror::Error;

/// Errors that can occur while loading panoramas.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Underlying file or stream failed
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Payload was not a JSON array of panoramas
    #[error("Decode error in {origin}: {message}")]
    Decode { origin: String, message: String },

    /// Source produced nothing usable
    #[error("Source {0} yielded no valid panoramas")]
    Empty(String),
}

impl SourceError {
    /// Creates a decode error.
    pub fn decode(origin: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            origin: origin.into(),
            message: err.to_string(),
        }
    }
}
