//! Error handling for the tile dataset pipeline.

pub mod util;

use std::io;
use std::path::PathBuf;

use arrow::error::ArrowError;

/// Specialized error type for the tile dataset pipeline
#[derive(Debug, thiserror::Error)]
pub enum TilerError {
    /// Error opening, reading or writing a file
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Error reading, writing or transforming tabular data
    #[error("Arrow error: {0}")]
    ArrowError(#[from] ArrowError),

    /// Error decoding or encoding pixel data
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    /// Error serializing configuration or reports
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Remote fetch for a sample returned no or invalid bytes
    #[error("Transfer failure for sample {sample_id}: {reason}")]
    TransferFailure {
        /// Sample that could not be fetched
        sample_id: String,
        /// Why the transfer failed
        reason: String,
    },

    /// A slide file that cannot be opened or decoded
    #[error("Unreadable slide {}: {reason}", path.display())]
    UnreadableSlide {
        /// Path of the slide file
        path: PathBuf,
        /// Why the slide could not be read
        reason: String,
    },

    /// Problem with the metadata table itself
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// Data that violates a pipeline invariant
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<reqwest::Error> for TilerError {
    fn from(error: reqwest::Error) -> Self {
        let sample_id = error
            .url()
            .and_then(|url| url.path_segments())
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        Self::TransferFailure {
            sample_id,
            reason: error.to_string(),
        }
    }
}

impl TilerError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an unreadable slide error
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableSlide {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error must abort the whole run
    ///
    /// Transfer failures and unreadable slides are isolated to a single unit
    /// of work; everything else is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::TransferFailure { .. } | Self::UnreadableSlide { .. }
        )
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, TilerError>;
