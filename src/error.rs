//! Error types for PDF shrinking.

use lopdf::ObjectId;
use thiserror::Error;

/// Errors that abort a whole compression run.
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("Quality must be between 1 and 100")]
    InvalidQuality,

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Failed to parse PDF: {0}")]
    DocumentParse(#[source] lopdf::Error),

    #[error("Failed to parse PDF: document catalog is missing")]
    MissingCatalog,

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    /// True when the input itself could not be read as a PDF.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            CompressError::DocumentParse(_) | CompressError::MissingCatalog
        )
    }
}

/// Errors raised while handling a single embedded image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Cannot extract image {id:?}: {reason}")]
    Extraction { id: ObjectId, reason: String },

    #[error("Cannot decode image: {0}")]
    Decode(String),

    #[error("Cannot encode JPEG: {0}")]
    Encode(String),

    #[error("Cannot commit image {id:?}: {reason}")]
    Commit { id: ObjectId, reason: String },
}

impl ImageError {
    pub(crate) fn extraction(id: ObjectId, reason: impl Into<String>) -> Self {
        ImageError::Extraction {
            id,
            reason: reason.into(),
        }
    }

    /// Extraction and decode failures skip the image; anything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ImageError::Extraction { .. } | ImageError::Decode(_))
    }
}

impl From<ImageError> for CompressError {
    fn from(err: ImageError) -> Self {
        CompressError::Compression(err.to_string())
    }
}
