//! Ingestion error types

use reportqa_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {path}: {message}")]
    PdfParseError { path: String, message: String },

    #[error("Unsupported source format: {path}")]
    UnsupportedFormat { path: String },

    #[error("No text content in {path}")]
    EmptySource { path: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("Ingestion task failed: {0}")]
    TaskFailed(String),

    #[error("Index error: {0}")]
    Index(#[from] AppError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IngestionError {
    /// Source path the error refers to, when there is one
    pub fn path(&self) -> Option<&str> {
        match self {
            IngestionError::PdfParseError { path, .. }
            | IngestionError::UnsupportedFormat { path }
            | IngestionError::EmptySource { path }
            | IngestionError::FileNotFound(path) => Some(path.as_str()),
            _ => None,
        }
    }
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            // Keep embedding and registry errors intact
            IngestionError::Index(inner) => inner,
            other => AppError::Ingestion {
                path: other.path().unwrap_or("<unknown>").to_string(),
                message: other.to_string(),
            },
        }
    }
}
