//! Error types for surface plane processing

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid plane: {0}")]
    InvalidPlane(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Plane extraction error: {0}")]
    Extraction(String),

    #[error("Refresh failed: all {failed} plane visuals could not be created")]
    RefreshFailed { failed: usize },

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}
