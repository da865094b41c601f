//! Error handling for tubeloader

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tubeloader
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid or unrecognised video URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP error status {0}")]
    HttpStatus(u16),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Video not found or unplayable with every client")]
    VideoNotFound,

    #[error("JavaScript evaluation failed: {0}")]
    JsEval(String),

    #[error("Signature decipher failed: {0}")]
    DecipherFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("No format matched selector: {0}")]
    FormatNotFound(String),

    #[error("Failed to open file: {0}")]
    FileOpen(PathBuf),

    #[error("Failed to write file: {0}")]
    FileWrite(PathBuf),

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
