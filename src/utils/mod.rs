//! Utility modules for error handling, configuration and text processing

pub mod config;
pub mod error;
pub mod output_template;
pub mod text;

// Re-export for convenience
pub use config::Settings;
pub use error::{Error, Result};
