//! Download engine module

pub mod engine;
pub mod merger;
pub mod progress;

// Re-export for convenience
pub use engine::{DownloadEngine, SelectedStreams};
pub use progress::{DownloadPhase, DownloadProgress};
