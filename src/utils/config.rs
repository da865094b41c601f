//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Extractor and downloader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory for cached player scripts (`<id>.js` / `<id>.jsc`)
    pub cache_dir: PathBuf,

    /// Download location for the CLI
    pub download_location: PathBuf,

    /// Chunk size for Range-based downloads (bytes)
    pub chunk_size: u64,

    /// Retry attempts per chunk
    pub retry_attempts: usize,

    /// Delay between retries
    pub retry_delay: Duration,

    /// Per-request deadline imposed by the HTTP client
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("tubeloader_cache"),
            download_location: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            chunk_size: 2 * 1024 * 1024, // 2 MiB
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.chunk_size, 2 * 1024 * 1024);
        assert!(s.cache_dir.ends_with("tubeloader_cache"));
    }
}
