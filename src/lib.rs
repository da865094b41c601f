//! # tubeloader
//!
//! Native YouTube metadata extraction and downloading. Speaks the platform's
//! private player API directly across several emulated clients, recovers the
//! player script's signature and n-parameter transforms with an embedded
//! QuickJS engine, and downloads or remuxes the resulting streams.
//!
//! ```no_run
//! use tubeloader::extractor::Extractor;
//! use tubeloader::utils::Settings;
//!
//! #[tokio::main]
//! async fn main() {
//!     let extractor = Extractor::new(&Settings::default()).unwrap();
//!     let info = extractor
//!         .extract("https://www.youtube.com/watch?v=aBcDeFgHiJk")
//!         .await
//!         .unwrap();
//!     for format in &info.formats {
//!         println!("{}: {}", format.itag, format.url);
//!     }
//! }
//! ```

pub mod audio;
pub mod downloader;
pub mod extractor;
pub mod js;
pub mod net;
pub mod utils;

// Re-export main types for easier use
pub use downloader::{DownloadEngine, DownloadPhase, DownloadProgress};
pub use extractor::{
    Extractor, LiveStatus, SearchOptions, SearchResult, VideoFormat, VideoInfo,
};
pub use utils::{Error, Result, Settings};
