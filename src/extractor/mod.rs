//! Native Innertube extraction pipeline

pub mod assembler;
pub mod decipher;
pub mod dump;
pub mod innertube;
pub mod models;
pub mod player_script;
pub mod search;
pub mod session;

pub use models::{
    Availability, LiveStatus, SearchOptions, SearchResult, VideoFormat, VideoInfo,
};
pub use search::{build_search_url, parse_search_url};
pub use session::{extract_video_id, Extractor};
