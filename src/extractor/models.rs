//! Data structures for extracted video information

use serde::{Deserialize, Serialize};

/// Live state of a video at extraction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    #[default]
    NotLive,
    IsLive,
    WasLive,
    PostLive,
}

/// Who can watch the video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Public,
    Unlisted,
    Private,
    NeedsAuth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
}

/// One encoded variant of a video. `vcodec`/`acodec` use the `"none"`
/// sentinel; at least one of the two is always a real codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFormat {
    pub itag: i64,
    pub url: String,
    pub mime_type: String,
    pub ext: String,
    pub vcodec: String,
    pub acodec: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    /// Total bitrate, kbps
    pub tbr: f64,
    /// Audio bitrate, kbps
    pub abr: f64,
    /// Video bitrate, kbps
    pub vbr: f64,
    /// Exact size in bytes, or 0 when the platform does not report one
    pub content_length: u64,
    pub filesize_approx: u64,
    pub language: String,
    /// -10 descriptive, +10 original, +5 default track, -1 otherwise
    pub language_preference: i32,
    pub format_note: String,
    pub protocol: String,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            itag: 0,
            url: String::new(),
            mime_type: String::new(),
            ext: String::new(),
            vcodec: "none".to_string(),
            acodec: "none".to_string(),
            width: 0,
            height: 0,
            fps: 0,
            audio_sample_rate: 0,
            audio_channels: 0,
            tbr: 0.0,
            abr: 0.0,
            vbr: 0.0,
            content_length: 0,
            filesize_approx: 0,
            language: String::new(),
            language_preference: -1,
            format_note: String::new(),
            protocol: "https".to_string(),
        }
    }
}

impl VideoFormat {
    pub fn has_video(&self) -> bool {
        self.vcodec != "none"
    }

    pub fn has_audio(&self) -> bool {
        self.acodec != "none"
    }

    /// Has both video and audio muxed together
    pub fn is_combined(&self) -> bool {
        self.has_video() && self.has_audio()
    }

    pub fn estimated_size(&self) -> Option<u64> {
        match (self.content_length, self.filesize_approx) {
            (0, 0) => None,
            (0, approx) => Some(approx),
            (exact, _) => Some(exact),
        }
    }

    /// `WxH` for video, `audio only` otherwise
    pub fn resolution_string(&self) -> String {
        if self.has_video() && self.width > 0 {
            format!("{}x{}", self.width, self.height)
        } else {
            "audio only".to_string()
        }
    }
}

/// Full description of one extracted video
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub uploader: String,
    pub channel: String,
    pub channel_id: String,
    pub channel_url: String,
    pub webpage_url: String,
    /// Best single thumbnail URL
    pub thumbnail: String,
    /// Seconds
    pub duration: u64,
    /// `H:MM:SS` above an hour, `M:SS` below
    pub duration_string: String,
    /// `YYYYMMDD`, or empty when unknown
    pub upload_date: String,
    pub view_count: u64,
    pub age_limit: u8,
    pub live_status: LiveStatus,
    pub availability: Availability,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub thumbnails: Vec<Thumbnail>,
    pub chapters: Vec<Chapter>,
    pub formats: Vec<VideoFormat>,
    pub extractor: String,
    pub extractor_key: String,
}

impl VideoInfo {
    pub fn video_formats(&self) -> Vec<&VideoFormat> {
        self.formats.iter().filter(|f| f.has_video()).collect()
    }

    pub fn audio_formats(&self) -> Vec<&VideoFormat> {
        self.formats
            .iter()
            .filter(|f| f.has_audio() && !f.has_video())
            .collect()
    }

    pub fn combined_formats(&self) -> Vec<&VideoFormat> {
        self.formats.iter().filter(|f| f.is_combined()).collect()
    }

    pub fn get_format(&self, itag: i64) -> Option<&VideoFormat> {
        self.formats.iter().find(|f| f.itag == itag)
    }
}

/// One row of a search response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub channel_id: String,
    /// Seconds
    pub duration: u64,
    pub thumbnail: String,
    pub view_count: u64,
    pub published_time: String,
    pub description: String,
}

/// Parsed form of a `ytsearch…:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub query: String,
    pub max_results: usize,
    pub sort_by_date: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_axes() {
        let audio = VideoFormat {
            itag: 140,
            acodec: "mp4a.40.2".into(),
            ..Default::default()
        };
        assert!(audio.has_audio());
        assert!(!audio.has_video());
        assert!(!audio.is_combined());
        assert_eq!(audio.resolution_string(), "audio only");

        let combined = VideoFormat {
            itag: 22,
            vcodec: "avc1.64001F".into(),
            acodec: "mp4a.40.2".into(),
            width: 1280,
            height: 720,
            ..Default::default()
        };
        assert!(combined.is_combined());
        assert_eq!(combined.resolution_string(), "1280x720");
    }

    #[test]
    fn estimated_size_prefers_exact() {
        let f = VideoFormat {
            content_length: 100,
            filesize_approx: 200,
            ..Default::default()
        };
        assert_eq!(f.estimated_size(), Some(100));

        let f = VideoFormat {
            filesize_approx: 200,
            ..Default::default()
        };
        assert_eq!(f.estimated_size(), Some(200));

        assert_eq!(VideoFormat::default().estimated_size(), None);
    }

    #[test]
    fn info_format_filters() {
        let info = VideoInfo {
            formats: vec![
                VideoFormat {
                    itag: 137,
                    vcodec: "vp9".into(),
                    ..Default::default()
                },
                VideoFormat {
                    itag: 140,
                    acodec: "opus".into(),
                    ..Default::default()
                },
                VideoFormat {
                    itag: 22,
                    vcodec: "avc1".into(),
                    acodec: "mp4a".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(info.video_formats().len(), 2);
        assert_eq!(info.audio_formats().len(), 1);
        assert_eq!(info.combined_formats().len(), 1);
        assert_eq!(info.get_format(140).unwrap().itag, 140);
        assert!(info.get_format(999).is_none());
    }

    #[test]
    fn enum_serialization() {
        assert_eq!(
            serde_json::to_string(&LiveStatus::PostLive).unwrap(),
            "\"post_live\""
        );
        assert_eq!(
            serde_json::to_string(&Availability::NeedsAuth).unwrap(),
            "\"needs_auth\""
        );
    }
}
