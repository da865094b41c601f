//! Stream selection and the download driver.
//!
//! Consumes the format list produced by extraction: picks streams with a
//! small selector grammar, downloads them over the shared HTTP client
//! (Range-chunked), and remuxes separate audio/video into one container.

use crate::downloader::merger;
use crate::downloader::progress::DownloadProgress;
use crate::extractor::models::{VideoFormat, VideoInfo};
use crate::net::HttpClient;
use crate::utils::error::{Error, Result};
use crate::utils::output_template;
use crate::utils::text::sanitize_filename;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Streams picked by a selector. A combined format fills only `video`.
#[derive(Debug, Clone, Default)]
pub struct SelectedStreams {
    pub video: Option<VideoFormat>,
    pub audio: Option<VideoFormat>,
}

pub type ProgressFn<'a> = &'a (dyn Fn(&DownloadProgress) + Send + Sync);

const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

pub struct DownloadEngine {
    http: std::sync::Arc<HttpClient>,
}

impl DownloadEngine {
    pub fn new(http: std::sync::Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Selector grammar: `best`, `bestvideo+bestaudio`, `bestvideo`,
    /// `bestaudio`, `<itag>`, or `<itag>+<itag>` (video itag first).
    pub fn select_streams(info: &VideoInfo, selector: &str) -> Result<SelectedStreams> {
        match selector {
            "best" => {
                if let Some(combined) = best_combined(info) {
                    return Ok(SelectedStreams {
                        video: Some(combined.clone()),
                        audio: None,
                    });
                }
                // No pre-merged format; fall back to a pair
                Self::select_streams(info, "bestvideo+bestaudio")
            }
            "bestvideo+bestaudio" => {
                let video = best_video(info).cloned();
                let audio = best_audio(info).cloned();
                if video.is_none() && audio.is_none() {
                    return Err(Error::FormatNotFound(selector.to_string()));
                }
                Ok(SelectedStreams { video, audio })
            }
            "bestvideo" => {
                let video = best_video(info)
                    .cloned()
                    .ok_or_else(|| Error::FormatNotFound(selector.to_string()))?;
                Ok(SelectedStreams {
                    video: Some(video),
                    audio: None,
                })
            }
            "bestaudio" => {
                let audio = best_audio(info)
                    .cloned()
                    .ok_or_else(|| Error::FormatNotFound(selector.to_string()))?;
                Ok(SelectedStreams {
                    video: None,
                    audio: Some(audio),
                })
            }
            _ => match selector.split_once('+') {
                Some((video_tag, audio_tag)) => {
                    let video = find_itag(info, video_tag)?;
                    let audio = find_itag(info, audio_tag)?;
                    Ok(SelectedStreams {
                        video: Some(video.clone()),
                        audio: Some(audio.clone()),
                    })
                }
                None => {
                    let format = find_itag(info, selector)?;
                    Ok(SelectedStreams {
                        video: Some(format.clone()),
                        audio: None,
                    })
                }
            },
        }
    }

    /// Download per `selector` into `output_dir` and return the final path.
    /// Two selected streams are remuxed into one file. `template` uses the
    /// `%(field)s` output syntax; `None` means `<title> [<id>].<ext>`.
    pub async fn download(
        &self,
        info: &VideoInfo,
        selector: &str,
        merge_format: Option<&str>,
        template: Option<&str>,
        output_dir: &Path,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let streams = Self::select_streams(info, selector)?;

        let final_ext = match (&streams.video, &streams.audio) {
            (Some(video), Some(audio)) => merge_format
                .map(str::to_string)
                .unwrap_or_else(|| infer_container(video, audio).to_string()),
            (Some(format), None) | (None, Some(format)) => format.ext.clone(),
            (None, None) => return Err(Error::FormatNotFound(selector.to_string())),
        };
        let file_name = sanitize_filename(&output_template::expand(
            template.unwrap_or(DEFAULT_OUTPUT_TEMPLATE),
            info,
            &final_ext,
        ));
        let output = output_dir.join(&file_name);
        let stem = file_name
            .strip_suffix(&format!(".{}", final_ext))
            .unwrap_or(&file_name)
            .to_string();

        match (streams.video, streams.audio) {
            (Some(format), None) | (None, Some(format)) => {
                self.download_stream(&format, &output, 0, format.content_length, progress, cancel)
                    .await?;
                if let Some(report) = progress {
                    let mut snapshot = DownloadProgress::starting(format.content_length);
                    snapshot.done();
                    report(&snapshot);
                }
                Ok(output)
            }
            (Some(video), Some(audio)) => {
                let total = video.content_length + audio.content_length;
                let video_tmp =
                    output_dir.join(format!("{}.f{}.{}", stem, video.itag, video.ext));
                let audio_tmp =
                    output_dir.join(format!("{}.f{}.{}", stem, audio.itag, audio.ext));

                self.download_stream(&video, &video_tmp, 0, total, progress, cancel)
                    .await?;
                self.download_stream(
                    &audio,
                    &audio_tmp,
                    video.content_length,
                    total,
                    progress,
                    cancel,
                )
                .await?;

                let mut snapshot = DownloadProgress::starting(total);
                snapshot.record(total, 0.0);
                snapshot.remuxing();
                if let Some(report) = progress {
                    report(&snapshot);
                }

                merger::remux(&video_tmp, &audio_tmp, &output).await?;
                merger::cleanup(&[video_tmp, audio_tmp]).await;

                snapshot.done();
                if let Some(report) = progress {
                    report(&snapshot);
                }
                Ok(output)
            }
            (None, None) => unreachable!("empty selection rejected above"),
        }
    }

    async fn download_stream(
        &self,
        format: &VideoFormat,
        path: &Path,
        already_done: u64,
        combined_total: u64,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Downloading itag {} to {}", format.itag, path.display());

        let started = Instant::now();
        let tracker = Mutex::new(DownloadProgress::starting(combined_total));
        let callback = |downloaded: u64, total: u64| {
            let Some(report) = progress else { return };
            let mut snapshot = tracker.lock().unwrap();
            if combined_total == 0 && total > 0 {
                snapshot.total = already_done + total;
            }
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                downloaded as f64 / elapsed
            } else {
                0.0
            };
            snapshot.record(already_done + downloaded, rate);
            report(&snapshot);
        };

        self.http
            .download_file(&format.url, path, Some(&callback), cancel)
            .await?;
        Ok(())
    }
}

fn best_combined(info: &VideoInfo) -> Option<&VideoFormat> {
    info.combined_formats()
        .into_iter()
        .max_by(|a, b| pixel_rank(a).cmp(&pixel_rank(b)).then(tbr_rank(a, b)))
}

fn best_video(info: &VideoInfo) -> Option<&VideoFormat> {
    info.video_formats()
        .into_iter()
        .max_by(|a, b| pixel_rank(a).cmp(&pixel_rank(b)).then(tbr_rank(a, b)))
}

/// Pure audio streams ranked by bitrate with a small bias towards opus;
/// that bias picks opus 122k over aac 129k. Falls back to the best mixed
/// stream when no pure audio format exists.
fn best_audio(info: &VideoInfo) -> Option<&VideoFormat> {
    let audio_score = |f: &VideoFormat| {
        let mut score = f.tbr.max(f.abr);
        if f.acodec.contains("opus") {
            score += 10.0;
        }
        score
    };

    info.audio_formats()
        .into_iter()
        .max_by(|a, b| {
            audio_score(a)
                .partial_cmp(&audio_score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .or_else(|| {
            info.formats
                .iter()
                .filter(|f| f.has_audio())
                .max_by(|a, b| tbr_rank(a, b))
        })
}

/// Merged container when the user names none: mp4 when both sides are
/// mp4-family, webm when both are webm, mkv otherwise.
fn infer_container(video: &VideoFormat, audio: &VideoFormat) -> &'static str {
    if video.ext == "mp4" && (audio.ext == "m4a" || audio.ext == "mp4") {
        "mp4"
    } else if video.ext == "webm" && audio.ext == "webm" {
        "webm"
    } else {
        "mkv"
    }
}

fn pixel_rank(format: &VideoFormat) -> u64 {
    format.width as u64 * format.height as u64
}

fn tbr_rank(a: &VideoFormat, b: &VideoFormat) -> std::cmp::Ordering {
    a.tbr.partial_cmp(&b.tbr).unwrap_or(std::cmp::Ordering::Equal)
}

fn find_itag<'a>(info: &'a VideoInfo, selector: &str) -> Result<&'a VideoFormat> {
    let itag: i64 = selector
        .trim()
        .parse()
        .map_err(|_| Error::FormatNotFound(selector.to_string()))?;
    info.get_format(itag)
        .ok_or_else(|| Error::FormatNotFound(selector.to_string()))
}
