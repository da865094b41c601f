//! tubeloader - Native YouTube Downloader
//!
//! Extracts video metadata straight from the platform's player API, then
//! downloads the selected streams with the built-in engine. No external
//! extractor binaries involved.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tubeloader::downloader::{merger, DownloadEngine, DownloadPhase, DownloadProgress};
use tubeloader::extractor::{parse_search_url, Extractor, SearchResult, VideoFormat};
use tubeloader::utils::Settings;

#[derive(Parser)]
#[command(name = "tubeloader", version, about = "Native YouTube extractor and downloader")]
struct Args {
    /// Video URL, or a ytsearch expression like "ytsearch5:query"
    url: Option<String>,

    /// Format selector: best, bestvideo+bestaudio, <itag>, <itag>+<itag>
    #[arg(short = 'f', long)]
    format: Option<String>,

    /// List available formats
    #[arg(short = 'F', long)]
    list_formats: bool,

    /// Print video info as JSON
    #[arg(short = 'j', long)]
    dump_json: bool,

    /// Print the selected stream URLs without downloading
    #[arg(short = 'g', long)]
    get_url: bool,

    /// Extract only, download nothing
    #[arg(long)]
    simulate: bool,

    /// Output directory
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output filename template, e.g. "%(title)s.%(ext)s"
    #[arg(long)]
    output_template: Option<String>,

    /// Container for merged downloads (e.g. mp4, mkv, webm)
    #[arg(long)]
    merge_output_format: Option<String>,

    /// Merge a video and an audio file directly, no extraction:
    /// --manual-merge <video> <audio> <output>
    #[arg(long, num_args = 3, value_names = ["VIDEO", "AUDIO", "OUTPUT"])]
    manual_merge: Option<Vec<PathBuf>>,

    /// Player script cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    if let Err(e) = run(args).await {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if let Some(paths) = &args.manual_merge {
        let [video, audio, output] = paths.as_slice() else {
            anyhow::bail!("usage: --manual-merge <video> <audio> <output>");
        };
        println!(
            "Manually merging...\nVideo: {}\nAudio: {}\nOutput: {}",
            video.display(),
            audio.display(),
            output.display()
        );
        merger::remux(video, audio, output).await?;
        println!("Merge successful.");
        return Ok(());
    }

    let Some(url) = args.url.clone() else {
        anyhow::bail!("no URL given; try: tubeloader <url>");
    };

    let mut settings = Settings::default();
    if let Some(cache_dir) = &args.cache_dir {
        settings.cache_dir = cache_dir.clone();
    }
    if let Some(output) = &args.output {
        settings.download_location = output.clone();
    }

    let extractor = Extractor::new(&settings)?;

    if url.starts_with("ytsearch") {
        let options = parse_search_url(&url)
            .ok_or_else(|| anyhow::anyhow!("invalid search expression: {}", url))?;
        let results = extractor.search(&options).await?;
        print_search_results(&results);
        return Ok(());
    }

    let info = extractor.extract(&url).await?;

    if args.list_formats {
        print_formats_table(&info.formats);
        return Ok(());
    }

    if args.dump_json {
        let dump = tubeloader::extractor::dump::video_info_json(&info);
        println!("{}", serde_json::to_string_pretty(&dump)?);
        return Ok(());
    }

    let selector = args.format.as_deref().unwrap_or("best");

    if args.get_url {
        let streams = DownloadEngine::select_streams(&info, selector)?;
        if let Some(video) = &streams.video {
            println!("{}", video.url);
        }
        if let Some(audio) = &streams.audio {
            println!("{}", audio.url);
        }
        return Ok(());
    }

    if args.simulate {
        println!("{} [{}]", info.title, info.id);
        println!("{} formats available", info.formats.len());
        return Ok(());
    }

    tokio::fs::create_dir_all(&settings.download_location).await?;
    let engine = DownloadEngine::new(extractor.http().clone());
    let cancel = CancellationToken::new();
    let output = engine
        .download(
            &info,
            selector,
            args.merge_output_format.as_deref(),
            args.output_template.as_deref(),
            &settings.download_location,
            Some(&print_progress),
            &cancel,
        )
        .await?;
    eprintln!();
    println!("Saved to {}", output.display());
    Ok(())
}

fn print_progress(progress: &DownloadProgress) {
    match progress.phase {
        DownloadPhase::Remuxing => {
            eprint!("\rMerging streams...                                  ");
            return;
        }
        DownloadPhase::Done => {
            eprint!("\r100.0% of {:>9} - done                       ", format_size(progress.total));
            return;
        }
        _ => {}
    }
    let rate_mib = progress.rate / 1024.0 / 1024.0;
    let eta = progress
        .eta()
        .map(|d| format!("{:>3}s", d.as_secs()))
        .unwrap_or_else(|| "  ?".to_string());
    eprint!(
        "\r{:>6.1}% of {:>9} at {:>6.2} MiB/s ETA {}",
        progress.fraction() * 100.0,
        format_size(progress.total),
        rate_mib,
        eta
    );
}

fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "~".to_string();
    }
    format!("{:.2}MiB", bytes as f64 / 1024.0 / 1024.0)
}

/// yt-dlp style format table, resolution ascending
fn print_formats_table(formats: &[VideoFormat]) {
    let mut formats: Vec<&VideoFormat> = formats.iter().collect();
    formats.sort_by(|a, b| {
        let pixels_a = a.width as u64 * a.height as u64;
        let pixels_b = b.width as u64 * b.height as u64;
        pixels_a
            .cmp(&pixels_b)
            .then(a.tbr.partial_cmp(&b.tbr).unwrap_or(std::cmp::Ordering::Equal))
    });

    println!(
        "{:<5} {:<5} {:<11} {:>3} {:>2} | {:>9} {:>6} {:<5} | {:<16} {:<12} {:>4} {:>4} {}",
        "ID", "EXT", "RESOLUTION", "FPS", "CH", "FILESIZE", "TBR", "PROTO", "VCODEC", "ACODEC",
        "ABR", "ASR", "MORE INFO"
    );
    println!("{:-<110}", "");

    for f in formats {
        let ext = if f.ext.is_empty() { "unk" } else { &f.ext };
        let fps = if f.fps > 0 {
            f.fps.to_string()
        } else {
            String::new()
        };
        let channels = if f.audio_channels > 0 {
            f.audio_channels.to_string()
        } else {
            String::new()
        };
        let size = format_size(f.content_length);
        let tbr = if f.tbr > 0.0 {
            format!("{}k", f.tbr as u64)
        } else {
            "N/A".to_string()
        };
        let proto = if f.url.contains("m3u8") { "m3u8" } else { "https" };
        let vcodec = if f.vcodec == "none" {
            "images".to_string()
        } else {
            truncate(&f.vcodec, 16)
        };
        let acodec = truncate(&f.acodec, 12);
        let abr = if f.abr > 0.0 {
            format!("{}k", f.abr as u64)
        } else {
            String::new()
        };
        let asr = if f.audio_sample_rate > 0 {
            format!("{}k", f.audio_sample_rate / 1000)
        } else {
            String::new()
        };

        let mut more = String::new();
        if f.has_video() && !f.has_audio() {
            more.push_str("video only");
        } else if !f.has_video() && f.has_audio() {
            more.push_str("audio only");
        }
        if f.height > 0 {
            if !more.is_empty() {
                more.push_str(", ");
            }
            more.push_str(&format!("{}p", f.height));
        }

        println!(
            "{:<5} {:<5} {:<11} {:>3} {:>2} | {:>9} {:>6} {:<5} | {:<16} {:<12} {:>4} {:>4} {}",
            f.itag,
            ext,
            f.resolution_string(),
            fps,
            channels,
            size,
            tbr,
            proto,
            vcodec,
            acodec,
            abr,
            asr,
            more
        );
    }
}

fn print_search_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{:>2}. {} [{}] - {} ({}s, {} views)",
            i + 1,
            r.title,
            r.id,
            r.channel,
            r.duration,
            r.view_count
        );
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() > max {
        format!("{}...", &text[..max - 3])
    } else {
        text.to_string()
    }
}
