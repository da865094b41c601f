//! Format assembly: merges raw player-API responses into one `VideoInfo`.
//!
//! Scalar metadata comes from the first response to arrive; formats come
//! from every response, get their cipher URLs rewritten through the
//! decipherer, and are deduplicated by itag (first occurrence wins).

use crate::extractor::decipher::Decipher;
use crate::extractor::innertube::ClientResponse;
use crate::extractor::models::{
    Availability, LiveStatus, Thumbnail, VideoFormat, VideoInfo,
};
use crate::utils::text::{format_duration, to_number_default, SignatureCipher};
use serde_json::Value;
use tracing::{debug, warn};

const HOST: &str = "https://www.youtube.com";

/// Run the full assembly over the arrival-ordered response list.
pub async fn assemble(
    video_id: &str,
    responses: &[ClientResponse],
    decipher: &Decipher,
) -> VideoInfo {
    let mut info = VideoInfo {
        id: video_id.to_string(),
        webpage_url: format!("{}/watch?v={}", HOST, video_id),
        extractor: "youtube".to_string(),
        extractor_key: "Youtube".to_string(),
        ..Default::default()
    };

    if let Some(first) = responses.first() {
        extract_metadata(&mut info, &first.body);
    }

    // Every response contributes formats; clients expose different subsets
    let mut raw_formats: Vec<(&'static str, Value)> = Vec::new();
    for response in responses {
        let streaming = &response.body["streamingData"];
        for key in ["formats", "adaptiveFormats"] {
            if let Some(list) = streaming[key].as_array() {
                for fmt in list {
                    raw_formats.push((response.client_name, fmt.clone()));
                }
            }
        }
    }

    let rewrites = raw_formats
        .iter()
        .map(|(client, fmt)| process_format(client, fmt, decipher));
    let processed = futures::future::join_all(rewrites).await;

    let mut skipped_clients: Vec<&'static str> = Vec::new();
    let mut formats = Vec::new();
    for (result, &(client, _)) in processed.into_iter().zip(raw_formats.iter()) {
        match result {
            Some(fmt) => formats.push(fmt),
            None => {
                if !skipped_clients.contains(&client) {
                    skipped_clients.push(client);
                }
            }
        }
    }
    for client in skipped_clients {
        warn!(
            "{}: Some {} client https formats have been skipped as they are missing a url",
            video_id, client
        );
    }

    info.formats = dedupe_by_itag(formats);
    info
}

/// Keep the first occurrence of each itag, preserving insertion order.
pub fn dedupe_by_itag(formats: Vec<VideoFormat>) -> Vec<VideoFormat> {
    let mut seen = std::collections::HashSet::new();
    formats
        .into_iter()
        .filter(|f| seen.insert(f.itag))
        .collect()
}

fn extract_metadata(info: &mut VideoInfo, body: &Value) {
    let details = &body["videoDetails"];
    if details.is_object() {
        info.title = str_field(details, "title");
        info.description = str_field(details, "shortDescription");
        info.uploader = str_field(details, "author");
        info.channel = info.uploader.clone();
        info.channel_id = str_field(details, "channelId");
        info.duration = to_number_default(&str_field(details, "lengthSeconds"), 0);
        info.view_count = to_number_default(&str_field(details, "viewCount"), 0);

        if let Some(keywords) = details["keywords"].as_array() {
            info.tags = keywords
                .iter()
                .filter_map(|k| k.as_str().map(String::from))
                .collect();
        }

        if let Some(thumbs) = details["thumbnail"]["thumbnails"].as_array() {
            info.thumbnails = thumbs
                .iter()
                .map(|t| Thumbnail {
                    url: str_field(t, "url"),
                    width: t["width"].as_u64().unwrap_or(0) as u32,
                    height: t["height"].as_u64().unwrap_or(0) as u32,
                })
                .collect();
            if let Some(last) = info.thumbnails.last() {
                info.thumbnail = last.url.clone();
            }
        }

        let is_live = details["isLive"].as_bool().unwrap_or(false);
        let is_post_live = details["isPostLiveDvr"].as_bool().unwrap_or(false);
        let is_live_content = details["isLiveContent"].as_bool().unwrap_or(false);
        info.live_status = if is_live {
            LiveStatus::IsLive
        } else if is_post_live {
            LiveStatus::PostLive
        } else if is_live_content {
            LiveStatus::WasLive
        } else {
            LiveStatus::NotLive
        };
    }

    let micro = &body["microformat"]["playerMicroformatRenderer"];
    if micro.is_object() {
        // uploadDate arrives as YYYY-MM-DD; the dump format is YYYYMMDD
        let upload_date = str_field(micro, "uploadDate");
        info.upload_date = upload_date.chars().filter(|c| *c != '-').collect();

        info.age_limit = match micro["isFamilySafe"].as_bool() {
            Some(false) => 18,
            _ => 0,
        };
        info.availability = if micro["isUnlisted"].as_bool().unwrap_or(false) {
            Availability::Unlisted
        } else {
            Availability::Public
        };
        let category = str_field(micro, "category");
        if !category.is_empty() {
            info.categories = vec![category];
        }
    }

    info.duration_string = format_duration(info.duration);
    if !info.channel_id.is_empty() {
        info.channel_url = format!("{}/channel/{}", HOST, info.channel_id);
    }
}

/// Parse one raw format JSON and rewrite its URL. `None` drops the format.
async fn process_format(
    client: &str,
    raw: &Value,
    decipher: &Decipher,
) -> Option<VideoFormat> {
    let mut fmt = parse_format_fields(raw);

    if !fmt.has_video() && !fmt.has_audio() {
        debug!("Skipping format {} with no media axis", fmt.itag);
        return None;
    }

    if fmt.url.is_empty() {
        if let Some(cipher) = raw["signatureCipher"].as_str() {
            fmt.url = rewrite_cipher_url(cipher, decipher).await.unwrap_or_default();
        }
    } else {
        fmt.url = rewrite_n_param(&fmt.url, decipher).await;
    }

    if fmt.url.is_empty() {
        debug!(
            "Skipping format {} from {} because URL is empty",
            fmt.itag, client
        );
        return None;
    }
    Some(fmt)
}

fn parse_format_fields(raw: &Value) -> VideoFormat {
    let mut fmt = VideoFormat {
        itag: raw["itag"].as_i64().unwrap_or(0),
        url: str_field(raw, "url"),
        mime_type: str_field(raw, "mimeType"),
        width: raw["width"].as_u64().unwrap_or(0) as u32,
        height: raw["height"].as_u64().unwrap_or(0) as u32,
        fps: raw["fps"].as_u64().unwrap_or(0) as u32,
        audio_sample_rate: to_number_default(&str_field(raw, "audioSampleRate"), 0),
        audio_channels: raw["audioChannels"].as_u64().unwrap_or(0) as u32,
        content_length: to_number_default(&str_field(raw, "contentLength"), 0),
        format_note: str_field(raw, "qualityLabel"),
        ..Default::default()
    };

    // averageBitrate is the better estimate when both are present
    if let Some(bitrate) = raw["bitrate"].as_f64() {
        fmt.tbr = bitrate / 1000.0;
    }
    if let Some(bitrate) = raw["averageBitrate"].as_f64() {
        fmt.tbr = bitrate / 1000.0;
    }

    parse_mime(&mut fmt);

    if fmt.tbr > 0.0 {
        if fmt.vcodec == "none" && fmt.acodec != "none" {
            fmt.abr = fmt.tbr;
        } else if fmt.acodec == "none" && fmt.vcodec != "none" {
            fmt.vbr = fmt.tbr;
        }
    }

    let track = &raw["audioTrack"];
    if track.is_object() {
        let track_id = str_field(track, "id");
        if let Some((lang, _)) = track_id.split_once('.') {
            fmt.language = lang.to_string();
        }
        let display = str_field(track, "displayName").to_lowercase();
        fmt.language_preference = if display.contains("descriptive") {
            -10
        } else if display.contains("original") {
            10
        } else if track["audioIsDefault"].as_bool().unwrap_or(false) {
            5
        } else {
            -1
        };
    }

    fmt
}

/// Derive `ext`, `vcodec` and `acodec` from the mime type.
fn parse_mime(fmt: &mut VideoFormat) {
    if fmt.mime_type.is_empty() {
        return;
    }
    let type_part = fmt
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    let Some((main_type, sub_type)) = type_part.split_once('/') else {
        return;
    };

    fmt.ext = match (main_type, sub_type) {
        ("audio", "mp4") => "m4a".to_string(),
        ("audio", "webm") => "webm".to_string(),
        (_, sub) => sub.to_string(),
    };

    let Some(codecs) = fmt
        .mime_type
        .split_once("codecs=\"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(codecs, _)| codecs)
    else {
        return;
    };

    match codecs.split_once(',') {
        Some((video, audio)) => {
            fmt.vcodec = video.trim().to_string();
            fmt.acodec = audio.trim().to_string();
        }
        None => {
            let codec = codecs.trim().to_string();
            if main_type == "audio" {
                fmt.acodec = codec;
            } else {
                fmt.vcodec = codec;
            }
        }
    }
}

/// Decode a `signatureCipher` blob, decipher `s`, and build the playable
/// URL. A blob without both `s` and `url` yields nothing.
async fn rewrite_cipher_url(cipher: &str, decipher: &Decipher) -> Option<String> {
    let parsed = SignatureCipher::parse(cipher);
    let raw_url = parsed.url.filter(|u| !u.is_empty())?;
    let s = parsed.s.filter(|s| !s.is_empty())?;

    let sig = decipher.decipher_sig(&s).await;
    let separator = if raw_url.contains('?') { '&' } else { '?' };
    let sig_param = parsed.sp.unwrap_or_else(|| "sig".to_string());
    let url = format!("{}{}{}={}", raw_url, separator, sig_param, sig);

    Some(rewrite_n_param(&url, decipher).await)
}

/// Replace the `n` query parameter in-place when one exists.
async fn rewrite_n_param(url: &str, decipher: &Decipher) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };

    let n_value = parsed
        .query_pairs()
        .find(|(key, _)| key == "n")
        .map(|(_, value)| value.into_owned());
    let Some(n_value) = n_value else {
        return url.to_string();
    };

    let transformed = decipher.transform_n(&n_value).await;
    debug!("N-param transformation: {} -> {}", n_value, transformed);

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(key, value)| {
            if key == "n" {
                ("n".to_string(), transformed.clone())
            } else {
                (key.into_owned(), value.into_owned())
            }
        })
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    parsed.to_string()
}

fn str_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}
