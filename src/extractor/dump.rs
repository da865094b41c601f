//! yt-dlp compatible JSON rendering of extraction results, used by the
//! CLI's `--dump-json` and by downstream tools that already consume that
//! shape.

use crate::extractor::models::{VideoFormat, VideoInfo};
use serde_json::{json, Value};

/// One format in dump shape. `format_id` is the stringified itag; zero
/// width/height render as null; abr/vbr are derived from `tbr` for
/// single-axis formats.
pub fn format_json(format: &VideoFormat) -> Value {
    let mut value = json!({
        "format_id": format.itag.to_string(),
        "url": format.url,
        "filesize": format.content_length,
        "vcodec": format.vcodec,
        "acodec": format.acodec,
        "ext": format.ext,
        "fps": format.fps,
        "asr": format.audio_sample_rate,
        "audio_channels": format.audio_channels,
        "tbr": format.tbr,
    });

    let object = value.as_object_mut().unwrap();
    object.insert(
        "width".to_string(),
        if format.width > 0 {
            json!(format.width)
        } else {
            Value::Null
        },
    );
    object.insert(
        "height".to_string(),
        if format.height > 0 {
            json!(format.height)
        } else {
            Value::Null
        },
    );

    if format.tbr > 0.0 {
        if !format.has_video() && format.has_audio() {
            object.insert("abr".to_string(), json!(format.tbr));
            object.insert("vbr".to_string(), json!(0));
        } else if !format.has_audio() && format.has_video() {
            object.insert("vbr".to_string(), json!(format.tbr));
            object.insert("abr".to_string(), json!(0));
        }
    }

    if !format.language.is_empty() {
        object.insert("language".to_string(), json!(format.language));
        object.insert(
            "language_preference".to_string(),
            json!(format.language_preference),
        );
    }
    if !format.format_note.is_empty() {
        object.insert("format_note".to_string(), json!(format.format_note));
    }

    value
}

/// Full info dump in the field layout yt-dlp emits.
pub fn video_info_json(info: &VideoInfo) -> Value {
    json!({
        "id": info.id,
        "title": info.title,
        "fulltitle": info.title,
        "description": info.description,
        "uploader": info.uploader,
        "channel": info.channel,
        "channel_id": info.channel_id,
        "channel_url": info.channel_url,
        "upload_date": info.upload_date,
        "duration": info.duration,
        "duration_string": info.duration_string,
        "view_count": info.view_count,
        "age_limit": info.age_limit,
        "webpage_url": info.webpage_url,
        "thumbnail": info.thumbnail,
        "thumbnails": info.thumbnails,
        "categories": info.categories,
        "tags": info.tags,
        "live_status": info.live_status,
        "availability": info.availability,
        "extractor": info.extractor,
        "extractor_key": info.extractor_key,
        "formats": info.formats.iter().map(format_json).collect::<Vec<_>>(),
    })
}
