//! Output filename templating with the `%(field)s` syntax.
//!
//! Supported fields: id, title, ext, uploader, channel, channel_id,
//! upload_date, duration, duration_string, view_count, description,
//! extractor, extractor_key. A precision such as `%(title).50s` is accepted
//! and ignored, matching how far the rest of the pipeline cares.

use crate::extractor::models::VideoInfo;
use crate::utils::text::format_duration;
use regex::Regex;
use std::sync::OnceLock;

/// Expand `template` against `info`. `ext` supplies the `%(ext)s` value
/// since the final container is only known after stream selection.
pub fn expand(template: &str, info: &VideoInfo, ext: &str) -> String {
    static FIELD: OnceLock<Regex> = OnceLock::new();
    let field = FIELD
        .get_or_init(|| Regex::new(r"%\(([A-Za-z_]+)\)(?:\.\d+)?s").unwrap());

    field
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match &caps[1] {
                "id" => info.id.clone(),
                "title" => info.title.clone(),
                "ext" => ext.to_string(),
                "uploader" => info.uploader.clone(),
                "channel" => info.channel.clone(),
                "channel_id" => info.channel_id.clone(),
                "upload_date" => info.upload_date.clone(),
                "description" => info.description.clone(),
                "duration" => info.duration.to_string(),
                "duration_string" => format_duration(info.duration),
                "view_count" => info.view_count.to_string(),
                "extractor" => info.extractor.clone(),
                "extractor_key" => info.extractor_key.clone(),
                // Unknown fields pass through untouched so typos are visible
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}
