//! Innertube search and the `ytsearch` URL grammar.

use crate::extractor::innertube::{build_context, build_headers, WEB};
use crate::extractor::models::{SearchOptions, SearchResult};
use crate::net::HttpClient;
use crate::utils::error::{Error, Result};
use crate::utils::text::parse_duration_text;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SEARCH_URL: &str = "https://www.youtube.com/youtubei/v1/search";

/// Filter: videos only
const PARAMS_VIDEOS: &str = "EgIQAQ==";
/// Sort by upload date, videos only
const PARAMS_VIDEOS_BY_DATE: &str = "CAISAhAB";

/// Run one search with the WEB profile.
pub async fn search(
    http: &HttpClient,
    options: &SearchOptions,
    cancel: &CancellationToken,
) -> Result<Vec<SearchResult>> {
    let mut payload = build_context(&WEB, "", "");
    {
        let payload = payload.as_object_mut().unwrap();
        payload.insert("query".to_string(), json!(options.query));
        let params = if options.sort_by_date {
            PARAMS_VIDEOS_BY_DATE
        } else {
            PARAMS_VIDEOS
        };
        payload.insert("params".to_string(), json!(params));
    }

    let headers = build_headers(&WEB);
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let response = http
        .post(SEARCH_URL, payload.to_string(), &header_refs, cancel)
        .await?;
    if !response.is_success() {
        return Err(Error::HttpStatus(response.status));
    }

    let body: Value = serde_json::from_str(&response.body)?;
    let mut results = parse_search_response(&body);
    debug!("Search returned {} results", results.len());
    results.truncate(options.max_results);
    Ok(results)
}

/// Walk the renderer tree down to every `videoRenderer`.
pub fn parse_search_response(body: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let sections = body["contents"]["twoColumnSearchResultsRenderer"]["primaryContents"]
        ["sectionListRenderer"]["contents"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    for section in sections {
        let items = section["itemSectionRenderer"]["contents"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default();
        for item in items {
            let renderer = &item["videoRenderer"];
            if !renderer.is_object() {
                continue;
            }
            if let Some(result) = parse_video_renderer(renderer) {
                results.push(result);
            }
        }
    }
    results
}

fn parse_video_renderer(renderer: &Value) -> Option<SearchResult> {
    let id = renderer["videoId"].as_str()?.to_string();

    let title = renderer["title"]["runs"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let owner = &renderer["ownerText"]["runs"][0];
    let channel = owner["text"].as_str().unwrap_or_default().to_string();
    let channel_id = owner["navigationEndpoint"]["browseEndpoint"]["browseId"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let duration = renderer["lengthText"]["simpleText"]
        .as_str()
        .map(parse_duration_text)
        .unwrap_or(0);

    let thumbnail = renderer["thumbnail"]["thumbnails"]
        .as_array()
        .and_then(|t| t.last())
        .and_then(|t| t["url"].as_str())
        .unwrap_or_default()
        .to_string();

    let view_count = renderer["viewCountText"]["simpleText"]
        .as_str()
        .map(|text| {
            let digits: String = text.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .unwrap_or(0);

    let published_time = renderer["publishedTimeText"]["simpleText"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    let description = renderer["detailedMetadataSnippets"][0]["snippetText"]["runs"]
        .as_array()
        .map(|runs| {
            runs.iter()
                .filter_map(|r| r["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    Some(SearchResult {
        id,
        title,
        channel,
        channel_id,
        duration,
        thumbnail,
        view_count,
        published_time,
        description,
    })
}

/// Parse the `ytsearch` URL shortcut:
/// `ytsearch:q` (1), `ytsearch<N>:q`, `ytsearchdate:q` (10, by date),
/// `ytsearchall:q` (100), `ytsearch<N>date:q`. Anything else is rejected.
pub fn parse_search_url(url: &str) -> Option<SearchOptions> {
    let rest = url.strip_prefix("ytsearch")?;
    let (selector, query) = rest.split_once(':')?;
    if query.is_empty() {
        return None;
    }

    let (max_results, sort_by_date) = match selector {
        "" => (1, false),
        "date" => (10, true),
        "all" => (100, false),
        selector => {
            let (digits, sort) = match selector.strip_suffix("date") {
                Some(digits) => (digits, true),
                None => (selector, false),
            };
            let n: usize = digits.parse().ok()?;
            if n == 0 {
                return None;
            }
            (n, sort)
        }
    };

    Some(SearchOptions {
        query: query.to_string(),
        max_results,
        sort_by_date,
    })
}

/// Canonical `ytsearch` form for the given options.
pub fn build_search_url(query: &str, max_results: usize, sort_by_date: bool) -> String {
    if sort_by_date {
        format!("ytsearch{}date:{}", max_results, query)
    } else {
        format!("ytsearch{}:{}", max_results, query)
    }
}
