//! Player script fetching and caching.
//!
//! Given a video id, produce the JS source of the platform's player script
//! and its stable `player_id`. Scripts are cached process-wide, in memory
//! and on disk as `<cache_dir>/<player_id>.js`; the solver's preprocessed
//! artifact lives beside it as `<player_id>.jsc`.

use crate::net::HttpClient;
use crate::utils::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

const HOST: &str = "https://www.youtube.com";

/// A fetched player script
#[derive(Debug, Clone)]
pub struct PlayerScript {
    pub player_id: String,
    pub source: String,
}

/// Fetch result: the script plus the watch page it was discovered on. The
/// page is kept because the session scrapes visitor data and the PO token
/// out of its `ytcfg`.
#[derive(Debug, Clone)]
pub struct FetchedPlayer {
    pub script: PlayerScript,
    pub watch_page: String,
}

#[derive(Default)]
struct CacheSlot {
    script: Option<String>,
    artifact: Option<Vec<u8>>,
}

/// Process-wide script cache, held by the `Extractor` and shared by every
/// session. Memory map in front of the disk layout described above.
pub struct PlayerScriptCache {
    slots: Mutex<HashMap<String, CacheSlot>>,
    cache_dir: PathBuf,
}

impl PlayerScriptCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            cache_dir,
        }
    }

    pub fn get_script(&self, player_id: &str) -> Option<String> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(script) = slots.get(player_id).and_then(|s| s.script.clone()) {
            debug!("Player script {} found in memory cache", player_id);
            return Some(script);
        }

        let path = self.cache_dir.join(format!("{}.js", player_id));
        match std::fs::read_to_string(&path) {
            Ok(content) if !content.is_empty() => {
                debug!("Player script {} loaded from disk cache", player_id);
                slots.entry(player_id.to_string()).or_default().script = Some(content.clone());
                Some(content)
            }
            _ => None,
        }
    }

    pub fn put_script(&self, player_id: &str, content: &str) {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(player_id.to_string()).or_default().script = Some(content.to_string());

        if let Err(e) = std::fs::create_dir_all(&self.cache_dir) {
            warn!("Could not create cache dir: {}", e);
            return;
        }
        let path = self.cache_dir.join(format!("{}.js", player_id));
        if let Err(e) = std::fs::write(&path, content) {
            warn!("Could not write {}: {}", path.display(), e);
        }
    }

    /// The preprocessed solver artifact (`<player_id>.jsc`), loading of
    /// which bypasses the expensive player parse.
    pub fn get_artifact(&self, player_id: &str) -> Option<Vec<u8>> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(blob) = slots.get(player_id).and_then(|s| s.artifact.clone()) {
            return Some(blob);
        }

        let path = self.cache_dir.join(format!("{}.jsc", player_id));
        match std::fs::read(&path) {
            Ok(blob) if !blob.is_empty() => {
                debug!(
                    "Artifact for {} loaded from disk ({} bytes)",
                    player_id,
                    blob.len()
                );
                slots.entry(player_id.to_string()).or_default().artifact = Some(blob.clone());
                Some(blob)
            }
            _ => None,
        }
    }

    pub fn put_artifact(&self, player_id: &str, blob: &[u8]) {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(player_id.to_string()).or_default().artifact = Some(blob.to_vec());

        if std::fs::create_dir_all(&self.cache_dir).is_ok() {
            let path = self.cache_dir.join(format!("{}.jsc", player_id));
            if let Err(e) = std::fs::write(&path, blob) {
                warn!("Could not write {}: {}", path.display(), e);
            }
        }
    }

    pub fn clear(&self) {
        self.slots.lock().unwrap().clear();
        if self.cache_dir.exists() {
            let _ = std::fs::remove_dir_all(&self.cache_dir);
        }
    }
}

/// Downloads the watch page and resolves the player script for a video.
pub struct PlayerScriptFetcher<'a> {
    http: &'a HttpClient,
    cache: &'a PlayerScriptCache,
}

impl<'a> PlayerScriptFetcher<'a> {
    pub fn new(http: &'a HttpClient, cache: &'a PlayerScriptCache) -> Self {
        Self { http, cache }
    }

    pub async fn fetch(&self, video_id: &str, cancel: &CancellationToken) -> Result<FetchedPlayer> {
        let watch_url = format!("{}/watch?v={}", HOST, video_id);
        let page = self
            .http
            .get(&watch_url, &[("User-Agent", DESKTOP_USER_AGENT)], cancel)
            .await?;
        if !page.is_success() {
            return Err(Error::HttpStatus(page.status));
        }

        let script_url = extract_player_url(&page.body).ok_or_else(|| {
            Error::ExtractionFailed("player script URL not found in watch page".into())
        })?;
        let script_url = normalize_url(&script_url);
        let player_id = extract_player_id(&script_url).unwrap_or_else(|| "unknown".to_string());

        if let Some(source) = self.cache.get_script(&player_id) {
            info!("{}: Using cached player {}", video_id, player_id);
            return Ok(FetchedPlayer {
                script: PlayerScript { player_id, source },
                watch_page: page.body,
            });
        }

        info!("{}: Downloading player {}", video_id, player_id);
        let script = self
            .http
            .get(&script_url, &[("User-Agent", DESKTOP_USER_AGENT)], cancel)
            .await?;
        if !script.is_success() {
            return Err(Error::HttpStatus(script.status));
        }

        // Second store for a concurrently fetched script is idempotent
        self.cache.put_script(&player_id, &script.body);
        Ok(FetchedPlayer {
            script: PlayerScript {
                player_id,
                source: script.body,
            },
            watch_page: page.body,
        })
    }
}

/// Ordered extraction strategy: two fast string scans, then three regexes.
pub fn extract_player_url(webpage: &str) -> Option<String> {
    if let Some(url) = extract_assets_js_fast(webpage) {
        debug!("Player URL extracted via fast assets search");
        return Some(url);
    }
    if let Some(url) = extract_base_js_fast(webpage) {
        debug!("Player URL extracted via fast base.js search");
        return Some(url);
    }

    static SCRIPT_SRC: OnceLock<Regex> = OnceLock::new();
    static ASSETS_JS: OnceLock<Regex> = OnceLock::new();
    static GENERIC_BASE: OnceLock<Regex> = OnceLock::new();

    let script_src = SCRIPT_SRC.get_or_init(|| {
        Regex::new(r#"<script\s+[^>]*src="([^"]+player_ias[^"]+base\.js)"[^>]*>"#).unwrap()
    });
    if let Some(m) = script_src.captures(webpage) {
        debug!("Player URL extracted via script_src regex");
        return Some(m[1].to_string());
    }

    let assets_js = ASSETS_JS
        .get_or_init(|| Regex::new(r#""assets"\s*:\s*\{\s*"js"\s*:\s*"([^"]+)""#).unwrap());
    if let Some(m) = assets_js.captures(webpage) {
        debug!("Player URL extracted via assets_js regex");
        return Some(m[1].to_string());
    }

    let generic_base =
        GENERIC_BASE.get_or_init(|| Regex::new(r"(/s/player/[a-zA-Z0-9._/-]+/base\.js)").unwrap());
    if let Some(m) = generic_base.captures(webpage) {
        debug!("Player URL extracted via generic_base regex");
        return Some(m[1].to_string());
    }

    None
}

// "assets":{"js":"..."} without paying for a regex pass over 500 KB of HTML
fn extract_assets_js_fast(webpage: &str) -> Option<String> {
    let pos = webpage.find("\"assets\"")?;
    let js_pos = webpage[pos..].find("\"js\":\"").map(|p| p + pos)?;
    if js_pos > pos + 100 {
        return None;
    }
    let url_start = js_pos + "\"js\":\"".len();
    let url_end = webpage[url_start..].find('"')? + url_start;
    Some(webpage[url_start..url_end].to_string())
}

// Locate "/s/player/", then walk back to the URL start and forward to the
// "base.js" suffix
fn extract_base_js_fast(webpage: &str) -> Option<String> {
    let pos = webpage.find("/s/player/")?;
    let base_pos = webpage[pos..].find("base.js").map(|p| p + pos)?;
    if base_pos > pos + 200 {
        return None;
    }
    let url_end = base_pos + "base.js".len();

    let bytes = webpage.as_bytes();
    let mut url_start = pos;
    while url_start > 0 {
        match bytes[url_start - 1] {
            b'"' | b'\'' | b' ' | b'=' => break,
            _ => url_start -= 1,
        }
    }
    Some(webpage[url_start..url_end].to_string())
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else if url.starts_with('/') {
        format!("{}{}", HOST, url)
    } else {
        format!("{}/{}", HOST, url)
    }
}

/// `player_id` is the path component immediately following `/player/`.
pub fn extract_player_id(url: &str) -> Option<String> {
    let pos = url.find("/player/")?;
    let id_start = pos + "/player/".len();
    let rest = &url[id_start..];
    let id_end = rest
        .find('/')
        .or_else(|| rest.find('?'))
        .unwrap_or(rest.len());
    if id_end == 0 {
        return None;
    }
    Some(rest[..id_end].to_string())
}
