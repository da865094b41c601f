//! Session coordination: drives one extraction from URL to `VideoInfo`.
//!
//! The `Extractor` owns the long-lived pieces (HTTP client, JS runtime,
//! decipherer, player-script cache); each call to `extract` runs one
//! single-use session with its own cancellation token, a child of the
//! extractor's root token so `shutdown` reaches every live session.

use crate::extractor::assembler;
use crate::extractor::decipher::Decipher;
use crate::extractor::innertube::{self, SessionTokens, DEFAULT_CLIENTS, TV};
use crate::extractor::models::{SearchOptions, SearchResult, VideoInfo};
use crate::extractor::player_script::{PlayerScriptCache, PlayerScriptFetcher};
use crate::extractor::search;
use crate::js::JsRuntime;
use crate::net::HttpClient;
use crate::utils::error::{Error, Result};
use crate::utils::text::extract_json_object;
use crate::utils::Settings;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TV_CONFIG_URL: &str = "https://www.youtube.com/tv";

pub struct Extractor {
    http: Arc<HttpClient>,
    runtime: Arc<JsRuntime>,
    decipher: Arc<Decipher>,
    script_cache: Arc<PlayerScriptCache>,
    root_cancel: CancellationToken,
}

impl Extractor {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Arc::new(HttpClient::new(settings)?);
        let runtime = Arc::new(JsRuntime::new()?);
        let decipher = Arc::new(Decipher::new(runtime.clone()));
        let script_cache = Arc::new(PlayerScriptCache::new(settings.cache_dir.clone()));

        Ok(Self {
            http,
            runtime,
            decipher,
            script_cache,
            root_cancel: CancellationToken::new(),
        })
    }

    /// Extract everything about one video. A session is single-use; calling
    /// this again starts a fresh one.
    pub async fn extract(&self, url: &str) -> Result<VideoInfo> {
        let video_id =
            extract_video_id(url).ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        info!("Extracting URL: {}", url);

        let session = Session {
            video_id,
            cancel: self.root_cancel.child_token(),
        };
        session.run(self).await
    }

    /// Search the platform. `ytsearch…:` URLs parse into options through
    /// [`search::parse_search_url`].
    pub async fn search(&self, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        search::search(&self.http, options, &self.root_cancel.child_token()).await
    }

    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    /// Broadcast cancellation to every live session and stop the JS worker's
    /// current evaluation.
    pub fn shutdown(&self) {
        self.root_cancel.cancel();
        self.runtime.terminate_current();
    }
}

/// One extraction in flight
struct Session {
    video_id: String,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self, extractor: &Extractor) -> Result<VideoInfo> {
        info!("{}: Downloading webpage", self.video_id);

        // Branch A: player script -> decipher; Branch B: TV visitor data.
        // Both are best-effort; the fan-out starts once both settle.
        let branch_a = self.load_player(extractor);
        let branch_b = self.fetch_tv_visitor_data(extractor);
        let (mut tokens, tv_visitor_data) = tokio::join!(branch_a, branch_b);
        tokens.tv_visitor_data = tv_visitor_data.unwrap_or_default();

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let responses = innertube::fan_out(
            &extractor.http,
            &self.video_id,
            &DEFAULT_CLIENTS,
            &tokens,
            &self.cancel,
        )
        .await;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if responses.is_empty() {
            warn!("All clients failed to get video info");
            return Err(Error::VideoNotFound);
        }

        Ok(assembler::assemble(&self.video_id, &responses, &extractor.decipher).await)
    }

    /// Fetch the player script and load the decipherer. Failure only costs
    /// the formats that need deciphering, so it is logged, not returned.
    /// Also scrapes the watch page for WEB-client tokens.
    async fn load_player(&self, extractor: &Extractor) -> SessionTokens {
        let fetcher = PlayerScriptFetcher::new(&extractor.http, &extractor.script_cache);
        let fetched = match fetcher.fetch(&self.video_id, &self.cancel).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(
                    "Could not download player script: {}. Signature deciphering unavailable.",
                    e
                );
                return SessionTokens::default();
            }
        };

        if extractor
            .decipher
            .load(&fetched.script, &extractor.script_cache)
            .await
        {
            info!("Solving JS challenges using embedded engine");
        } else {
            warn!("Failed to load decipher functions. Downloads may fail.");
        }

        let mut tokens = SessionTokens::default();
        if let Some(visitor) = scrape_ytcfg(&fetched.watch_page).and_then(|c| visitor_data_in(&c))
        {
            debug!("Web visitor data scraped ({} chars)", visitor.len());
            tokens.visitor_data = visitor;
        }
        if let Some(po_token) = scrape_po_token(&fetched.watch_page) {
            debug!("PO token scraped ({} chars)", po_token.len());
            tokens.po_token = po_token;
        }
        tokens
    }

    /// Best-effort fetch of the TV landing page's visitor data, sent as
    /// `X-Goog-Visitor-Id` on the TV client call.
    async fn fetch_tv_visitor_data(&self, extractor: &Extractor) -> Option<String> {
        let response = extractor
            .http
            .get(TV_CONFIG_URL, &[("User-Agent", TV.user_agent)], &self.cancel)
            .await
            .ok()?;
        if !response.is_success() {
            debug!("TV config fetch returned status {}", response.status);
            return None;
        }
        let visitor = scrape_ytcfg(&response.body).and_then(|c| visitor_data_in(&c));
        match &visitor {
            Some(v) => debug!("TV visitor data scraped ({} chars)", v.len()),
            None => debug!("No visitor data in TV config"),
        }
        visitor
    }
}

/// Extract the 11-character video id. URL families, in precedence order:
/// `/watch?v=`, `/shorts/`, `/embed/`, `/v/`, `youtu.be/`.
pub fn extract_video_id(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path();

    if path == "/watch" {
        if let Some(id) = parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
        {
            if is_video_id(&id) {
                return Some(id);
            }
        }
    }

    for prefix in ["/shorts/", "/embed/", "/v/"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            let id = rest.split('/').next().unwrap_or_default();
            if is_video_id(id) {
                return Some(id.to_string());
            }
        }
    }

    if parsed.host_str().is_some_and(|h| h.contains("youtu.be")) {
        let id = path.trim_start_matches('/');
        let id = id.split('/').next().unwrap_or_default();
        if is_video_id(id) {
            return Some(id.to_string());
        }
    }

    None
}

fn is_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Locate `ytcfg.set({...})` and parse the balanced-braces object.
fn scrape_ytcfg(html: &str) -> Option<Value> {
    let marker = html.find("ytcfg.set(")?;
    let object = extract_json_object(html, marker)?;
    serde_json::from_str(object).ok()
}

/// Two known locations: top-level, then nested in the Innertube context.
fn visitor_data_in(config: &Value) -> Option<String> {
    config["VISITOR_DATA"]
        .as_str()
        .or_else(|| config["INNERTUBE_CONTEXT"]["client"]["visitorData"].as_str())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Substring probe for an inline `"poToken":"…"`.
fn scrape_po_token(html: &str) -> Option<String> {
    let marker = "\"poToken\":\"";
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')? + start;
    let token = &html[start..end];
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=aBcDeFgHiJk&t=30").unwrap(),
            "aBcDeFgHiJk"
        );
    }

    #[test]
    fn video_id_from_short_link() {
        assert_eq!(
            extract_video_id("https://youtu.be/aBcDeFgHiJk").unwrap(),
            "aBcDeFgHiJk"
        );
    }

    #[test]
    fn video_id_from_path_families() {
        for url in [
            "https://www.youtube.com/shorts/aBcDeFgHiJk",
            "https://www.youtube.com/embed/aBcDeFgHiJk?autoplay=1",
            "https://www.youtube.com/v/aBcDeFgHiJk",
        ] {
            assert_eq!(extract_video_id(url).unwrap(), "aBcDeFgHiJk", "{}", url);
        }
    }

    #[test]
    fn video_id_rejects_bad_input() {
        assert!(extract_video_id("https://example.com/watch?v=short").is_none());
        assert!(extract_video_id("https://www.youtube.com/watch").is_none());
        assert!(extract_video_id("not a url at all").is_none());
        assert!(extract_video_id("https://youtu.be/").is_none());
        assert!(extract_video_id("https://www.youtube.com/shorts/has spaces").is_none());
    }

    #[test]
    fn ytcfg_visitor_data_paths() {
        let html = r#"<script>ytcfg.set({"VISITOR_DATA":"CgtW_top","OTHER":1});</script>"#;
        let cfg = scrape_ytcfg(html).unwrap();
        assert_eq!(visitor_data_in(&cfg).unwrap(), "CgtW_top");

        let html = r#"ytcfg.set({"INNERTUBE_CONTEXT":{"client":{"visitorData":"CgtW_nested"}}});"#;
        let cfg = scrape_ytcfg(html).unwrap();
        assert_eq!(visitor_data_in(&cfg).unwrap(), "CgtW_nested");

        let html = r#"ytcfg.set({"NOTHING":true});"#;
        let cfg = scrape_ytcfg(html).unwrap();
        assert!(visitor_data_in(&cfg).is_none());
    }

    #[test]
    fn ytcfg_handles_deep_nesting() {
        let mut inner = String::from("\"visitorData\":\"deep\"");
        for _ in 0..14 {
            inner = format!("\"k\":{{{}}}", inner);
        }
        let html = format!("ytcfg.set({{{}}});", inner);
        assert!(scrape_ytcfg(&html).is_some());
    }

    #[test]
    fn po_token_probe() {
        let html = r#"{"serviceIntegrityDimensions":{"poToken":"MlbPOT-abc123"}}"#;
        assert_eq!(scrape_po_token(html).unwrap(), "MlbPOT-abc123");
        assert!(scrape_po_token(r#"{"poToken":""}"#).is_none());
        assert!(scrape_po_token("no token here").is_none());
    }
}
