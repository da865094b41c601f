//! Innertube client profiles and the parallel player-API fan-out.
//!
//! The platform's private JSON-RPC answers differently depending on which
//! client it believes is asking. A fixed table of emulated clients is
//! queried concurrently; every OK response feeds the format assembler.

use crate::net::HttpClient;
use crate::utils::error::{Error, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const API_HOST: &str = "https://www.youtube.com";

/// One emulated client variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub name: &'static str,
    pub version: &'static str,
    pub user_agent: &'static str,
    pub os_name: &'static str,
    pub os_version: &'static str,
    pub platform: &'static str,
    pub device_make: &'static str,
    pub device_model: &'static str,
    pub client_id: i32,
}

// Client priority: android_sdkless (no POT) > tv > web_safari (HLS) > web

/// ANDROID without SDK checks. Best choice: no PO token needed for most
/// videos. The empty deviceMake/deviceModel is what distinguishes it from
/// the stock ANDROID profile.
pub const ANDROID_SDKLESS: ClientProfile = ClientProfile {
    name: "ANDROID",
    version: "20.10.38",
    user_agent: "com.google.android.youtube/20.10.38 (Linux; U; Android 11) gzip",
    os_name: "Android",
    os_version: "11",
    platform: "MOBILE",
    device_make: "",
    device_model: "",
    client_id: 3,
};

/// Stock Android app. May require a PO token for some videos.
pub const ANDROID: ClientProfile = ClientProfile {
    name: "ANDROID",
    version: "20.10.38",
    user_agent: "com.google.android.youtube/20.10.38 (Linux; U; Android 11) gzip",
    os_name: "Android",
    os_version: "11",
    platform: "MOBILE",
    device_make: "Google",
    device_model: "Pixel 5",
    client_id: 3,
};

/// iPhone app. HLS live streams, 60fps formats on newer devices.
pub const IOS: ClientProfile = ClientProfile {
    name: "IOS",
    version: "20.10.4",
    user_agent: "com.google.ios.youtube/20.10.4 (iPhone16,2; U; CPU iOS 18_3_2 like Mac OS X;)",
    os_name: "iPhone",
    os_version: "18.3.2.22D82",
    platform: "MOBILE",
    device_make: "Apple",
    device_model: "iPhone16,2",
    client_id: 5,
};

/// Smart TV / Cobalt browser. Wide format availability, no PO token.
pub const TV: ClientProfile = ClientProfile {
    name: "TVHTML5",
    version: "7.20250923.13.00",
    user_agent: "Mozilla/5.0 (ChromiumStylePlatform) Cobalt/Version",
    os_name: "",
    os_version: "",
    platform: "TV",
    device_make: "",
    device_model: "",
    client_id: 7,
};

/// Safari user agent. Returns pre-merged video+audio HLS formats.
pub const WEB_SAFARI: ClientProfile = ClientProfile {
    name: "WEB",
    version: "2.20250925.01.00",
    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/15.5 Safari/605.1.15,gzip(gfe)",
    os_name: "Macintosh",
    os_version: "10.15.7",
    platform: "DESKTOP",
    device_make: "Apple",
    device_model: "Macintosh",
    client_id: 1,
};

/// Standard web browser. Requires the JS player for deciphering.
pub const WEB: ClientProfile = ClientProfile {
    name: "WEB",
    version: "2.20250925.01.00",
    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like \
         Gecko) Chrome/121.0.0.0 Safari/537.36",
    os_name: "Windows",
    os_version: "10.0",
    platform: "DESKTOP",
    device_make: "",
    device_model: "",
    client_id: 1,
};

/// Mobile web with an iPad user agent. Has 'ultralow' formats.
pub const MWEB: ClientProfile = ClientProfile {
    name: "MWEB",
    version: "2.20250925.01.00",
    user_agent: "Mozilla/5.0 (iPad; CPU OS 16_7_10 like Mac OS X) AppleWebKit/605.1.15 \
         (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1,gzip(gfe)",
    os_name: "iPad",
    os_version: "16.7.10",
    platform: "MOBILE",
    device_make: "Apple",
    device_model: "iPad",
    client_id: 2,
};

/// Extraction set, in priority order
pub const DEFAULT_CLIENTS: [&ClientProfile; 4] = [&ANDROID_SDKLESS, &TV, &WEB_SAFARI, &WEB];

/// Tokens scraped from the landing pages, threaded into the fan-out
#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    /// From the web `ytcfg`, injected into WEB/MWEB contexts
    pub visitor_data: String,
    pub po_token: String,
    /// From the TV landing page, sent as `X-Goog-Visitor-Id` on the TV call
    pub tv_visitor_data: String,
}

/// Compose the request context for one client.
pub fn build_context(profile: &ClientProfile, visitor_data: &str, po_token: &str) -> Value {
    let mut client = json!({
        "clientName": profile.name,
        "clientVersion": profile.version,
        "hl": "en",
        "gl": "US",
        "timeZone": "UTC",
    });
    {
        let client = client.as_object_mut().unwrap();
        // Only non-empty fields go on the wire
        for (key, value) in [
            ("osName", profile.os_name),
            ("osVersion", profile.os_version),
            ("platform", profile.platform),
            ("deviceMake", profile.device_make),
            ("deviceModel", profile.device_model),
            ("userAgent", profile.user_agent),
        ] {
            if !value.is_empty() {
                client.insert(key.to_string(), json!(value));
            }
        }
        if !visitor_data.is_empty() {
            client.insert("visitorData".to_string(), json!(visitor_data));
        }
    }

    let mut context = json!({ "context": { "client": client } });
    if !po_token.is_empty() {
        context["context"]["serviceIntegrityDimensions"] = json!({ "poToken": po_token });
    }
    context
}

/// Header set sent with every Innertube call.
pub fn build_headers(profile: &ClientProfile) -> Vec<(String, String)> {
    vec![
        ("User-Agent".into(), profile.user_agent.into()),
        ("Content-Type".into(), "application/json".into()),
        ("X-YouTube-Client-Name".into(), profile.client_id.to_string()),
        ("X-YouTube-Client-Version".into(), profile.version.into()),
        ("X-Goog-Api-Format-Version".into(), "1".into()),
        ("Origin".into(), API_HOST.into()),
    ]
}

/// One player-API call. Responses with a non-OK `playabilityStatus` are
/// errors here; the fan-out logs and drops them.
pub async fn fetch_player_response(
    http: &HttpClient,
    video_id: &str,
    profile: &ClientProfile,
    tokens: &SessionTokens,
    cancel: &CancellationToken,
) -> Result<Value> {
    let (visitor_data, po_token) = match profile.name {
        "WEB" | "MWEB" => (tokens.visitor_data.as_str(), tokens.po_token.as_str()),
        _ => ("", ""),
    };

    let mut payload = build_context(profile, visitor_data, po_token);
    {
        let payload = payload.as_object_mut().unwrap();
        payload.insert("videoId".to_string(), json!(video_id));
        payload.insert("contentCheckOk".to_string(), json!(true));
        payload.insert("racyCheckOk".to_string(), json!(true));
    }

    let mut headers = build_headers(profile);
    if profile.name == "TVHTML5" && !tokens.tv_visitor_data.is_empty() {
        headers.push(("X-Goog-Visitor-Id".into(), tokens.tv_visitor_data.clone()));
    }
    let header_refs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let url = format!("{}/youtubei/v1/player", API_HOST);
    let response = http
        .post(&url, payload.to_string(), &header_refs, cancel)
        .await?;
    if !response.is_success() {
        return Err(Error::HttpStatus(response.status));
    }

    let body: Value = serde_json::from_str(&response.body)?;
    let status = body["playabilityStatus"]["status"]
        .as_str()
        .unwrap_or("UNKNOWN");
    if status != "OK" {
        warn!(
            "Video unplayable with client {} ({}): {}",
            profile.name, profile.client_id, status
        );
        return Err(Error::VideoNotFound);
    }
    Ok(body)
}

/// A response that survived the fan-out, tagged with its client
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub client_name: &'static str,
    pub body: Value,
}

/// Query every profile concurrently. The returned list preserves arrival
/// order, not profile order; the first entry is the metadata source.
pub async fn fan_out(
    http: &Arc<HttpClient>,
    video_id: &str,
    profiles: &[&'static ClientProfile],
    tokens: &SessionTokens,
    cancel: &CancellationToken,
) -> Vec<ClientResponse> {
    let (tx, mut rx) = mpsc::channel::<ClientResponse>(profiles.len().max(1));

    for &profile in profiles {
        let http = http.clone();
        let tx = tx.clone();
        let tokens = tokens.clone();
        let video_id = video_id.to_string();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            info!("{}: Downloading {} player API JSON", video_id, profile.name);
            match fetch_player_response(&http, &video_id, profile, &tokens, &cancel).await {
                Ok(body) => {
                    let _ = tx
                        .send(ClientResponse {
                            client_name: profile.name,
                            body,
                        })
                        .await;
                }
                Err(e) => {
                    debug!("Client {} failed: {}", profile.name, e);
                }
            }
        });
    }
    drop(tx);

    let mut responses = Vec::with_capacity(profiles.len());
    while let Some(response) = rx.recv().await {
        responses.push(response);
    }
    responses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_skips_empty_device_fields() {
        let ctx = build_context(&ANDROID_SDKLESS, "", "");
        let client = &ctx["context"]["client"];
        assert_eq!(client["clientName"], "ANDROID");
        assert_eq!(client["osName"], "Android");
        assert!(client.get("deviceMake").is_none());
        assert!(client.get("deviceModel").is_none());
        assert!(ctx["context"].get("serviceIntegrityDimensions").is_none());
    }

    #[test]
    fn context_carries_tokens() {
        let ctx = build_context(&WEB, "visitor123", "pot456");
        assert_eq!(ctx["context"]["client"]["visitorData"], "visitor123");
        assert_eq!(
            ctx["context"]["serviceIntegrityDimensions"]["poToken"],
            "pot456"
        );
    }

    #[test]
    fn android_differs_from_sdkless_only_in_device() {
        let stock = build_context(&ANDROID, "", "");
        assert_eq!(stock["context"]["client"]["deviceMake"], "Google");
        assert_eq!(stock["context"]["client"]["deviceModel"], "Pixel 5");
    }

    #[test]
    fn headers_identify_client() {
        let headers = build_headers(&TV);
        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(find("X-YouTube-Client-Name"), Some("7"));
        assert_eq!(find("X-YouTube-Client-Version"), Some("7.20250923.13.00"));
        assert_eq!(find("X-Goog-Api-Format-Version"), Some("1"));
        assert_eq!(find("Origin"), Some("https://www.youtube.com"));
    }

    #[test]
    fn default_client_priority() {
        assert_eq!(DEFAULT_CLIENTS[0].client_id, 3);
        assert_eq!(DEFAULT_CLIENTS[1].client_id, 7);
        assert_eq!(DEFAULT_CLIENTS.len(), 4);
    }
}
