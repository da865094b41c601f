//! Recovery of the player script's two URL transforms.
//!
//! Two implementations behind one interface, tried in order:
//!
//! * **Primary** — the embedded challenge-solver bundle. `load` feeds the
//!   whole player source to the bundle's `jsc` entry, which returns a
//!   preprocessed-player blob; the blob is pinned to the runtime global and
//!   reused for every sig/n request (and cached on disk via the player
//!   script cache, so later loads of the same player skip the scan).
//! * **Fallback** — regex and string scanning that pulls the two function
//!   bodies (plus the signature helper object) straight out of the player
//!   source and evaluates them in the runtime.
//!
//! Both transforms are identity when loading never succeeded or a given
//! input fails to transform; callers never see an error.

use crate::extractor::player_script::{PlayerScript, PlayerScriptCache};
use crate::js::JsRuntime;
use crate::utils::error::Result;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const SOLVER_BUNDLE: &str = include_str!("../../assets/jsc_solver.js");

#[derive(Debug, Clone)]
enum Backend {
    Unloaded,
    Primary,
    Fallback {
        sig_fn: Option<String>,
        n_fn: Option<String>,
    },
}

pub struct Decipher {
    runtime: Arc<JsRuntime>,
    backend: Mutex<Backend>,
    bundle_loaded: std::sync::atomic::AtomicBool,
}

impl Decipher {
    pub fn new(runtime: Arc<JsRuntime>) -> Self {
        Self {
            runtime,
            backend: Mutex::new(Backend::Unloaded),
            bundle_loaded: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Load transforms for `script`, consulting the preprocessed-artifact
    /// cache first. Returns whether any backend is ready afterwards.
    pub async fn load(&self, script: &PlayerScript, cache: &PlayerScriptCache) -> bool {
        if let Some(blob) = cache.get_artifact(&script.player_id) {
            let artifact = String::from_utf8_lossy(&blob).into_owned();
            if self.load_primary_artifact(&artifact, &script.player_id).await {
                debug!("Decipher loaded from cached artifact {}", script.player_id);
                return true;
            }
        }

        if self.load_primary(&script.source, &script.player_id).await {
            if let Some(artifact) = self.export_preprocessed().await {
                cache.put_artifact(&script.player_id, artifact.as_bytes());
            }
            return true;
        }

        debug!("Primary decipher load failed, trying fallback");
        self.load_fallback(&script.source).await
    }

    /// Rewrite an encrypted signature. Identity on any failure.
    pub async fn decipher_sig(&self, signature: &str) -> String {
        let backend = self.backend.lock().unwrap().clone();
        match backend {
            Backend::Unloaded => signature.to_string(),
            Backend::Primary => self
                .solve_primary("sig", signature)
                .await
                .unwrap_or_else(|| signature.to_string()),
            Backend::Fallback { sig_fn, .. } => match sig_fn {
                Some(name) => self.call_transform(&name, signature).await,
                None => signature.to_string(),
            },
        }
    }

    /// Rewrite an `n` throttling parameter. Identity on any failure.
    pub async fn transform_n(&self, n: &str) -> String {
        let backend = self.backend.lock().unwrap().clone();
        match backend {
            Backend::Unloaded => n.to_string(),
            Backend::Primary => self
                .solve_primary("n", n)
                .await
                .unwrap_or_else(|| n.to_string()),
            Backend::Fallback { n_fn, .. } => match n_fn {
                Some(name) => self.call_transform(&name, n).await,
                None => n.to_string(),
            },
        }
    }

    async fn call_transform(&self, function: &str, input: &str) -> String {
        match self
            .runtime
            .call_function(function, vec![input.to_string()])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                // ANDROID/TV formats never need deciphering, so a miss here
                // is routine, not an error.
                debug!("Transform {} failed: {}", function, e);
                input.to_string()
            }
        }
    }

    async fn ensure_bundle(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        if self.bundle_loaded.load(Ordering::Acquire) {
            return Ok(());
        }
        debug!("Loading solver bundle ({} bytes)", SOLVER_BUNDLE.len());
        self.runtime.evaluate(SOLVER_BUNDLE.to_string()).await?;
        self.bundle_loaded.store(true, Ordering::Release);
        Ok(())
    }

    async fn load_primary(&self, source: &str, player_id: &str) -> bool {
        if self.ensure_bundle().await.is_err() {
            return false;
        }

        // A previous session may have loaded this exact player already
        if !player_id.is_empty() {
            let check = format!(
                "globalThis._loaded_player_id === {}",
                json!(player_id)
            );
            if let Ok(value) = self.runtime.evaluate_and_get(check).await {
                if value == "true" {
                    debug!("Solver reusing already-loaded player {}", player_id);
                    *self.backend.lock().unwrap() = Backend::Primary;
                    return true;
                }
            }
        }

        let input = json!({
            "type": "player",
            "player": source,
            "requests": [],
            "output_preprocessed": true,
        });
        let call = format!("JSON.stringify(jsc({}))", input);
        let output = match self.runtime.evaluate_and_get(call).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Solver preprocessing failed: {}", e);
                return false;
            }
        };

        let output: serde_json::Value = match serde_json::from_str(&output) {
            Ok(v) => v,
            Err(e) => {
                debug!("Solver output unparseable: {}", e);
                return false;
            }
        };
        if output["type"] == "error" {
            debug!(
                "Solver error: {}",
                output["error"].as_str().unwrap_or("unknown")
            );
            return false;
        }

        let Some(preprocessed) = output["preprocessed_player"].as_str() else {
            debug!("Solver returned no preprocessed player");
            return false;
        };
        self.pin_preprocessed(preprocessed, player_id).await
    }

    /// Load straight from a cached preprocessed blob, skipping the scan.
    async fn load_primary_artifact(&self, artifact: &str, player_id: &str) -> bool {
        if artifact.is_empty() || self.ensure_bundle().await.is_err() {
            return false;
        }
        self.pin_preprocessed(artifact, player_id).await
    }

    async fn pin_preprocessed(&self, preprocessed: &str, player_id: &str) -> bool {
        let mut code = format!(
            "globalThis._preprocessed_player = {};",
            json!(preprocessed)
        );
        if !player_id.is_empty() {
            code.push_str(&format!(
                "globalThis._loaded_player_id = {};",
                json!(player_id)
            ));
        }
        if let Err(e) = self.runtime.evaluate(code).await {
            debug!("Could not pin preprocessed player: {}", e);
            return false;
        }
        *self.backend.lock().unwrap() = Backend::Primary;
        true
    }

    async fn export_preprocessed(&self) -> Option<String> {
        self.runtime
            .evaluate_and_get("globalThis._preprocessed_player || ''".to_string())
            .await
            .ok()
            .filter(|s| !s.is_empty())
    }

    async fn solve_primary(&self, kind: &str, challenge: &str) -> Option<String> {
        let input = json!({
            "type": "preprocessed",
            "preprocessed_player": "",
            "requests": [{ "type": kind, "challenges": [challenge] }],
        });
        let call = format!(
            "(function() {{ var input = {}; \
             input.preprocessed_player = globalThis._preprocessed_player; \
             return JSON.stringify(jsc(input)); }})()",
            input
        );

        let output = match self.runtime.evaluate_and_get(call).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Solver {} request failed: {}", kind, e);
                return None;
            }
        };
        let output: serde_json::Value = serde_json::from_str(&output).ok()?;
        if output["type"] != "result" {
            return None;
        }
        output["responses"][0]["data"][challenge]
            .as_str()
            .map(String::from)
    }

    /// Regex/string-scan fallback, used only when the solver rejects the
    /// player. Finds the two function names, extracts their bodies plus the
    /// signature helper object, and evaluates them in the runtime.
    pub(crate) async fn load_fallback(&self, source: &str) -> bool {
        if source.is_empty() {
            return false;
        }
        debug!("Scanning player script ({} bytes)...", source.len());

        let Some(sig_name) = find_sig_function_name(source) else {
            debug!("Could not find signature function via string search");
            return false;
        };
        debug!("Found signature function name: {}", sig_name);

        let n_name = find_n_function_name(source);
        if let Some(ref name) = n_name {
            debug!("Found n-parameter function name: {}", name);
        } else {
            debug!("Could not find n-function; throttling mitigation unavailable");
        }

        let Some(sig_code) = extract_function(source, &sig_name) else {
            debug!("Signature function body extraction failed");
            return false;
        };

        let mut script = String::new();
        if let Some(helper_name) = find_helper_object_name(&sig_code) {
            debug!("Found signature helper object: {}", helper_name);
            match extract_helper_object(source, &helper_name) {
                Some(helper_code) => {
                    script.push_str(&helper_code);
                    script.push('\n');
                }
                None => {
                    debug!("Helper object extraction failed");
                    return false;
                }
            }
        }
        script.push_str(&sig_code);
        script.push('\n');

        let mut n_fn = None;
        if let Some(ref name) = n_name {
            if let Some(n_code) = extract_function(source, name) {
                script.push_str(&n_code);
                n_fn = Some(name.clone());
            }
        }

        debug!("Loading extracted script into JS engine ({} bytes)", script.len());
        if let Err(e) = self.runtime.evaluate(script).await {
            warn!("Evaluating extracted transforms failed: {}", e);
            return false;
        }

        if let Some(name) = n_fn.take() {
            let wrapper = format!(
                "function {0}_wrapper(a) {{ var r = {0}(a); \
                 return Array.isArray(r) ? r.join('') : r; }};",
                name
            );
            if self.runtime.evaluate(wrapper).await.is_err() {
                return false;
            }
            n_fn = Some(format!("{}_wrapper", name));
        }

        *self.backend.lock().unwrap() = Backend::Fallback {
            sig_fn: Some(sig_name),
            n_fn,
        };
        true
    }
}

/// Locate `a=a.split("` (or the single-quote form), then walk backward past
/// `function` and `=` collecting the identifier.
fn find_sig_function_name(code: &str) -> Option<String> {
    let split_pos = code
        .find("a=a.split(\"")
        .or_else(|| code.find("a=a.split('"))?;
    let func_pos = code[..split_pos].rfind("function")?;
    let eq_pos = code[..func_pos].rfind('=')?;

    let bytes = code.as_bytes();
    let mut start = eq_pos;
    while start > 0 && is_ident_char(bytes[start - 1]) {
        start -= 1;
    }
    if start == eq_pos {
        return None;
    }
    Some(code[start..eq_pos].to_string())
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'$' || b == b'_'
}

/// The three ordered n-function idioms. The regex crate has no
/// backreferences, so candidates come from a shared prefix pattern and each
/// body is checked against the bound parameter name explicitly.
fn find_n_function_name(code: &str) -> Option<String> {
    use std::sync::OnceLock;
    static CANDIDATE: OnceLock<Regex> = OnceLock::new();
    let candidate = CANDIDATE.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9$_]+)\s*=\s*function\s*\(\s*([a-zA-Z0-9$_]+)\s*\)\s*\{").unwrap()
    });

    #[derive(Clone, Copy)]
    enum Idiom {
        QuotedSplit,
        VarSplit,
        LooseSplit,
    }

    for idiom in [Idiom::QuotedSplit, Idiom::VarSplit, Idiom::LooseSplit] {
        for caps in candidate.captures_iter(code) {
            let name = &caps[1];
            let param = &caps[2];
            let body_start = caps.get(0).unwrap().end();
            let rest = &code[body_start..];

            let matched = match idiom {
                // <name>=function(a){ … a.split("…") … } before the first `}`
                Idiom::QuotedSplit => {
                    let body = &rest[..rest.find('}').unwrap_or(rest.len())];
                    let pattern = format!(
                        r#"{}\s*\.split\s*\(\s*["'][^"']*["']\s*\)"#,
                        regex::escape(param)
                    );
                    Regex::new(&pattern).map(|re| re.is_match(body)).unwrap_or(false)
                }
                // <name>=function(a){ … var b=a.split( … }
                Idiom::VarSplit => {
                    let body = &rest[..rest.find('}').unwrap_or(rest.len())];
                    let pattern = format!(
                        r"var\s+[a-zA-Z0-9$_]+\s*=\s*{}\s*\.split\s*\(",
                        regex::escape(param)
                    );
                    Regex::new(&pattern).map(|re| re.is_match(body)).unwrap_or(false)
                }
                // Loosest form: any <param>.split( before nesting starts
                Idiom::LooseSplit => {
                    if name.len() > 30 || param.len() > 10 {
                        false
                    } else {
                        let end = rest
                            .find(['{', '}'])
                            .unwrap_or(rest.len());
                        let body = &rest[..end];
                        let pattern =
                            format!(r"{}\s*\.split\s*\(", regex::escape(param));
                        Regex::new(&pattern).map(|re| re.is_match(body)).unwrap_or(false)
                    }
                }
            };

            if matched {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Helper object referenced as `<Name>.<method>(a, …)` inside the signature
/// function body.
fn find_helper_object_name(sig_code: &str) -> Option<String> {
    use std::sync::OnceLock;
    static HELPER: OnceLock<Regex> = OnceLock::new();
    let helper = HELPER.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9$_]+)\.[a-zA-Z0-9$_]+\s*\(\s*a\s*,").unwrap()
    });
    helper.captures(sig_code).map(|c| c[1].to_string())
}

/// Extract `<name>=function … { … }` by balanced-brace scan.
fn extract_function(code: &str, name: &str) -> Option<String> {
    let search = format!("{}=function", name);
    let start = code.find(&search)?;
    let end = scan_balanced(code, start)?;
    Some(format!("{};", &code[start..end]))
}

/// Extract `var <name>={ … }` (or the bare `<name>={ … }` form).
fn extract_helper_object(code: &str, name: &str) -> Option<String> {
    let start = code
        .find(&format!("var {}={{", name))
        .or_else(|| code.find(&format!("{}={{", name)))?;
    let end = scan_balanced(code, start)?;
    Some(format!("{};", &code[start..end]))
}

/// Position one past the brace closing the block opened at or after `start`.
/// Unbalanced input fails the scan.
fn scan_balanced(code: &str, start: usize) -> Option<usize> {
    let open = code[start..].find('{')? + start;
    let mut balance = 1usize;
    let mut pos = open + 1;
    let bytes = code.as_bytes();
    while balance > 0 && pos < bytes.len() {
        match bytes[pos] {
            b'{' => balance += 1,
            b'}' => balance -= 1,
            _ => {}
        }
        pos += 1;
    }
    if balance != 0 {
        return None;
    }
    Some(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The n-function reverses nothing and uppercases; the sig function
    // reverses through a helper object.
    const CANNED_PLAYER: &str = concat!(
        "var ncd=function(a){var b=a.split(\"\");return b.join(\"\").toUpperCase()};\n",
        "var Xk={rv:function(a,b){a.reverse()}};\n",
        "var abc=function(a){a=a.split(\"\");Xk.rv(a,0);return a.join(\"\")};\n",
    );

    fn canned_script() -> PlayerScript {
        PlayerScript {
            player_id: "canned01".into(),
            source: CANNED_PLAYER.into(),
        }
    }

    #[test]
    fn sig_name_discovery() {
        assert_eq!(find_sig_function_name(CANNED_PLAYER).unwrap(), "abc");
        assert!(find_sig_function_name("no transforms here").is_none());
    }

    #[test]
    fn n_name_discovery() {
        assert_eq!(find_n_function_name(CANNED_PLAYER).unwrap(), "ncd");
        assert!(find_n_function_name("var x = 1;").is_none());
    }

    #[test]
    fn helper_object_discovery() {
        let sig_code = extract_function(CANNED_PLAYER, "abc").unwrap();
        assert_eq!(find_helper_object_name(&sig_code).unwrap(), "Xk");
    }

    #[test]
    fn function_extraction_balanced() {
        let code = extract_function(CANNED_PLAYER, "abc").unwrap();
        assert!(code.starts_with("abc=function"));
        assert!(code.ends_with("};"));

        // Unbalanced braces fail the scan
        assert!(extract_function("bad=function(a){a=a.split(\"", "bad").is_none());
    }

    #[tokio::test]
    async fn transforms_are_identity_before_load() {
        let decipher = Decipher::new(Arc::new(crate::js::JsRuntime::new().unwrap()));
        assert_eq!(decipher.decipher_sig("abc").await, "abc");
        assert_eq!(decipher.transform_n("xy").await, "xy");
    }

    #[tokio::test]
    async fn primary_load_and_transforms() {
        let runtime = Arc::new(crate::js::JsRuntime::new().unwrap());
        let decipher = Decipher::new(runtime);
        assert!(decipher.load_primary(CANNED_PLAYER, "canned01").await);

        assert_eq!(decipher.decipher_sig("abc").await, "cba");
        assert_eq!(decipher.transform_n("xy").await, "XY");

        // Same player id short-circuits to the already-pinned blob
        assert!(decipher.load_primary(CANNED_PLAYER, "canned01").await);
        assert_eq!(decipher.decipher_sig("abc").await, "cba");
    }

    #[tokio::test]
    async fn primary_rejects_scriptless_player() {
        let runtime = Arc::new(crate::js::JsRuntime::new().unwrap());
        let decipher = Decipher::new(runtime);
        assert!(!decipher.load_primary("var nothing = true;", "p").await);
    }

    #[tokio::test]
    async fn fallback_load_and_transforms() {
        let runtime = Arc::new(crate::js::JsRuntime::new().unwrap());
        let decipher = Decipher::new(runtime);
        assert!(decipher.load_fallback(CANNED_PLAYER).await);

        assert_eq!(decipher.decipher_sig("abc").await, "cba");
        assert_eq!(decipher.transform_n("xy").await, "XY");
        // Unmatched input family still round-trips
        assert_eq!(decipher.decipher_sig("").await, "");
    }

    #[tokio::test]
    async fn load_caches_artifact_for_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PlayerScriptCache::new(dir.path().to_path_buf());
        let runtime = Arc::new(crate::js::JsRuntime::new().unwrap());

        let decipher = Decipher::new(runtime.clone());
        assert!(decipher.load(&canned_script(), &cache).await);
        assert!(cache.get_artifact("canned01").is_some());
        assert_eq!(decipher.decipher_sig("abc").await, "cba");

        // A fresh decipher on a fresh runtime resolves through the artifact
        let runtime2 = Arc::new(crate::js::JsRuntime::new().unwrap());
        let decipher2 = Decipher::new(runtime2);
        assert!(decipher2.load(&canned_script(), &cache).await);
        assert_eq!(decipher2.decipher_sig("abc").await, "cba");
        assert_eq!(decipher2.transform_n("xy").await, "XY");
    }
}
