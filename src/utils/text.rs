//! Small text utilities shared by the extraction pipeline: balanced-brace
//! JSON scanning, signature-cipher pair decoding, duration strings, and
//! lenient number parsing.

use crate::utils::error::{Error, Result};

/// Scan a balanced JSON object starting at the first `{` at or after
/// `start`. String literals and escapes are honoured so braces inside
/// strings do not unbalance the scan. Returns the object slice.
pub fn extract_json_object(source: &str, start: usize) -> Option<&str> {
    let bytes = source.as_bytes();
    let open = source[start..].find('{')? + start;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes[open..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[open..=open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Percent-decode a cipher value. `+` becomes a space; malformed escapes
/// pass through unchanged, matching lenient browser behaviour.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &input[i + 1..i + 3];
                if let Ok(v) = u8::from_str_radix(hex, 16) {
                    out.push(v);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// The three recognised fields of a `signatureCipher` blob.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SignatureCipher {
    pub s: Option<String>,
    pub sp: Option<String>,
    pub url: Option<String>,
}

impl SignatureCipher {
    /// Parse `&`-separated `key=value` pairs. This is deliberately not a
    /// full URL parser; only `s`, `sp` and `url` are kept.
    pub fn parse(cipher: &str) -> Self {
        let mut out = Self::default();
        for pair in cipher.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = percent_decode(value);
            match key {
                "s" => out.s = Some(value),
                "sp" => out.sp = Some(value),
                "url" => out.url = Some(value),
                _ => {}
            }
        }
        out
    }
}

/// Parse `H:MM:SS`, `M:SS` or plain seconds. Empty or garbage input is 0.
pub fn parse_duration_text(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    text.split(':')
        .fold(0u64, |acc, part| acc * 60 + part.parse::<u64>().unwrap_or(0))
}

/// Render seconds as `H:MM:SS` when >= 1 hour, else `M:SS`.
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Lenient numeric parse used all over Innertube JSON, where counts arrive
/// as strings. Non-numeric input yields the default instead of an error.
pub fn to_number_default<T>(text: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    text.trim().parse().unwrap_or(default)
}

/// Strict numeric parse for callers that need the failure surfaced.
pub fn parse_number<T>(text: &str) -> Result<T>
where
    T: std::str::FromStr,
{
    text.trim()
        .parse()
        .map_err(|_| Error::InvalidNumber(text.to_string()))
}

/// Replace characters that are unsafe in filenames on common filesystems.
/// Trailing spaces and dots are trimmed (Windows rejects them) and an empty
/// result falls back to `"video"`.
pub fn sanitize_filename(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    while result.ends_with(' ') || result.ends_with('.') {
        result.pop();
    }
    let result = result.trim_start().to_string();
    if result.is_empty() {
        return "video".to_string();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_nested() {
        let html = r#"ytcfg.set({"a":{"b":{"c":[1,2,{"d":"}"}]}},"e":"x"}); more"#;
        let start = html.find("ytcfg.set").unwrap();
        let obj = extract_json_object(html, start).unwrap();
        assert!(obj.starts_with('{') && obj.ends_with('}'));
        let v: serde_json::Value = serde_json::from_str(obj).unwrap();
        assert_eq!(v["e"], "x");
    }

    #[test]
    fn json_object_deeply_nested() {
        // 16 levels of nesting must not misbalance the scan
        let mut s = String::from("cfg=");
        for _ in 0..16 {
            s.push_str("{\"k\":");
        }
        s.push('1');
        for _ in 0..16 {
            s.push('}');
        }
        s.push_str(";rest");
        let obj = extract_json_object(&s, 0).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(obj).is_ok());
    }

    #[test]
    fn json_object_unterminated() {
        assert!(extract_json_object("x = {\"a\": {\"b\": 1}", 0).is_none());
    }

    #[test]
    fn cipher_pairs() {
        let c = SignatureCipher::parse("s=AB%3DCD&sp=sig&url=https%3A%2F%2Fhost%2Fv");
        assert_eq!(c.s.as_deref(), Some("AB=CD"));
        assert_eq!(c.sp.as_deref(), Some("sig"));
        assert_eq!(c.url.as_deref(), Some("https://host/v"));
    }

    #[test]
    fn cipher_pairs_missing_s() {
        let c = SignatureCipher::parse("url=https%3A%2F%2Fhost%2Fv");
        assert!(c.s.is_none());
        assert!(c.sp.is_none());
        assert_eq!(c.url.as_deref(), Some("https://host/v"));
    }

    #[test]
    fn percent_decode_malformed() {
        assert_eq!(percent_decode("a%ZZb"), "a%ZZb");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("tail%2"), "tail%2");
    }

    #[test]
    fn duration_parse() {
        assert_eq!(parse_duration_text(""), 0);
        assert_eq!(parse_duration_text("45"), 45);
        assert_eq!(parse_duration_text("3:33"), 213);
        assert_eq!(parse_duration_text("1:23:45"), 5025);
    }

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3665), "1:01:05");
        assert_eq!(format_duration(0), "0:00");
    }

    #[test]
    fn numbers() {
        assert_eq!(to_number_default::<i64>("123", 0), 123);
        assert_eq!(to_number_default::<i64>("abc", 7), 7);
        assert!(parse_number::<i32>("12x").is_err());
        assert_eq!(parse_number::<i32>(" 42 ").unwrap(), 42);
    }

    #[test]
    fn filename_sanitize() {
        assert_eq!(sanitize_filename("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_filename("  plain title "), "plain title");
        assert_eq!(sanitize_filename("ends with dots..."), "ends with dots");
        assert_eq!(sanitize_filename("tab\there"), "tab here");
        assert_eq!(sanitize_filename("???"), "___");
        assert_eq!(sanitize_filename("  . "), "video");
    }
}
