//! Result normalization
//!
//! Scripts hand back loosely typed JSON. Coercion rules:
//! a field with the wrong type is dropped, an item without a usable url is
//! dropped, and nothing ever panics or errors on malformed input.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::types::ScraperResult;

/// Artifact left behind when a script string-concatenates an object
const STRINGIFIED_OBJECT: &str = "[object Object]";

/// Normalize the raw JSON captured from one scraper execution.
pub fn normalize(raw: &str, scraper_id: &str, scraper_name: &str) -> Vec<ScraperResult> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!(scraper_id = %scraper_id, error = %e, "Discarding unparseable scraper output");
            return Vec::new();
        }
    };
    normalize_value(&value, scraper_id, scraper_name)
}

/// Normalize an already parsed value.
pub fn normalize_value(value: &Value, scraper_id: &str, scraper_name: &str) -> Vec<ScraperResult> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        // Some scrapers wrap their list as { streams: [...] }
        Value::Object(obj) => match obj.get("streams") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    let total = items.len();
    let results: Vec<ScraperResult> = items
        .iter()
        .filter_map(|item| item.as_object())
        .filter_map(|obj| normalize_item(obj, scraper_id, scraper_name))
        .collect();

    if results.len() != total {
        debug!(
            scraper_id = %scraper_id,
            kept = results.len(),
            discarded = total - results.len(),
            "Discarded malformed scraper results"
        );
    }
    results
}

fn normalize_item(obj: &Map<String, Value>, scraper_id: &str, scraper_name: &str) -> Option<ScraperResult> {
    let url = extract_url(obj.get("url")?)?;

    Some(ScraperResult {
        url,
        title: string_field(obj, "title"),
        name: string_field(obj, "name"),
        quality: string_field(obj, "quality"),
        size: string_field(obj, "size"),
        language: string_field(obj, "language").or_else(|| string_field(obj, "lang")),
        provider: string_field(obj, "provider"),
        kind: string_field(obj, "type"),
        seeders: count_field(obj, "seeders").or_else(|| count_field(obj, "seeds")),
        peers: count_field(obj, "peers"),
        info_hash: string_field(obj, "infoHash"),
        headers: obj.get("headers").and_then(headers_field),
        scraper_id: scraper_id.to_string(),
        scraper_name: scraper_name.to_string(),
    })
}

/// Accept a url string, or an object carrying a nested `url` string.
fn extract_url(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("url")?.as_str()?,
        _ => return None,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(STRINGIFIED_OBJECT) {
        return None;
    }

    // Absolute URLs only, including magnet: and data: schemes
    url::Url::parse(trimmed).ok()?;
    Some(trimmed.to_string())
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match obj.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() || text.contains(STRINGIFIED_OBJECT) {
        None
    } else {
        Some(text)
    }
}

fn count_field(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    match obj.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn headers_field(value: &Value) -> Option<HashMap<String, String>> {
    let obj = value.as_object()?;
    let headers: HashMap<String, String> = obj
        .iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), v))
        })
        .collect();

    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}

/// Merge per-scraper batches: first occurrence of each url wins, capped at `max_items`.
pub fn merge<I>(batches: I, max_items: usize) -> Vec<ScraperResult>
where
    I: IntoIterator<Item = Vec<ScraperResult>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for result in batches.into_iter().flatten() {
        if merged.len() >= max_items {
            break;
        }
        if seen.insert(result.url.clone()) {
            merged.push(result);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_normalize_full_item() {
        let raw = json!([{
            "url": " https://cdn.example.com/v.m3u8 ",
            "title": "Movie 1080p",
            "name": "Alpha",
            "quality": 1080,
            "size": "2.1 GB",
            "lang": "en",
            "provider": "alpha",
            "type": "hls",
            "seeders": "1,204",
            "peers": 12.0,
            "infoHash": "abcdef",
            "headers": { "Referer": "https://example.com", "X-Num": 5, "Bad": {} }
        }])
        .to_string();

        let results = normalize(&raw, "alpha", "Alpha");
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.url, "https://cdn.example.com/v.m3u8");
        assert_eq!(r.quality.as_deref(), Some("1080"));
        assert_eq!(r.language.as_deref(), Some("en"));
        assert_eq!(r.kind.as_deref(), Some("hls"));
        assert_eq!(r.seeders, Some(1204));
        assert_eq!(r.peers, Some(12));
        let headers = r.headers.as_ref().unwrap();
        assert_eq!(headers.get("Referer").map(String::as_str), Some("https://example.com"));
        assert_eq!(headers.get("X-Num").map(String::as_str), Some("5"));
        assert!(!headers.contains_key("Bad"));
        assert_eq!(r.scraper_name, "Alpha");
    }

    #[test]
    fn test_normalize_discards_bad_urls() {
        let raw = json!([
            { "url": "" },
            { "url": "   " },
            { "url": "[object Object]" },
            { "url": "https://x/[object Object]" },
            { "url": "/relative/path.mp4" },
            { "url": 42 },
            { "title": "no url" },
            "not an object",
            { "url": { "url": "https://nested.example.com/a.mp4" } },
            { "url": "magnet:?xt=urn:btih:abcdef" }
        ])
        .to_string();

        let results = normalize(&raw, "s", "S");
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://nested.example.com/a.mp4", "magnet:?xt=urn:btih:abcdef"]);
    }

    #[test]
    fn test_normalize_non_array_inputs() {
        assert!(normalize("not json", "s", "S").is_empty());
        assert!(normalize("null", "s", "S").is_empty());
        assert!(normalize("{\"error\":\"x\"}", "s", "S").is_empty());
        let wrapped = json!({ "streams": [{ "url": "https://a.example.com" }] }).to_string();
        assert_eq!(normalize(&wrapped, "s", "S").len(), 1);
    }

    #[test]
    fn test_merge_dedups_and_keeps_sources() {
        let a = normalize(r#"[{"url":"http://a"},{"url":"http://a"}]"#, "one", "One");
        let b = normalize(r#"[{"url":"http://b"}]"#, "two", "Two");
        let merged = merge(vec![a, b], 100);
        let urls: Vec<&str> = merged.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a", "http://b"]);
        assert_eq!(merged[0].scraper_name, "One");
        assert_eq!(merged[1].scraper_name, "Two");
    }

    #[test]
    fn test_merge_caps_length() {
        let items: Vec<Value> = (0..20).map(|i| json!({ "url": format!("https://h/{}", i) })).collect();
        let batch = normalize(&Value::Array(items).to_string(), "s", "S");
        assert_eq!(merge(vec![batch], 5).len(), 5);
    }

    fn arb_url_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            "https://[a-c]{1,2}\\.example\\.com/[a-z]{0,3}".prop_map(Value::String),
            "[ a-z]{0,4}".prop_map(Value::String),
            Just(Value::String("[object Object]".into())),
            any::<i64>().prop_map(|n| json!(n)),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn prop_merged_results_are_valid(
            batches in prop::collection::vec(prop::collection::vec(arb_url_value(), 0..12), 0..6),
            max in 1usize..30,
        ) {
            let normalized: Vec<Vec<ScraperResult>> = batches
                .into_iter()
                .map(|urls| {
                    let items: Vec<Value> = urls.into_iter().map(|u| json!({ "url": u })).collect();
                    normalize_value(&Value::Array(items), "s", "S")
                })
                .collect();

            let merged = merge(normalized, max);
            prop_assert!(merged.len() <= max);

            let mut seen = HashSet::new();
            for r in &merged {
                prop_assert!(!r.url.trim().is_empty());
                prop_assert!(!r.url.contains(STRINGIFIED_OBJECT));
                prop_assert!(seen.insert(r.url.clone()));
            }
        }
    }
}
