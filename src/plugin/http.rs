//! Network half of the capability bridge
//!
//! `fetch` never fails from the script's point of view: transport errors,
//! malformed requests and oversized bodies come back as an envelope with
//! `ok: false`.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::error::{Result, ScraperError};

/// Response shape handed back to scripts as JSON
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchEnvelope {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl FetchEnvelope {
    /// Envelope for a request that never produced an HTTP response
    pub fn failure(url: &str, error: &ScraperError) -> Self {
        Self {
            ok: false,
            status: 0,
            status_text: error.to_string(),
            url: url.to_string(),
            body: String::new(),
            headers: HashMap::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"ok":false,"status":0,"statusText":"serialization failed","url":"","body":"","headers":{}}"#
                .to_string()
        })
    }
}

/// HTTP client shared by every sandbox execution
#[derive(Clone)]
pub struct BridgeHttp {
    client: reqwest::Client,
    user_agent: String,
    max_body: u64,
}

impl BridgeHttp {
    /// `max_body` bounds both the bytes read off the wire and the decoded body
    pub fn new(user_agent: &str, timeout: Duration, max_body: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ScraperError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            max_body,
        })
    }

    /// Perform one bridged request.
    ///
    /// `headers_json` is a JSON object of header names to values; an empty
    /// string means no extra headers.
    pub async fn fetch(&self, url: &str, method: &str, headers_json: &str, body: Option<String>) -> FetchEnvelope {
        match self.try_fetch(url, method, headers_json, body).await {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(url = %url, error = %e, error_type = e.error_type(), "Bridge fetch failed");
                FetchEnvelope::failure(url, &e)
            }
        }
    }

    async fn try_fetch(
        &self,
        url: &str,
        method: &str,
        headers_json: &str,
        body: Option<String>,
    ) -> Result<FetchEnvelope> {
        let start = Instant::now();
        let method = parse_method(method)?;
        let target = url::Url::parse(url)
            .map_err(|e| ScraperError::BridgeProtocol(format!("invalid url '{}': {}", url, e)))?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(ScraperError::BridgeProtocol(format!(
                "unsupported scheme '{}'",
                target.scheme()
            )));
        }

        let headers = self.build_headers(headers_json)?;
        let mut request = self.client.request(method.clone(), target).headers(headers);
        if let Some(body) = body {
            if method != Method::GET && method != Method::HEAD {
                request = request.body(body);
            }
        }

        let mut response = request.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        let mut headers = collect_headers(response.headers());
        let encoding = headers.get("content-encoding").cloned();

        if let Some(size) = response.content_length() {
            check_size(size, self.max_body)?;
        }
        let mut raw = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            raw.extend_from_slice(&chunk);
            check_size(raw.len() as u64, self.max_body)?;
        }

        let decoded = match encoding.as_deref() {
            Some(enc) if is_compressed(enc) => {
                headers.remove("content-encoding");
                headers.remove("content-length");
                decode_body(&raw, enc, self.max_body)?
            }
            _ => raw,
        };

        debug!(
            url = %url,
            status = status.as_u16(),
            bytes = decoded.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Bridge fetch completed"
        );

        Ok(FetchEnvelope {
            ok: status.is_success(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            url: final_url,
            body: String::from_utf8_lossy(&decoded).into_owned(),
            headers,
        })
    }

    /// Caller headers, with the bridge owning User-Agent defaults and encoding negotiation
    fn build_headers(&self, headers_json: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, ua);
        }

        for (name, value) in parse_header_object(headers_json)? {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!(header = %name, "Dropping invalid header name from script");
                continue;
            };
            if name == ACCEPT_ENCODING {
                continue;
            }
            let Ok(value) = HeaderValue::from_str(&value) else {
                warn!(header = %name, "Dropping invalid header value from script");
                continue;
            };
            headers.insert(name, value);
        }

        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        Ok(headers)
    }
}

fn parse_method(method: &str) -> Result<Method> {
    let method = method.trim();
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| ScraperError::BridgeProtocol(format!("invalid method '{}'", method)))
}

fn parse_header_object(headers_json: &str) -> Result<Vec<(String, String)>> {
    if headers_json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(headers_json)
        .map_err(|e| ScraperError::BridgeProtocol(format!("headers are not valid JSON: {}", e)))?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                Value::Number(n) => Some((k, n.to_string())),
                Value::Bool(b) => Some((k, b.to_string())),
                _ => None,
            })
            .collect()),
        _ => Err(ScraperError::BridgeProtocol("headers must be a JSON object".to_string())),
    }
}

fn collect_headers(map: &HeaderMap) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}

fn is_compressed(encoding: &str) -> bool {
    let encoding = encoding.trim().to_ascii_lowercase();
    encoding == "gzip" || encoding == "x-gzip" || encoding == "deflate"
}

fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(ScraperError::OversizedPayload { size, limit });
    }
    Ok(())
}

/// Decode a gzip or deflate body, reading at most `limit` decoded bytes.
///
/// Undecodable input is returned unchanged; output past `limit` is an
/// `OversizedPayload` error.
pub fn decode_body(raw: &[u8], encoding: &str, limit: u64) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let decoded = match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => inflate(GzDecoder::new(raw), limit, &mut out),
        // Servers disagree on whether deflate means zlib-wrapped or raw
        "deflate" => {
            inflate(ZlibDecoder::new(raw), limit, &mut out) || inflate(DeflateDecoder::new(raw), limit, &mut out)
        }
        _ => false,
    };

    if !decoded {
        debug!(encoding = %encoding, "Body could not be decoded, passing through raw bytes");
        return Ok(raw.to_vec());
    }
    check_size(out.len() as u64, limit)?;
    Ok(out)
}

fn inflate<R: Read>(decoder: R, limit: u64, out: &mut Vec<u8>) -> bool {
    out.clear();
    decoder.take(limit.saturating_add(1)).read_to_end(out).is_ok()
}

/// Break a URL into the parts the script-side URL polyfill needs.
///
/// Always returns a JSON object; `ok` is false when the input cannot be parsed.
pub fn parse_url(input: &str, base: Option<&str>) -> String {
    let parsed = match base.filter(|b| !b.is_empty()) {
        Some(base) => url::Url::parse(base).and_then(|b| b.join(input)),
        None => url::Url::parse(input),
    };

    let value = match parsed {
        Ok(u) => {
            let hostname = u.host_str().unwrap_or("").to_string();
            let port = u.port().map(|p| p.to_string()).unwrap_or_default();
            let host = if port.is_empty() {
                hostname.clone()
            } else {
                format!("{}:{}", hostname, port)
            };
            json!({
                "ok": true,
                "href": u.as_str(),
                "origin": u.origin().ascii_serialization(),
                "protocol": format!("{}:", u.scheme()),
                "username": u.username(),
                "password": u.password().unwrap_or(""),
                "host": host,
                "hostname": hostname,
                "port": port,
                "pathname": u.path(),
                "search": u.query().map(|q| format!("?{}", q)).unwrap_or_default(),
                "hash": u.fragment().map(|f| format!("#{}", f)).unwrap_or_default(),
            })
        }
        Err(e) => json!({ "ok": false, "error": format!("Invalid URL: {}", e) }),
    };
    value.to_string()
}
