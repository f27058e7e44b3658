//! Crypto library provisioning for the sandbox
//!
//! Scripts expect a CryptoJS-compatible global. The configured library source
//! is fetched (or read from disk) once and reused by every execution. When it
//! cannot be loaded, a small native-backed shim takes its place until the next
//! attempt, which is made no sooner than [`RETRY_AFTER`] later.

use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::core::error::{Result, ScraperError};

/// Minimum wait between failed library loads
pub const RETRY_AFTER: Duration = Duration::from_secs(60);

/// Script-side shim used when the real library is unavailable
const FALLBACK_SHIM: &str = r#"
(function () {
    const ops = Deno.core.ops;
    function words(hex) {
        return {
            hex: hex,
            sigBytes: hex.length / 2,
            toString(encoder) { return (encoder || enc.Hex).stringify(this); },
        };
    }
    const enc = {
        Hex: {
            stringify: (w) => w.hex,
            parse: (s) => words(ops.op_crypto_convert(String(s), 'hex', 'hex')),
        },
        Utf8: {
            stringify: (w) => ops.op_crypto_convert(w.hex, 'hex', 'utf8'),
            parse: (s) => words(ops.op_crypto_convert(String(s), 'utf8', 'hex')),
        },
        Base64: {
            stringify: (w) => ops.op_crypto_convert(w.hex, 'hex', 'base64'),
            parse: (s) => words(ops.op_crypto_convert(String(s), 'base64', 'hex')),
        },
    };
    enc.Latin1 = {
        stringify: (w) => ops.op_crypto_convert(w.hex, 'hex', 'latin1'),
        parse: (s) => words(ops.op_crypto_convert(String(s), 'latin1', 'hex')),
    };
    const input = (v) => (v && typeof v.hex === 'string') ? v.hex : enc.Utf8.parse(v).hex;
    const hasher = (alg) => (v) => words(ops.op_crypto_digest(alg, input(v)));
    globalThis.CryptoJS = {
        enc: enc,
        MD5: hasher('md5'),
        SHA224: hasher('sha224'),
        SHA256: hasher('sha256'),
        SHA384: hasher('sha384'),
        SHA512: hasher('sha512'),
    };
})();
"#;

/// Which implementation ended up installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoSource {
    Library(Arc<str>),
    Fallback,
}

impl CryptoSource {
    /// Script that defines `globalThis.CryptoJS`
    pub fn install_script(&self) -> String {
        match self {
            // Library is UMD; give it a CommonJS module to populate
            CryptoSource::Library(source) => format!(
                "try {{\n(function () {{\nvar module = {{ exports: {{}} }};\nvar exports = module.exports;\n{}\n;\nif (module.exports && module.exports.enc) {{ globalThis.CryptoJS = module.exports; }}\n}}).call(globalThis);\n}} catch (_) {{}}\nif (typeof globalThis.CryptoJS === 'undefined') {{\n{}\n}}\n",
                source, FALLBACK_SHIM
            ),
            CryptoSource::Fallback => FALLBACK_SHIM.to_string(),
        }
    }
}

/// Lazily loaded, process-wide cached crypto library
///
/// Only a successful load is cached.
pub struct CryptoLibrary {
    location: String,
    client: reqwest::Client,
    cell: OnceCell<Arc<str>>,
    last_failure: Mutex<Option<Instant>>,
    retry_after: Duration,
}

impl CryptoLibrary {
    pub fn new(location: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            location: location.into(),
            client,
            cell: OnceCell::new(),
            last_failure: Mutex::new(None),
            retry_after: RETRY_AFTER,
        }
    }

    /// Library with no source configured, always resolves to the shim
    pub fn fallback_only() -> Self {
        Self::new(String::new(), reqwest::Client::new())
    }

    /// Resolve the library, loading it on first use
    pub async fn source(&self) -> CryptoSource {
        if self.location.trim().is_empty() {
            return CryptoSource::Fallback;
        }
        if let Some(source) = self.cell.get() {
            return CryptoSource::Library(Arc::clone(source));
        }
        if self.backing_off() {
            debug!(location = %self.location, "Crypto library load backing off, using native shim");
            return CryptoSource::Fallback;
        }

        let loaded = self
            .cell
            .get_or_try_init(|| async { self.load().await.map(Arc::<str>::from) })
            .await;
        match loaded {
            Ok(source) => {
                info!(location = %self.location, bytes = source.len(), "Crypto library loaded");
                CryptoSource::Library(Arc::clone(source))
            }
            Err(e) => {
                if let Ok(mut last) = self.last_failure.lock() {
                    *last = Some(Instant::now());
                }
                warn!(
                    location = %self.location,
                    error = %e,
                    retry_after_secs = self.retry_after.as_secs(),
                    "Crypto library unavailable, using native shim"
                );
                CryptoSource::Fallback
            }
        }
    }

    fn backing_off(&self) -> bool {
        self.last_failure
            .lock()
            .ok()
            .and_then(|last| *last)
            .is_some_and(|at| at.elapsed() < self.retry_after)
    }

    async fn load(&self) -> Result<String> {
        let location = self.location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self
                .client
                .get(location)
                .timeout(Duration::from_secs(30))
                .send()
                .await?
                .error_for_status()?;
            Ok(response.text().await?)
        } else {
            Ok(tokio::fs::read_to_string(location).await?)
        }
    }
}

/// Native side of the shim's encoders: convert `data` between utf8, latin1, hex and base64
pub fn convert(data: &str, from: &str, to: &str) -> Result<String> {
    let bytes = match from {
        "utf8" => data.as_bytes().to_vec(),
        // Binary strings as produced by atob: one char per byte
        "latin1" => data.chars().map(|c| c as u32 as u8).collect(),
        "hex" => hex::decode(data.trim())
            .map_err(|e| ScraperError::BridgeProtocol(format!("invalid hex input: {}", e)))?,
        "base64" => general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| ScraperError::BridgeProtocol(format!("invalid base64 input: {}", e)))?,
        other => return Err(ScraperError::BridgeProtocol(format!("unknown encoding '{}'", other))),
    };

    match to {
        "utf8" => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        "latin1" => Ok(bytes.iter().map(|&b| b as char).collect()),
        "hex" => Ok(hex::encode(bytes)),
        "base64" => Ok(general_purpose::STANDARD.encode(bytes)),
        other => Err(ScraperError::BridgeProtocol(format!("unknown encoding '{}'", other))),
    }
}

/// Hash hex-encoded input, returning a hex digest
pub fn digest(algorithm: &str, input_hex: &str) -> Result<String> {
    let input = hex::decode(input_hex)
        .map_err(|e| ScraperError::BridgeProtocol(format!("invalid hex input: {}", e)))?;

    let out = match algorithm.to_ascii_lowercase().as_str() {
        "md5" => hex::encode(md5::compute(&input).0),
        "sha224" => hex::encode(Sha224::digest(&input)),
        "sha256" => hex::encode(Sha256::digest(&input)),
        "sha384" => hex::encode(Sha384::digest(&input)),
        "sha512" => hex::encode(Sha512::digest(&input)),
        other => return Err(ScraperError::BridgeProtocol(format!("unsupported digest '{}'", other))),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_convert_round_trips_encodings() {
        assert_eq!(convert("hi", "utf8", "hex").unwrap(), "6869");
        assert_eq!(convert("6869", "hex", "base64").unwrap(), "aGk=");
        assert_eq!(convert("aGk=", "base64", "utf8").unwrap(), "hi");
        assert_eq!(convert("\u{ff}\u{00}", "latin1", "hex").unwrap(), "ff00");
        assert_eq!(convert("/w==", "base64", "latin1").unwrap(), "\u{ff}");
        assert!(convert("zz", "hex", "utf8").is_err());
        assert!(convert("x", "rot13", "utf8").is_err());
    }

    #[test]
    fn test_digest_known_vectors() {
        let abc = convert("abc", "utf8", "hex").unwrap();
        assert_eq!(
            digest("sha256", &abc).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest("MD5", &abc).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
        assert!(digest("whirlpool", &abc).is_err());
    }

    #[tokio::test]
    async fn test_library_loaded_once_from_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crypto-js.min.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var CryptoJS = {};"))
            .expect(1)
            .mount(&server)
            .await;

        let library = CryptoLibrary::new(format!("{}/crypto-js.min.js", server.uri()), reqwest::Client::new());
        for _ in 0..3 {
            match library.source().await {
                CryptoSource::Library(src) => assert_eq!(&*src, "var CryptoJS = {};"),
                CryptoSource::Fallback => panic!("expected library source"),
            }
        }
    }

    #[tokio::test]
    async fn test_library_from_file_and_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"/* crypto */").unwrap();
        let from_file = CryptoLibrary::new(file.path().to_string_lossy().to_string(), reqwest::Client::new());
        assert!(matches!(from_file.source().await, CryptoSource::Library(_)));

        let missing = CryptoLibrary::new("/definitely/not/here.js", reqwest::Client::new());
        assert_eq!(missing.source().await, CryptoSource::Fallback);
        assert!(missing.source().await.install_script().contains("op_crypto_digest"));

        assert_eq!(CryptoLibrary::fallback_only().source().await, CryptoSource::Fallback);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crypto-js.min.js"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crypto-js.min.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var CryptoJS = {};"))
            .mount(&server)
            .await;

        let url = format!("{}/crypto-js.min.js", server.uri());

        let mut library = CryptoLibrary::new(url.clone(), reqwest::Client::new());
        library.retry_after = Duration::ZERO;
        assert_eq!(library.source().await, CryptoSource::Fallback);
        assert!(matches!(library.source().await, CryptoSource::Library(_)));

        // Within the backoff window the shim is served without another request
        let backing_off = CryptoLibrary::new(url, reqwest::Client::new());
        *backing_off.last_failure.lock().unwrap() = Some(Instant::now());
        assert_eq!(backing_off.source().await, CryptoSource::Fallback);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }
}
