//! Scraper installation
//!
//! This module turns a repository manifest into installed scrapers:
//! manifest fetch and parse, code URL resolution against the manifest's
//! directory, a size check before download, and the download itself.

use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::registry::InstalledScraper;
use super::types::{ManifestScraper, MediaType, RepositoryManifest, ScraperDescriptor};
use crate::core::error::{Result, ScraperError};

/// Concurrent code downloads per repository
const DOWNLOAD_CONCURRENCY: usize = 4;

/// Result of installing every scraper a manifest declares
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledScraper>,
    /// Scraper ids left out of this refresh, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Fetches manifests and scraper code
pub struct ScraperInstaller {
    client: reqwest::Client,
    max_code_size: u64,
}

impl ScraperInstaller {
    pub fn new(user_agent: &str, timeout: Duration, max_code_size: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ScraperError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, max_code_size })
    }

    /// Stable repository id derived from the manifest URL
    pub fn repository_id(manifest_url: &str) -> String {
        let digest = Sha256::digest(manifest_url.trim().as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Fetch and parse a repository manifest
    pub async fn fetch_manifest(&self, manifest_url: &str) -> Result<RepositoryManifest> {
        let fail = |reason: String| ScraperError::ManifestFetch(format!("{}: {}", manifest_url, reason));

        let response = self
            .client
            .get(manifest_url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }

        let body = response.text().await.map_err(|e| fail(e.to_string()))?;
        let manifest: RepositoryManifest =
            serde_json::from_str(&body).map_err(|e| fail(format!("invalid manifest: {}", e)))?;

        if manifest.name.trim().is_empty() {
            return Err(fail("manifest has no name".to_string()));
        }

        debug!(
            manifest_url = %manifest_url,
            name = %manifest.name,
            scrapers = manifest.scrapers.len(),
            "Manifest fetched"
        );
        Ok(manifest)
    }

    /// Resolve a manifest `filename` against the directory holding the manifest
    pub fn resolve_code_url(manifest_url: &str, filename: &str) -> Result<String> {
        if let Ok(absolute) = url::Url::parse(filename) {
            return Ok(absolute.to_string());
        }
        let base = url::Url::parse(manifest_url)
            .map_err(|e| ScraperError::ManifestFetch(format!("invalid manifest url {}: {}", manifest_url, e)))?;
        // Url::join drops the last path segment, which is the manifest file itself
        base.join(filename.trim_start_matches("./"))
            .map(|u| u.to_string())
            .map_err(|e| ScraperError::ManifestFetch(format!("invalid scraper filename {}: {}", filename, e)))
    }

    /// Download scraper source, refusing anything larger than the size ceiling
    pub async fn download_code(&self, code_url: &str) -> Result<String> {
        // Not every host answers HEAD; a failed probe falls through to the GET checks
        match self.client.head(code_url).send().await {
            Ok(head) if head.status().is_success() => {
                if let Some(size) = content_length(&head) {
                    self.check_size(size)?;
                }
            }
            Ok(head) => debug!(url = %code_url, status = %head.status(), "HEAD probe rejected"),
            Err(e) => debug!(url = %code_url, error = %e, "HEAD probe failed"),
        }

        let mut response = self.client.get(code_url).send().await?.error_for_status()?;
        if let Some(size) = content_length(&response) {
            self.check_size(size)?;
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            self.check_size(body.len() as u64)?;
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_code_size {
            return Err(ScraperError::OversizedPayload {
                size,
                limit: self.max_code_size,
            });
        }
        Ok(())
    }

    /// Download every scraper in a manifest.
    ///
    /// `previous` holds the repository's currently installed descriptors so
    /// user-toggled flags survive a refresh. Scrapers whose code cannot be
    /// downloaded are skipped, not fatal.
    pub async fn install(
        &self,
        repository_id: &str,
        manifest_url: &str,
        manifest: &RepositoryManifest,
        previous: &HashMap<String, ScraperDescriptor>,
    ) -> InstallReport {
        let mut report = InstallReport::default();
        let mut pending = Vec::new();

        for entry in &manifest.scrapers {
            if entry.id.trim().is_empty() {
                report.skipped.push((entry.name.clone(), "missing id".to_string()));
                continue;
            }
            match Self::resolve_code_url(manifest_url, &entry.filename) {
                Ok(code_url) => pending.push((entry, code_url)),
                Err(e) => report.skipped.push((entry.id.clone(), e.to_string())),
            }
        }

        let downloads: Vec<_> = stream::iter(pending)
            .map(|(entry, code_url)| async move {
                let code = self.download_code(&code_url).await;
                (entry, code_url, code)
            })
            .buffered(DOWNLOAD_CONCURRENCY)
            .collect()
            .await;

        for (entry, code_url, code) in downloads {
            match code {
                Ok(code) => {
                    let checksum = hex::encode(Sha256::digest(code.as_bytes()));
                    debug!(
                        scraper_id = %entry.id,
                        bytes = code.len(),
                        checksum = %&checksum[..16],
                        "Scraper code downloaded"
                    );
                    let user_enabled = previous.get(&entry.id).map(|p| p.enabled).unwrap_or(true);
                    report.installed.push(InstalledScraper {
                        descriptor: descriptor_from_manifest(repository_id, entry, code_url, user_enabled),
                        code,
                    });
                }
                Err(e) => {
                    warn!(
                        scraper_id = %entry.id,
                        url = %code_url,
                        error = %e,
                        error_type = e.error_type(),
                        "Skipping scraper whose code could not be downloaded"
                    );
                    report.skipped.push((entry.id.clone(), e.to_string()));
                }
            }
        }

        info!(
            repository_id = %repository_id,
            installed = report.installed.len(),
            skipped = report.skipped.len(),
            "Repository scrapers installed"
        );
        report
    }
}

fn content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn descriptor_from_manifest(
    repository_id: &str,
    entry: &ManifestScraper,
    code_url: String,
    user_enabled: bool,
) -> ScraperDescriptor {
    let mut supported_types: Vec<MediaType> = Vec::new();
    for media_type in entry.supported_types.iter().filter_map(|t| MediaType::parse(t)) {
        if !supported_types.contains(&media_type) {
            supported_types.push(media_type);
        }
    }
    // Undeclared types means the scraper handles both
    if entry.supported_types.is_empty() {
        supported_types = vec![MediaType::Movie, MediaType::Tv];
    }

    ScraperDescriptor {
        id: entry.id.clone(),
        repository_id: repository_id.to_string(),
        name: entry.name.clone(),
        version: entry.version.clone().unwrap_or_else(|| "0.0.0".to_string()),
        description: entry.description.clone(),
        logo: entry.logo.clone(),
        supported_types,
        content_language: entry.content_language.clone(),
        formats: entry.formats.clone(),
        manifest_enabled: entry.enabled,
        enabled: user_enabled,
        code_url,
    }
}
