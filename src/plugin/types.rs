//! Scraper type definitions
//!
//! This module defines the descriptors persisted for installed repositories and
//! scrapers, the manifest wire format, the execution key used for
//! deduplication, and the normalized result record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of an installed scraper
pub type ScraperId = String;

/// Identifier of an installed repository
pub type RepositoryId = String;

/// Media type a scraper declares support for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    /// Parse a manifest or caller supplied type name.
    ///
    /// Manifests in the wild use "series" and "show" for television.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "movie" | "movies" | "film" => Some(MediaType::Movie),
            "tv" | "series" | "show" | "shows" => Some(MediaType::Tv),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::parse(s).ok_or_else(|| format!("unknown media type '{}'", s))
    }
}

/// A remote scraper repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub id: RepositoryId,
    pub manifest_url: String,
    pub name: String,
    pub last_refreshed: DateTime<Utc>,
    pub scraper_count: usize,
}

/// An installed scraper
///
/// Source code is stored separately and fetched lazily at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScraperDescriptor {
    pub id: ScraperId,
    pub repository_id: RepositoryId,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    pub supported_types: Vec<MediaType>,
    #[serde(default)]
    pub content_language: Vec<String>,
    #[serde(default)]
    pub formats: Vec<String>,
    /// Enabled flag declared by the manifest
    pub manifest_enabled: bool,
    /// Enabled flag toggled by the user
    pub enabled: bool,
    /// Resolved absolute URL of the scraper source
    pub code_url: String,
}

impl ScraperDescriptor {
    /// A scraper runs only if both the manifest and the user enable it
    pub fn is_runnable(&self) -> bool {
        self.manifest_enabled && self.enabled
    }

    pub fn supports(&self, media_type: MediaType) -> bool {
        self.supported_types.contains(&media_type)
    }
}

/// Repository manifest as served by the remote host
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub scrapers: Vec<ManifestScraper>,
}

/// Scraper entry inside a repository manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestScraper {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub supported_types: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub content_language: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub formats: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Accept either a single string or an array of strings
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null => Vec::new(),
    })
}

/// Deduplication key for one logical scraper execution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScraperExecutionKey {
    pub scraper_id: ScraperId,
    pub media_id: String,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Media query handed to a scraper's entry point
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MediaRequest {
    pub media_id: String,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl MediaRequest {
    pub fn movie(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    pub fn episode(media_id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            media_id: media_id.into(),
            media_type: MediaType::Tv,
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn key_for(&self, scraper_id: &str) -> ScraperExecutionKey {
        ScraperExecutionKey {
            scraper_id: scraper_id.to_string(),
            media_id: self.media_id.clone(),
            media_type: self.media_type,
            season: self.season,
            episode: self.episode,
        }
    }
}

/// A normalized playable link produced by a scraper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub seeders: Option<u64>,
    #[serde(default)]
    pub peers: Option<u64>,
    #[serde(default)]
    pub info_hash: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Id of the scraper that produced this result
    pub scraper_id: ScraperId,
    /// Display name of the scraper that produced this result
    pub scraper_name: String,
}

/// How one scraper's execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Entry point resolved (possibly to an empty list)
    Completed,
    /// Script threw, rejected, failed to load, or returned garbage
    Failed,
    /// Execution exceeded the wall-clock limit
    TimedOut,
}

/// One scraper's contribution, emitted by the streaming interface
#[derive(Debug, Clone, Serialize)]
pub struct ScraperEvent {
    pub scraper_id: ScraperId,
    pub scraper_name: String,
    pub status: ExecutionStatus,
    pub results: Vec<ScraperResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parse() {
        assert_eq!(MediaType::parse("movie"), Some(MediaType::Movie));
        assert_eq!(MediaType::parse(" TV "), Some(MediaType::Tv));
        assert_eq!(MediaType::parse("series"), Some(MediaType::Tv));
        assert_eq!(MediaType::parse("anime"), None);
        assert_eq!("movie".parse::<MediaType>(), Ok(MediaType::Movie));
    }

    #[test]
    fn test_manifest_parsing_lenient_fields() {
        let json = r#"{
            "name": "Community Scrapers",
            "version": "1.0.0",
            "scrapers": [
                {
                    "id": "alpha",
                    "name": "Alpha",
                    "version": "1.2.0",
                    "filename": "providers/alpha.js",
                    "supportedTypes": ["movie", "tv"],
                    "contentLanguage": "en",
                    "formats": ["mkv", "mp4"]
                },
                {
                    "id": "beta",
                    "name": "Beta",
                    "filename": "https://cdn.example.com/beta.js",
                    "enabled": false,
                    "contentLanguage": null
                }
            ]
        }"#;

        let manifest: RepositoryManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.name, "Community Scrapers");
        assert_eq!(manifest.scrapers.len(), 2);

        let alpha = &manifest.scrapers[0];
        assert!(alpha.enabled);
        assert_eq!(alpha.content_language, vec!["en".to_string()]);
        assert_eq!(alpha.formats.len(), 2);

        let beta = &manifest.scrapers[1];
        assert!(!beta.enabled);
        assert!(beta.content_language.is_empty());
        assert!(beta.supported_types.is_empty());
    }

    #[test]
    fn test_execution_key_distinguishes_episodes() {
        let e1 = MediaRequest::episode("1399", 1, 1).key_for("alpha");
        let e2 = MediaRequest::episode("1399", 1, 2).key_for("alpha");
        let same = MediaRequest::episode("1399", 1, 1).key_for("alpha");
        assert_ne!(e1, e2);
        assert_eq!(e1, same);
    }

    #[test]
    fn test_descriptor_runnable() {
        let mut descriptor = ScraperDescriptor {
            id: "alpha".into(),
            repository_id: "repo".into(),
            name: "Alpha".into(),
            version: "1.0.0".into(),
            description: None,
            logo: None,
            supported_types: vec![MediaType::Movie],
            content_language: vec![],
            formats: vec![],
            manifest_enabled: true,
            enabled: true,
            code_url: "https://example.com/alpha.js".into(),
        };
        assert!(descriptor.is_runnable());
        assert!(descriptor.supports(MediaType::Movie));
        assert!(!descriptor.supports(MediaType::Tv));

        descriptor.manifest_enabled = false;
        assert!(!descriptor.is_runnable());
    }
}
