//! Scraper registry storage
//!
//! This module defines the persistence accessor surface the orchestrator
//! reads and writes: repositories, scraper descriptors, per-scraper source
//! code and settings, and the global plugins-enabled flag.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::{RepositoryDescriptor, ScraperDescriptor};
use crate::core::error::Result;

/// A scraper descriptor paired with its downloaded source
#[derive(Debug, Clone)]
pub struct InstalledScraper {
    pub descriptor: ScraperDescriptor,
    pub code: String,
}

/// Read/write accessor for persisted scraper state
#[async_trait]
pub trait ScraperStore: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>>;

    async fn get_repository(&self, id: &str) -> Result<Option<RepositoryDescriptor>>;

    /// All scrapers, ordered by id
    async fn list_scrapers(&self) -> Result<Vec<ScraperDescriptor>>;

    async fn get_scraper(&self, id: &str) -> Result<Option<ScraperDescriptor>>;

    /// Persist a repository and its complete scraper set.
    ///
    /// Scrapers the repository owned before but that are absent from
    /// `scrapers` are deleted along with their code and settings.
    async fn replace_repository(&self, repository: RepositoryDescriptor, scrapers: Vec<InstalledScraper>) -> Result<()>;

    /// Delete a repository and everything it owns. Returns false if it did not exist.
    async fn remove_repository(&self, id: &str) -> Result<bool>;

    /// Returns false if the scraper does not exist
    async fn set_scraper_enabled(&self, id: &str, enabled: bool) -> Result<bool>;

    async fn scraper_code(&self, id: &str) -> Result<Option<String>>;

    /// Settings object for a scraper; an empty object when none were saved
    async fn scraper_settings(&self, id: &str) -> Result<Value>;

    async fn set_scraper_settings(&self, id: &str, settings: Value) -> Result<()>;

    /// Global switch, enabled unless explicitly turned off
    async fn plugins_enabled(&self) -> Result<bool>;

    async fn set_plugins_enabled(&self, enabled: bool) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    repositories: HashMap<String, RepositoryDescriptor>,
    scrapers: HashMap<String, ScraperDescriptor>,
    code: HashMap<String, String>,
    settings: HashMap<String, Value>,
    plugins_disabled: bool,
}

impl MemoryState {
    fn drop_scraper(&mut self, id: &str) {
        self.scrapers.remove(id);
        self.code.remove(id);
        self.settings.remove(id);
    }
}

/// In-process store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScraperStore for MemoryStore {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>> {
        let state = self.state.read().await;
        let mut repositories: Vec<_> = state.repositories.values().cloned().collect();
        repositories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(repositories)
    }

    async fn get_repository(&self, id: &str) -> Result<Option<RepositoryDescriptor>> {
        Ok(self.state.read().await.repositories.get(id).cloned())
    }

    async fn list_scrapers(&self) -> Result<Vec<ScraperDescriptor>> {
        let state = self.state.read().await;
        let mut scrapers: Vec<_> = state.scrapers.values().cloned().collect();
        scrapers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(scrapers)
    }

    async fn get_scraper(&self, id: &str) -> Result<Option<ScraperDescriptor>> {
        Ok(self.state.read().await.scrapers.get(id).cloned())
    }

    async fn replace_repository(&self, repository: RepositoryDescriptor, scrapers: Vec<InstalledScraper>) -> Result<()> {
        let mut state = self.state.write().await;

        let keep: Vec<&str> = scrapers.iter().map(|s| s.descriptor.id.as_str()).collect();
        let stale: Vec<String> = state
            .scrapers
            .values()
            .filter(|s| s.repository_id == repository.id && !keep.contains(&s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();
        for id in stale {
            state.drop_scraper(&id);
        }

        for installed in scrapers {
            let id = installed.descriptor.id.clone();
            state.code.insert(id.clone(), installed.code);
            state.scrapers.insert(id, installed.descriptor);
        }
        state.repositories.insert(repository.id.clone(), repository);
        Ok(())
    }

    async fn remove_repository(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let owned: Vec<String> = state
            .scrapers
            .values()
            .filter(|s| s.repository_id == id)
            .map(|s| s.id.clone())
            .collect();
        for scraper_id in owned {
            state.drop_scraper(&scraper_id);
        }
        Ok(state.repositories.remove(id).is_some())
    }

    async fn set_scraper_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.scrapers.get_mut(id) {
            Some(scraper) => {
                scraper.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scraper_code(&self, id: &str) -> Result<Option<String>> {
        Ok(self.state.read().await.code.get(id).cloned())
    }

    async fn scraper_settings(&self, id: &str) -> Result<Value> {
        Ok(self
            .state
            .read()
            .await
            .settings
            .get(id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn set_scraper_settings(&self, id: &str, settings: Value) -> Result<()> {
        self.state.write().await.settings.insert(id.to_string(), settings);
        Ok(())
    }

    async fn plugins_enabled(&self) -> Result<bool> {
        Ok(!self.state.read().await.plugins_disabled)
    }

    async fn set_plugins_enabled(&self, enabled: bool) -> Result<()> {
        self.state.write().await.plugins_disabled = !enabled;
        Ok(())
    }
}

/// Behaviour every store implementation must share
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::plugin::types::MediaType;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    pub fn repository(id: &str, name: &str, count: usize) -> RepositoryDescriptor {
        RepositoryDescriptor {
            id: id.to_string(),
            manifest_url: format!("https://repo.example/{}/manifest.json", id),
            name: name.to_string(),
            last_refreshed: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            scraper_count: count,
        }
    }

    pub fn scraper(id: &str, repository_id: &str) -> InstalledScraper {
        InstalledScraper {
            descriptor: ScraperDescriptor {
                id: id.to_string(),
                repository_id: repository_id.to_string(),
                name: id.to_uppercase(),
                version: "1.0.0".to_string(),
                description: Some("test scraper".to_string()),
                logo: None,
                supported_types: vec![MediaType::Movie, MediaType::Tv],
                content_language: vec!["en".to_string()],
                formats: vec![],
                manifest_enabled: true,
                enabled: true,
                code_url: format!("https://repo.example/{}.js", id),
            },
            code: format!("// {}", id),
        }
    }

    pub async fn exercise(store: &dyn ScraperStore) {
        assert!(store.plugins_enabled().await.unwrap());
        assert!(store.list_repositories().await.unwrap().is_empty());

        store
            .replace_repository(repository("r1", "Repo One", 2), vec![scraper("b", "r1"), scraper("a", "r1")])
            .await
            .unwrap();
        store
            .replace_repository(repository("r2", "Repo Two", 1), vec![scraper("c", "r2")])
            .await
            .unwrap();

        let ids: Vec<String> = store.list_scrapers().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.scraper_code("a").await.unwrap().as_deref(), Some("// a"));
        assert_eq!(store.get_repository("r1").await.unwrap().unwrap().scraper_count, 2);
        assert_eq!(store.get_scraper("c").await.unwrap().unwrap().supported_types.len(), 2);

        // Toggles and settings
        assert!(store.set_scraper_enabled("a", false).await.unwrap());
        assert!(!store.set_scraper_enabled("missing", false).await.unwrap());
        assert!(!store.get_scraper("a").await.unwrap().unwrap().enabled);
        assert_eq!(store.scraper_settings("a").await.unwrap(), json!({}));
        store.set_scraper_settings("a", json!({ "region": "eu" })).await.unwrap();
        assert_eq!(store.scraper_settings("a").await.unwrap(), json!({ "region": "eu" }));

        // Replacing drops scrapers the repository no longer declares
        store
            .replace_repository(repository("r1", "Repo One", 1), vec![scraper("a", "r1")])
            .await
            .unwrap();
        assert!(store.get_scraper("b").await.unwrap().is_none());
        assert!(store.scraper_code("b").await.unwrap().is_none());
        assert_eq!(store.scraper_settings("a").await.unwrap(), json!({ "region": "eu" }));

        // Removal cascades and is idempotent
        assert!(store.remove_repository("r1").await.unwrap());
        assert!(!store.remove_repository("r1").await.unwrap());
        assert!(store.get_scraper("a").await.unwrap().is_none());
        assert!(store.scraper_code("a").await.unwrap().is_none());
        assert_eq!(store.scraper_settings("a").await.unwrap(), json!({}));
        assert_eq!(store.list_repositories().await.unwrap().len(), 1);

        store.set_plugins_enabled(false).await.unwrap();
        assert!(!store.plugins_enabled().await.unwrap());
        store.set_plugins_enabled(true).await.unwrap();
        assert!(store.plugins_enabled().await.unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_conformance() {
        let store = MemoryStore::new();
        conformance::exercise(&store).await;
    }
}
