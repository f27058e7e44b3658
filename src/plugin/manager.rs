//! Scraper orchestrator
//!
//! The manager owns repository lifecycle (add, refresh, remove), user
//! toggles, and scraper execution. Executions are bounded by a global
//! semaphore and deduplicated per [`ScraperExecutionKey`] through a
//! single-flight map, so identical concurrent requests share one run.

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::installer::ScraperInstaller;
use super::js_runtime::{ExecutionOutcome, SandboxRuntime, ScriptInvocation, ScriptRunner};
use super::normalizer::merge;
use super::registry::ScraperStore;
use super::types::{
    ExecutionStatus, MediaRequest, MediaType, RepositoryDescriptor, ScraperDescriptor, ScraperEvent,
    ScraperExecutionKey, ScraperResult,
};
use crate::core::config::ScraperConfig;
use crate::core::error::{Result, ScraperError};
use crate::core::single_flight::SingleFlight;

/// Sample movie used by [`ScraperManager::test_scraper`]
const SAMPLE_MOVIE_ID: &str = "603";
/// Sample series used by [`ScraperManager::test_scraper`] (season 1, episode 1)
const SAMPLE_SERIES_ID: &str = "1399";

/// Scraper orchestrator
#[derive(Clone)]
pub struct ScraperManager {
    store: Arc<dyn ScraperStore>,
    runner: Arc<dyn ScriptRunner>,
    installer: Arc<ScraperInstaller>,
    permits: Arc<Semaphore>,
    flights: Arc<SingleFlight<ScraperExecutionKey, ExecutionOutcome>>,
    max_results: usize,
}

impl ScraperManager {
    /// Create a manager backed by the interpreter sandbox
    pub fn new(config: &ScraperConfig, store: Arc<dyn ScraperStore>) -> Result<Self> {
        let runner = SandboxRuntime::new(config)?;
        Self::with_runner(config, store, Arc::new(runner))
    }

    /// Create a manager with a custom script runner
    pub fn with_runner(
        config: &ScraperConfig,
        store: Arc<dyn ScraperStore>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Result<Self> {
        let installer = ScraperInstaller::new(&config.user_agent, config.fetch_timeout(), config.max_code_size)?;

        Ok(Self {
            store,
            runner,
            installer: Arc::new(installer),
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            flights: Arc::new(SingleFlight::new()),
            max_results: config.max_results,
        })
    }

    // ========================================================================
    // Repositories
    // ========================================================================

    /// Install a repository from its manifest URL.
    ///
    /// Adding a URL that is already installed refreshes it. Nothing is
    /// persisted if the manifest cannot be fetched or parsed.
    pub async fn add_repository(&self, manifest_url: &str) -> Result<RepositoryDescriptor> {
        let manifest_url = manifest_url.trim();
        let id = ScraperInstaller::repository_id(manifest_url);
        info!(repository_id = %id, manifest_url = %manifest_url, "Adding repository");
        self.install_repository(&id, manifest_url).await
    }

    /// Re-fetch a repository's manifest and re-download all of its scrapers
    pub async fn refresh_repository(&self, id: &str) -> Result<RepositoryDescriptor> {
        let repository = self
            .store
            .get_repository(id)
            .await?
            .ok_or_else(|| ScraperError::RepositoryNotFound(id.to_string()))?;

        info!(repository_id = %id, "Refreshing repository");
        self.install_repository(id, &repository.manifest_url).await
    }

    async fn install_repository(&self, id: &str, manifest_url: &str) -> Result<RepositoryDescriptor> {
        let manifest = self.installer.fetch_manifest(manifest_url).await?;

        let previous: HashMap<String, ScraperDescriptor> = self
            .store
            .list_scrapers()
            .await?
            .into_iter()
            .filter(|s| s.repository_id == id)
            .map(|s| (s.id.clone(), s))
            .collect();

        let report = self.installer.install(id, manifest_url, &manifest, &previous).await;
        let repository = RepositoryDescriptor {
            id: id.to_string(),
            manifest_url: manifest_url.to_string(),
            name: manifest.name.clone(),
            last_refreshed: Utc::now(),
            scraper_count: report.installed.len(),
        };

        self.store
            .replace_repository(repository.clone(), report.installed)
            .await?;

        info!(
            repository_id = %id,
            name = %repository.name,
            scrapers = repository.scraper_count,
            skipped = report.skipped.len(),
            "Repository installed"
        );
        Ok(repository)
    }

    /// Remove a repository with its scrapers, code and settings. Idempotent.
    pub async fn remove_repository(&self, id: &str) -> Result<()> {
        if self.store.remove_repository(id).await? {
            info!(repository_id = %id, "Repository removed");
        } else {
            debug!(repository_id = %id, "Repository already absent");
        }
        Ok(())
    }

    pub async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>> {
        self.store.list_repositories().await
    }

    pub async fn list_scrapers(&self) -> Result<Vec<ScraperDescriptor>> {
        self.store.list_scrapers().await
    }

    // ========================================================================
    // Flags and settings
    // ========================================================================

    /// Enable or disable one scraper; applies from the next execution request
    pub async fn toggle_scraper(&self, id: &str, enabled: bool) -> Result<()> {
        if !self.store.set_scraper_enabled(id, enabled).await? {
            return Err(ScraperError::ScraperNotFound(id.to_string()));
        }
        info!(scraper_id = %id, enabled, "Scraper toggled");
        Ok(())
    }

    pub async fn set_plugins_enabled(&self, enabled: bool) -> Result<()> {
        self.store.set_plugins_enabled(enabled).await?;
        info!(enabled, "Scrapers globally toggled");
        Ok(())
    }

    pub async fn plugins_enabled(&self) -> Result<bool> {
        self.store.plugins_enabled().await
    }

    /// Persist settings exposed to the scraper as `SCRAPER_SETTINGS`
    pub async fn set_scraper_settings(&self, id: &str, settings: Value) -> Result<()> {
        if !settings.is_object() {
            return Err(ScraperError::Serialization(
                "scraper settings must be a JSON object".to_string(),
            ));
        }
        if self.store.get_scraper(id).await?.is_none() {
            return Err(ScraperError::ScraperNotFound(id.to_string()));
        }
        self.store.set_scraper_settings(id, settings).await
    }

    pub async fn scraper_settings(&self, id: &str) -> Result<Value> {
        self.store.scraper_settings(id).await
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Scrapers that should run for a media type right now
    async fn runnable_scrapers(&self, media_type: MediaType) -> Result<Vec<ScraperDescriptor>> {
        if !self.store.plugins_enabled().await? {
            debug!("Scrapers globally disabled");
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .list_scrapers()
            .await?
            .into_iter()
            .filter(|s| s.is_runnable() && s.supports(media_type))
            .collect())
    }

    /// Run every matching scraper and return the merged, deduplicated results
    pub async fn execute_scrapers(&self, request: &MediaRequest) -> Result<Vec<ScraperResult>> {
        let scrapers = self.runnable_scrapers(request.media_type).await?;
        if scrapers.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = join_all(scrapers.iter().map(|s| self.run_scraper(s, request))).await;
        let merged = merge(
            outcomes.iter().map(|o| o.results.clone()),
            self.max_results,
        );

        info!(
            media_id = %request.media_id,
            media_type = %request.media_type,
            scrapers = scrapers.len(),
            results = merged.len(),
            "Scraper batch finished"
        );
        Ok(merged)
    }

    /// Run every matching scraper, yielding one event per scraper in completion order.
    ///
    /// The stream ends once every scraper has reported.
    pub async fn execute_scrapers_streaming(&self, request: &MediaRequest) -> Result<ReceiverStream<ScraperEvent>> {
        let scrapers = self.runnable_scrapers(request.media_type).await?;
        let (tx, rx) = mpsc::channel(scrapers.len().max(1));

        for scraper in scrapers {
            let manager = self.clone();
            let request = request.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = manager.run_scraper(&scraper, &request).await;
                let results = merge(std::iter::once(outcome.results.clone()), manager.max_results);
                let event = ScraperEvent {
                    scraper_id: scraper.id.clone(),
                    scraper_name: scraper.name.clone(),
                    status: outcome.status,
                    results,
                };
                if tx.send(event).await.is_err() {
                    debug!(scraper_id = %scraper.id, "Stream consumer went away");
                }
            });
        }

        Ok(ReceiverStream::new(rx))
    }

    /// Run one scraper by id, regardless of media type filtering
    pub async fn execute_scraper(&self, id: &str, request: &MediaRequest) -> Result<Vec<ScraperResult>> {
        let scraper = self
            .store
            .get_scraper(id)
            .await?
            .ok_or_else(|| ScraperError::ScraperNotFound(id.to_string()))?;
        Ok(self.run_scraper(&scraper, request).await.results.clone())
    }

    /// Run one scraper against a well-known sample title
    pub async fn test_scraper(&self, id: &str) -> Result<ScraperEvent> {
        let scraper = self
            .store
            .get_scraper(id)
            .await?
            .ok_or_else(|| ScraperError::ScraperNotFound(id.to_string()))?;

        let request = if scraper.supports(MediaType::Movie) {
            MediaRequest::movie(SAMPLE_MOVIE_ID)
        } else {
            MediaRequest::episode(SAMPLE_SERIES_ID, 1, 1)
        };

        info!(scraper_id = %id, media_id = %request.media_id, "Testing scraper");
        let outcome = self.run_scraper(&scraper, &request).await;
        Ok(ScraperEvent {
            scraper_id: scraper.id.clone(),
            scraper_name: scraper.name.clone(),
            status: outcome.status,
            results: outcome.results.clone(),
        })
    }

    /// Join or start the single-flight execution for one scraper
    async fn run_scraper(&self, scraper: &ScraperDescriptor, request: &MediaRequest) -> Arc<ExecutionOutcome> {
        let key = request.key_for(&scraper.id);
        let store = Arc::clone(&self.store);
        let runner = Arc::clone(&self.runner);
        let permits = Arc::clone(&self.permits);
        let scraper_id = scraper.id.clone();
        let scraper_name = scraper.name.clone();
        let request = request.clone();

        let outcome = self
            .flights
            .run(key, move || async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return ExecutionOutcome::empty(ExecutionStatus::Failed, Duration::ZERO);
                };

                let source = match store.scraper_code(&scraper_id).await {
                    Ok(Some(code)) => code,
                    Ok(None) => {
                        warn!(scraper_id = %scraper_id, "No code stored for scraper");
                        return ExecutionOutcome::empty(ExecutionStatus::Failed, Duration::ZERO);
                    }
                    Err(e) => {
                        warn!(scraper_id = %scraper_id, error = %e, "Failed to load scraper code");
                        return ExecutionOutcome::empty(ExecutionStatus::Failed, Duration::ZERO);
                    }
                };
                let settings = store
                    .scraper_settings(&scraper_id)
                    .await
                    .unwrap_or_else(|_| Value::Object(Default::default()));

                runner
                    .run(ScriptInvocation {
                        scraper_id,
                        scraper_name,
                        source: Arc::from(source),
                        settings,
                        request,
                    })
                    .await
            })
            .await;

        outcome.unwrap_or_else(|| Arc::new(ExecutionOutcome::empty(ExecutionStatus::Failed, Duration::ZERO)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::normalizer::normalize;
    use crate::plugin::registry::{InstalledScraper, MemoryStore};
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Runner that interprets source as `<delay_ms>|<json results>` or `<delay_ms>|THROW`
    #[derive(Default)]
    struct ScriptedRunner {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ScriptRunner for ScriptedRunner {
        async fn run(&self, invocation: ScriptInvocation) -> ExecutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let (delay, body) = invocation.source.split_once('|').unwrap_or(("0", &*invocation.source));
            tokio::time::sleep(Duration::from_millis(delay.parse().unwrap_or(0))).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if body == "THROW" {
                return ExecutionOutcome::empty(ExecutionStatus::Failed, Duration::ZERO);
            }
            ExecutionOutcome {
                status: ExecutionStatus::Completed,
                results: normalize(body, &invocation.scraper_id, &invocation.scraper_name),
                elapsed: Duration::ZERO,
            }
        }
    }

    fn config(max_concurrency: usize) -> ScraperConfig {
        ScraperConfig {
            max_concurrency,
            ..ScraperConfig::default()
        }
    }

    fn manager_with(store: Arc<MemoryStore>, max_concurrency: usize) -> (ScraperManager, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::default());
        let manager = ScraperManager::with_runner(&config(max_concurrency), store, runner.clone()).unwrap();
        (manager, runner)
    }

    fn installed(id: &str, name: &str, types: &[MediaType], code: &str) -> InstalledScraper {
        InstalledScraper {
            descriptor: ScraperDescriptor {
                id: id.to_string(),
                repository_id: "repo".to_string(),
                name: name.to_string(),
                version: "1.0.0".to_string(),
                description: None,
                logo: None,
                supported_types: types.to_vec(),
                content_language: vec![],
                formats: vec![],
                manifest_enabled: true,
                enabled: true,
                code_url: format!("https://repo.example/{}.js", id),
            },
            code: code.to_string(),
        }
    }

    async fn seeded(scrapers: Vec<InstalledScraper>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let repository = RepositoryDescriptor {
            id: "repo".to_string(),
            manifest_url: "https://repo.example/manifest.json".to_string(),
            name: "Repo".to_string(),
            last_refreshed: Utc::now(),
            scraper_count: scrapers.len(),
        };
        store.replace_repository(repository, scrapers).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_batch_merges_and_dedups_across_scrapers() {
        let store = seeded(vec![
            installed("one", "One", &[MediaType::Movie], r#"0|[{"url":"http://a"},{"url":"http://a"}]"#),
            installed("two", "Two", &[MediaType::Movie], r#"0|[{"url":"http://b"}]"#),
        ])
        .await;
        let (manager, _) = manager_with(store, 5);

        let results = manager.execute_scrapers(&MediaRequest::movie("603")).await.unwrap();
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a", "http://b"]);
        assert_eq!(results[0].scraper_name, "One");
        assert_eq!(results[1].scraper_name, "Two");
    }

    #[tokio::test]
    async fn test_failing_scraper_does_not_affect_siblings() {
        let store = seeded(vec![
            installed("bad", "Bad", &[MediaType::Movie], "0|THROW"),
            installed("good", "Good", &[MediaType::Movie], r#"0|[{"url":"https://ok.example/1"}]"#),
        ])
        .await;
        let (manager, _) = manager_with(store, 5);

        let request = MediaRequest::movie("603");
        assert!(manager.execute_scraper("bad", &request).await.unwrap().is_empty());
        let results = manager.execute_scrapers(&request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].scraper_id, "good");
    }

    #[tokio::test]
    async fn test_selection_respects_type_and_flags() {
        let store = seeded(vec![
            installed("movies", "Movies", &[MediaType::Movie], r#"0|[{"url":"https://m.example"}]"#),
            installed("shows", "Shows", &[MediaType::Tv], r#"0|[{"url":"https://t.example"}]"#),
        ])
        .await;
        let (manager, runner) = manager_with(store, 5);

        let tv = manager.execute_scrapers(&MediaRequest::episode("1399", 1, 1)).await.unwrap();
        assert_eq!(tv.len(), 1);
        assert_eq!(tv[0].scraper_id, "shows");

        manager.toggle_scraper("shows", false).await.unwrap();
        assert!(manager.execute_scrapers(&MediaRequest::episode("1399", 1, 1)).await.unwrap().is_empty());

        manager.set_plugins_enabled(false).await.unwrap();
        assert!(manager.execute_scrapers(&MediaRequest::movie("603")).await.unwrap().is_empty());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            manager.toggle_scraper("ghost", true).await,
            Err(ScraperError::ScraperNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_execution() {
        let store = seeded(vec![installed(
            "slow",
            "Slow",
            &[MediaType::Movie],
            r#"150|[{"url":"https://slow.example"}]"#,
        )])
        .await;
        let (manager, runner) = manager_with(store, 5);

        let request = MediaRequest::movie("603");
        let (a, b) = tokio::join!(manager.execute_scrapers(&request), manager.execute_scrapers(&request));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

        // A different episode is a different key
        let other = MediaRequest::movie("604");
        manager.execute_scrapers(&other).await.unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let scrapers = (0..6)
            .map(|i| installed(&format!("s{}", i), "S", &[MediaType::Movie], "50|[]"))
            .collect();
        let store = seeded(scrapers).await;
        let (manager, runner) = manager_with(store, 2);

        manager.execute_scrapers(&MediaRequest::movie("603")).await.unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 6);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_streaming_reports_in_completion_order() {
        let store = seeded(vec![
            installed("a-slow", "Slow", &[MediaType::Movie], r#"300|[{"url":"https://slow.example"}]"#),
            installed("b-fast", "Fast", &[MediaType::Movie], r#"0|[{"url":"https://fast.example"}]"#),
            installed("c-bad", "Bad", &[MediaType::Movie], "100|THROW"),
        ])
        .await;
        let (manager, _) = manager_with(store, 5);

        let events: Vec<ScraperEvent> = manager
            .execute_scrapers_streaming(&MediaRequest::movie("603"))
            .await
            .unwrap()
            .collect()
            .await;

        let order: Vec<&str> = events.iter().map(|e| e.scraper_id.as_str()).collect();
        assert_eq!(order, vec!["b-fast", "c-bad", "a-slow"]);
        assert_eq!(events[1].status, ExecutionStatus::Failed);
        assert!(events[1].results.is_empty());
        assert_eq!(events[2].results[0].url, "https://slow.example");
    }

    #[tokio::test]
    async fn test_streaming_events_are_deduplicated_and_capped() {
        let store = seeded(vec![installed(
            "dup",
            "Dup",
            &[MediaType::Movie],
            r#"0|[{"url":"https://d.example/1"},{"url":"https://d.example/1"},{"url":"https://d.example/2"},{"url":"https://d.example/3"}]"#,
        )])
        .await;
        let config = ScraperConfig {
            max_results: 2,
            ..ScraperConfig::default()
        };
        let manager = ScraperManager::with_runner(&config, store, Arc::new(ScriptedRunner::default())).unwrap();

        let events: Vec<ScraperEvent> = manager
            .execute_scrapers_streaming(&MediaRequest::movie("603"))
            .await
            .unwrap()
            .collect()
            .await;

        let urls: Vec<&str> = events[0].results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://d.example/1", "https://d.example/2"]);
    }

    #[tokio::test]
    async fn test_streaming_with_no_scrapers_closes_immediately() {
        let (manager, _) = manager_with(Arc::new(MemoryStore::new()), 5);
        let events: Vec<ScraperEvent> = manager
            .execute_scrapers_streaming(&MediaRequest::movie("603"))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_test_scraper_uses_sample_inputs() {
        let store = seeded(vec![
            installed("m", "M", &[MediaType::Movie, MediaType::Tv], r#"0|[{"url":"https://m.example"}]"#),
            installed("t", "T", &[MediaType::Tv], "0|[]"),
        ])
        .await;
        let (manager, _) = manager_with(store, 5);

        let event = manager.test_scraper("m").await.unwrap();
        assert_eq!(event.status, ExecutionStatus::Completed);
        assert_eq!(event.results.len(), 1);
        assert!(manager.test_scraper("t").await.unwrap().results.is_empty());
        assert!(matches!(manager.test_scraper("nope").await, Err(ScraperError::ScraperNotFound(_))));
    }

    #[tokio::test]
    async fn test_settings_validation() {
        let store = seeded(vec![installed("m", "M", &[MediaType::Movie], "0|[]")]).await;
        let (manager, _) = manager_with(store, 5);

        manager.set_scraper_settings("m", json!({ "region": "eu" })).await.unwrap();
        assert_eq!(manager.scraper_settings("m").await.unwrap(), json!({ "region": "eu" }));
        assert!(manager.set_scraper_settings("m", json!([1])).await.is_err());
        assert!(matches!(
            manager.set_scraper_settings("ghost", json!({})).await,
            Err(ScraperError::ScraperNotFound(_))
        ));
    }

    async fn serve_repository(server: &MockServer, beta_code: &str) -> String {
        Mock::given(path("/repo/manifest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Community",
                "version": "1.0.0",
                "scrapers": [
                    { "id": "alpha", "name": "Alpha", "version": "1.0.0", "filename": "alpha.js", "supportedTypes": ["movie"] },
                    { "id": "beta", "name": "Beta", "version": "2.0.0", "filename": "providers/beta.js", "supportedTypes": ["movie", "tv"] }
                ]
            })))
            .mount(server)
            .await;
        Mock::given(path("/repo/alpha.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"0|[{"url":"http://a"}]"#))
            .mount(server)
            .await;
        Mock::given(path("/repo/providers/beta.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(beta_code.to_string()))
            .mount(server)
            .await;
        format!("{}/repo/manifest.json", server.uri())
    }

    #[tokio::test]
    async fn test_add_and_refresh_repository_is_idempotent() {
        let server = MockServer::start().await;
        let manifest_url = serve_repository(&server, r#"0|[{"url":"http://b"}]"#).await;
        let (manager, _) = manager_with(Arc::new(MemoryStore::new()), 5);

        let repository = manager.add_repository(&manifest_url).await.unwrap();
        assert_eq!(repository.name, "Community");
        assert_eq!(repository.scraper_count, 2);
        assert_eq!(repository.id, ScraperInstaller::repository_id(&manifest_url));

        manager.toggle_scraper("beta", false).await.unwrap();
        let before = manager.list_scrapers().await.unwrap();

        manager.refresh_repository(&repository.id).await.unwrap();
        manager.refresh_repository(&repository.id).await.unwrap();
        let after = manager.list_scrapers().await.unwrap();
        assert_eq!(before, after);
        assert!(!after.iter().find(|s| s.id == "beta").unwrap().enabled);

        // Adding the same URL again refreshes rather than duplicating
        manager.add_repository(&manifest_url).await.unwrap();
        assert_eq!(manager.list_repositories().await.unwrap().len(), 1);

        let results = manager.execute_scrapers(&MediaRequest::movie("603")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a");
    }

    #[tokio::test]
    async fn test_manifest_failure_persists_nothing() {
        let server = MockServer::start().await;
        let (manager, _) = manager_with(Arc::new(MemoryStore::new()), 5);

        let err = manager
            .add_repository(&format!("{}/missing/manifest.json", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScraperError::ManifestFetch(_)));
        assert_eq!(err.error_type(), "ManifestFetchError");
        assert!(manager.list_repositories().await.unwrap().is_empty());
        assert!(manager.list_scrapers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_and_remove_repository() {
        let server = MockServer::start().await;
        let manifest_url = serve_repository(&server, "0|[]").await;
        let (manager, _) = manager_with(Arc::new(MemoryStore::new()), 5);

        assert!(matches!(
            manager.refresh_repository("unknown").await,
            Err(ScraperError::RepositoryNotFound(_))
        ));

        let repository = manager.add_repository(&manifest_url).await.unwrap();
        manager.remove_repository(&repository.id).await.unwrap();
        manager.remove_repository(&repository.id).await.unwrap();
        assert!(manager.list_repositories().await.unwrap().is_empty());
        assert!(manager.list_scrapers().await.unwrap().is_empty());
    }
}
