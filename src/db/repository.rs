//! SQLite-backed scraper store
//!
//! Implements [`ScraperStore`] on top of [`DatabaseManager`]. List-valued
//! descriptor fields are stored as JSON text columns.

use crate::core::error::Result;
use crate::db::manager::DatabaseManager;
use crate::plugin::registry::{InstalledScraper, ScraperStore};
use crate::plugin::types::{RepositoryDescriptor, ScraperDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

const PLUGINS_ENABLED_KEY: &str = "plugins_enabled";

const SCRAPER_COLUMNS: &str = "id, repository_id, name, version, description, logo, supported_types, \
     content_language, formats, manifest_enabled, enabled, code_url";

const REPOSITORY_COLUMNS: &str = "id, manifest_url, name, last_refreshed, scraper_count";

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn scraper_from_row(row: &Row<'_>) -> rusqlite::Result<ScraperDescriptor> {
    Ok(ScraperDescriptor {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        name: row.get(2)?,
        version: row.get(3)?,
        description: row.get(4)?,
        logo: row.get(5)?,
        supported_types: json_column(row, 6)?,
        content_language: json_column(row, 7)?,
        formats: json_column(row, 8)?,
        manifest_enabled: row.get(9)?,
        enabled: row.get(10)?,
        code_url: row.get(11)?,
    })
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<RepositoryDescriptor> {
    let refreshed: String = row.get(3)?;
    let last_refreshed = DateTime::parse_from_rfc3339(&refreshed)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let scraper_count: i64 = row.get(4)?;

    Ok(RepositoryDescriptor {
        id: row.get(0)?,
        manifest_url: row.get(1)?,
        name: row.get(2)?,
        last_refreshed,
        scraper_count: scraper_count.max(0) as usize,
    })
}

fn delete_scraper(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM scraper_code WHERE scraper_id = ?1", [id])?;
    conn.execute("DELETE FROM scraper_settings WHERE scraper_id = ?1", [id])?;
    conn.execute("DELETE FROM scrapers WHERE id = ?1", [id])?;
    Ok(())
}

fn scraper_ids_for(conn: &rusqlite::Connection, repository_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM scrapers WHERE repository_id = ?1")?;
    let ids = stmt
        .query_map([repository_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Persistent scraper store
pub struct SqliteStore {
    db: Arc<DatabaseManager>,
}

impl SqliteStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<DatabaseManager> {
        &self.db
    }
}

#[async_trait]
impl ScraperStore for SqliteStore {
    async fn list_repositories(&self) -> Result<Vec<RepositoryDescriptor>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM repositories ORDER BY name, id",
                    REPOSITORY_COLUMNS
                ))?;
                let repositories = stmt
                    .query_map([], repository_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(repositories)
            })
            .await
    }

    async fn get_repository(&self, id: &str) -> Result<Option<RepositoryDescriptor>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS),
                        [&id],
                        repository_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn list_scrapers(&self) -> Result<Vec<ScraperDescriptor>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(&format!("SELECT {} FROM scrapers ORDER BY id", SCRAPER_COLUMNS))?;
                let scrapers = stmt
                    .query_map([], scraper_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(scrapers)
            })
            .await
    }

    async fn get_scraper(&self, id: &str) -> Result<Option<ScraperDescriptor>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {} FROM scrapers WHERE id = ?1", SCRAPER_COLUMNS),
                        [&id],
                        scraper_from_row,
                    )
                    .optional()?)
            })
            .await
    }

    async fn replace_repository(&self, repository: RepositoryDescriptor, scrapers: Vec<InstalledScraper>) -> Result<()> {
        self.db
            .transaction(move |tx| {
                tx.execute(
                    "INSERT INTO repositories (id, manifest_url, name, last_refreshed, scraper_count)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        manifest_url = excluded.manifest_url,
                        name = excluded.name,
                        last_refreshed = excluded.last_refreshed,
                        scraper_count = excluded.scraper_count",
                    params![
                        repository.id,
                        repository.manifest_url,
                        repository.name,
                        repository.last_refreshed.to_rfc3339(),
                        repository.scraper_count as i64,
                    ],
                )?;

                for stale in scraper_ids_for(tx, &repository.id)?
                    .into_iter()
                    .filter(|id| !scrapers.iter().any(|s| &s.descriptor.id == id))
                {
                    delete_scraper(tx, &stale)?;
                }

                for installed in &scrapers {
                    let d = &installed.descriptor;
                    tx.execute(
                        "INSERT INTO scrapers (id, repository_id, name, version, description, logo,
                            supported_types, content_language, formats, manifest_enabled, enabled, code_url)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                         ON CONFLICT(id) DO UPDATE SET
                            repository_id = excluded.repository_id,
                            name = excluded.name,
                            version = excluded.version,
                            description = excluded.description,
                            logo = excluded.logo,
                            supported_types = excluded.supported_types,
                            content_language = excluded.content_language,
                            formats = excluded.formats,
                            manifest_enabled = excluded.manifest_enabled,
                            enabled = excluded.enabled,
                            code_url = excluded.code_url",
                        params![
                            d.id,
                            d.repository_id,
                            d.name,
                            d.version,
                            d.description,
                            d.logo,
                            serde_json::to_string(&d.supported_types)?,
                            serde_json::to_string(&d.content_language)?,
                            serde_json::to_string(&d.formats)?,
                            d.manifest_enabled,
                            d.enabled,
                            d.code_url,
                        ],
                    )?;
                    tx.execute(
                        "INSERT INTO scraper_code (scraper_id, code) VALUES (?1, ?2)
                         ON CONFLICT(scraper_id) DO UPDATE SET code = excluded.code",
                        params![d.id, installed.code],
                    )?;
                }

                Ok(())
            })
            .await
    }

    async fn remove_repository(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.db
            .transaction(move |tx| {
                for scraper_id in scraper_ids_for(tx, &id)? {
                    delete_scraper(tx, &scraper_id)?;
                }
                let removed = tx.execute("DELETE FROM repositories WHERE id = ?1", [&id])?;
                Ok(removed > 0)
            })
            .await
    }

    async fn set_scraper_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let updated = conn.execute("UPDATE scrapers SET enabled = ?1 WHERE id = ?2", params![enabled, id])?;
                Ok(updated > 0)
            })
            .await
    }

    async fn scraper_code(&self, id: &str) -> Result<Option<String>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                Ok(conn
                    .query_row("SELECT code FROM scraper_code WHERE scraper_id = ?1", [&id], |row| row.get(0))
                    .optional()?)
            })
            .await
    }

    async fn scraper_settings(&self, id: &str) -> Result<Value> {
        let id = id.to_string();
        let stored: Option<String> = self
            .db
            .execute(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT settings FROM scraper_settings WHERE scraper_id = ?1",
                        [&id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        match stored {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Ok(Value::Object(Default::default())),
        }
    }

    async fn set_scraper_settings(&self, id: &str, settings: Value) -> Result<()> {
        let id = id.to_string();
        let text = serde_json::to_string(&settings)?;
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO scraper_settings (scraper_id, settings) VALUES (?1, ?2)
                     ON CONFLICT(scraper_id) DO UPDATE SET settings = excluded.settings",
                    params![id, text],
                )?;
                Ok(())
            })
            .await
    }

    async fn plugins_enabled(&self) -> Result<bool> {
        let value: Option<String> = self
            .db
            .execute(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT value FROM app_settings WHERE key = ?1",
                        [PLUGINS_ENABLED_KEY],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        Ok(value.map_or(true, |v| v != "false"))
    }

    async fn set_plugins_enabled(&self, enabled: bool) -> Result<()> {
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![PLUGINS_ENABLED_KEY, enabled.to_string()],
                )?;
                Ok(())
            })
            .await
    }
}
