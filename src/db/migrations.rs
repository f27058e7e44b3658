//! Database migrations
//!
//! Schema versions are tracked in `schema_migrations` and applied in order.

use crate::core::error::Result;
use rusqlite::Connection;
use tracing::info;

/// Migration version tracking table
const MIGRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Initial schema (version 1)
const MIGRATION_V1: &str = r#"
-- Installed repositories
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    manifest_url TEXT NOT NULL,
    name TEXT NOT NULL,
    last_refreshed TEXT NOT NULL,
    scraper_count INTEGER NOT NULL DEFAULT 0
);

-- Installed scrapers, keyed globally by manifest id
CREATE TABLE IF NOT EXISTS scrapers (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    description TEXT,
    logo TEXT,
    supported_types TEXT NOT NULL,
    content_language TEXT NOT NULL DEFAULT '[]',
    formats TEXT NOT NULL DEFAULT '[]',
    manifest_enabled INTEGER NOT NULL DEFAULT 1,
    enabled INTEGER NOT NULL DEFAULT 1,
    code_url TEXT NOT NULL,
    FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS scraper_code (
    scraper_id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    FOREIGN KEY (scraper_id) REFERENCES scrapers(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS scraper_settings (
    scraper_id TEXT PRIMARY KEY,
    settings TEXT NOT NULL,
    FOREIGN KEY (scraper_id) REFERENCES scrapers(id) ON DELETE CASCADE
);

-- Global key/value flags
CREATE TABLE IF NOT EXISTS app_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scrapers_repository ON scrapers(repository_id);
"#;

/// Apply every pending migration
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_TABLE)?;

    let current_version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        info!("Applying migration v1: Scraper registry");
        apply_migration(conn, 1, MIGRATION_V1)?;
    }

    Ok(())
}

fn apply_migration(conn: &mut Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])?;
    tx.commit()?;
    info!(version, "Migration applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('repositories', 'scrapers', 'scraper_code', 'scraper_settings', 'app_settings')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }
}
