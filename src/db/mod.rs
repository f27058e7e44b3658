//! Database module
//!
//! SQLite connection pooling, schema migrations, and the persistent
//! implementation of the scraper store.

pub mod manager;
pub mod migrations;
pub mod repository;

pub use manager::DatabaseManager;
pub use repository::SqliteStore;
