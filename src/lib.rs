//! Stream Scrapers Library
//!
//! Installs community scraper repositories, executes their JavaScript in
//! isolated sandboxes, and merges the playable links they return.

pub mod core;
pub mod db;
pub mod plugin;

pub use crate::core::{Config, ScraperError};
pub use db::{DatabaseManager, SqliteStore};
pub use plugin::{MediaRequest, MediaType, ScraperManager, ScraperResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
