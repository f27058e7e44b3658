//! Stream Scrapers CLI
//!
//! Manages scraper repositories and resolves playable streams for a media item.

use stream_scrapers::core::config::{CliArgs, Command};
use stream_scrapers::core::{Config, Logger};
use stream_scrapers::plugin::{MediaRequest, MediaType, ScraperManager, ScraperStore};
use stream_scrapers::{DatabaseManager, SqliteStore};

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config = match Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Logging is not initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!(version = stream_scrapers::VERSION, "Starting stream-scrapers");
    info!(path = ?config.database.path, "Database configuration");
    info!(
        max_concurrency = config.scrapers.max_concurrency,
        execution_timeout_secs = config.scrapers.execution_timeout_secs,
        "Scraper configuration"
    );

    let db = Arc::new(
        DatabaseManager::new(
            &config.database.path,
            config.database.connection_pool_size as u32,
            Duration::from_millis(config.database.busy_timeout),
        )
        .context("Failed to open database")?,
    );
    let store: Arc<dyn ScraperStore> = Arc::new(SqliteStore::new(db));
    let manager = ScraperManager::new(&config.scrapers, store).context("Failed to create scraper manager")?;

    run(&manager, args.command).await
}

async fn run(manager: &ScraperManager, command: Command) -> Result<()> {
    match command {
        Command::AddRepo { url } => {
            let repository = manager.add_repository(&url).await?;
            print_json(&repository)
        }
        Command::Refresh { id } => {
            let repository = manager.refresh_repository(&id).await?;
            print_json(&repository)
        }
        Command::RemoveRepo { id } => {
            manager.remove_repository(&id).await?;
            println!("Removed repository {}", id);
            Ok(())
        }
        Command::List => {
            #[derive(Serialize)]
            struct Listing<T, U> {
                plugins_enabled: bool,
                repositories: T,
                scrapers: U,
            }

            print_json(&Listing {
                plugins_enabled: manager.plugins_enabled().await?,
                repositories: manager.list_repositories().await?,
                scrapers: manager.list_scrapers().await?,
            })
        }
        Command::Toggle { id, enabled } => {
            manager.toggle_scraper(&id, enabled).await?;
            println!("Scraper {} {}", id, if enabled { "enabled" } else { "disabled" });
            Ok(())
        }
        Command::Enable => {
            manager.set_plugins_enabled(true).await?;
            println!("Scrapers enabled");
            Ok(())
        }
        Command::Disable => {
            manager.set_plugins_enabled(false).await?;
            println!("Scrapers disabled");
            Ok(())
        }
        Command::Streams {
            media_id,
            media_type,
            season,
            episode,
            stream,
        } => {
            let media_type: MediaType = media_type.parse().map_err(anyhow::Error::msg)?;
            let request = MediaRequest {
                media_id,
                media_type,
                season,
                episode,
            };

            if stream {
                let mut events = manager.execute_scrapers_streaming(&request).await?;
                while let Some(event) = events.next().await {
                    println!("{}", serde_json::to_string(&event)?);
                }
                Ok(())
            } else {
                print_json(&manager.execute_scrapers(&request).await?)
            }
        }
        Command::Test { id } => {
            let event = manager.test_scraper(&id).await?;
            print_json(&event)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
