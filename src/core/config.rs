//! Configuration management

use clap::{Parser, Subcommand};
use config::{Config as ConfigBuilder, ConfigError as BuilderError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default User-Agent sent with manifest, code and bridge requests
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 12; TV) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Default location of the crypto library evaluated into every sandbox
pub const DEFAULT_CRYPTO_LIBRARY: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/crypto-js/4.2.0/crypto-js.min.js";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid scraper configuration: {0}")]
    InvalidScrapers(String),

    #[error("Invalid database configuration: {0}")]
    InvalidDatabase(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scrapers: ScraperConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // Example: STREAM_SCRAPERS__SCRAPERS__MAX_CONCURRENCY=8
        builder = builder.add_source(
            Environment::with_prefix("STREAM_SCRAPERS")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(db_path) = &cli_args.database {
            builder = builder.set_override("database.path", db_path.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }
        if let Some(timeout) = cli_args.timeout {
            builder = builder.set_override("scrapers.execution_timeout_secs", timeout)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigBuilder::builder())?
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scrapers.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(builder
        .set_default("scrapers.max_concurrency", 5)?
        .set_default("scrapers.execution_timeout_secs", 60)?
        .set_default("scrapers.fetch_timeout_secs", 30)?
        .set_default("scrapers.max_results", 150)?
        .set_default("scrapers.max_code_size", 5_242_880u64)? // 5 MB
        .set_default("scrapers.max_response_size", 10_485_760u64)? // 10 MB
        .set_default("scrapers.user_agent", DEFAULT_USER_AGENT)?
        .set_default("scrapers.crypto_library", DEFAULT_CRYPTO_LIBRARY)?
        .set_default("database.path", "./data/scrapers.db")?
        .set_default("database.connection_pool_size", 4)?
        .set_default("database.busy_timeout", 5000)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stdout")?)
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "stream-scrapers")]
#[command(about = "Manage scraper repositories and resolve streams in a sandbox", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Database file path
    #[arg(short, long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Per-scraper execution timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a scraper repository from its manifest URL
    AddRepo { url: String },
    /// Re-fetch a repository manifest and all of its scrapers
    Refresh { id: String },
    /// Remove a repository and every scraper it owns
    RemoveRepo { id: String },
    /// List repositories and scrapers
    List,
    /// Enable or disable a single scraper
    Toggle {
        id: String,
        #[arg(value_parser = parse_switch)]
        enabled: bool,
    },
    /// Enable scraper execution globally
    Enable,
    /// Disable scraper execution globally
    Disable,
    /// Resolve streams for a media item
    Streams {
        media_id: String,
        /// "movie" or "tv"
        media_type: String,
        #[arg(long)]
        season: Option<u32>,
        #[arg(long)]
        episode: Option<u32>,
        /// Print each scraper's results as it completes
        #[arg(long)]
        stream: bool,
    },
    /// Run one scraper against a well-known sample title
    Test { id: String },
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "1" | "enable" => Ok(true),
        "off" | "false" | "0" | "disable" => Ok(false),
        other => Err(format!("expected on/off, got '{}'", other)),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    pub max_concurrency: usize,
    pub execution_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_results: usize,
    pub max_code_size: u64, // bytes
    /// Ceiling for one bridged fetch body, after decompression
    pub max_response_size: u64, // bytes
    pub user_agent: String,
    /// Local path or http(s) URL of the crypto library source
    pub crypto_library: String,
}

impl ScraperConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidScrapers("max_concurrency must be greater than 0".to_string()));
        }

        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::InvalidScrapers("execution_timeout_secs must be greater than 0".to_string()));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidScrapers("fetch_timeout_secs must be greater than 0".to_string()));
        }

        if self.max_results == 0 {
            return Err(ConfigError::InvalidScrapers("max_results must be greater than 0".to_string()));
        }

        if self.max_code_size == 0 {
            return Err(ConfigError::InvalidScrapers("max_code_size must be greater than 0".to_string()));
        }

        if self.max_response_size == 0 {
            return Err(ConfigError::InvalidScrapers("max_response_size must be greater than 0".to_string()));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidScrapers("user_agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            execution_timeout_secs: 60,
            fetch_timeout_secs: 30,
            max_results: 150,
            max_code_size: 5 * 1024 * 1024,
            max_response_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            crypto_library: DEFAULT_CRYPTO_LIBRARY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub connection_pool_size: usize,
    pub busy_timeout: u64, // milliseconds
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatabase("path cannot be empty".to_string()));
        }

        if self.connection_pool_size == 0 {
            return Err(ConfigError::InvalidDatabase("connection_pool_size must be greater than 0".to_string()));
        }

        if self.busy_timeout == 0 {
            return Err(ConfigError::InvalidDatabase("busy_timeout must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!("level must be one of: {:?}", valid_levels)));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!("format must be one of: {:?}", valid_formats)));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!("output must be one of: {:?}", valid_outputs)));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        Ok(())
    }
}
