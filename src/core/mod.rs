//! Core application layer
//!
//! Configuration, structured logging, the error type, and request
//! deduplication shared by the plugin system.

pub mod config;
pub mod error;
pub mod logging;
pub mod single_flight;

pub use config::Config;
pub use error::{Result, ScraperError};
pub use logging::Logger;
pub use single_flight::SingleFlight;
