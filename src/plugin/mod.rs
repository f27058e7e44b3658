//! Scraper plugin system
//!
//! This module provides:
//! - Repository installation from remote manifests
//! - Persistent registry accessors for scrapers, code and settings
//! - A sandboxed JavaScript runtime with fetch, DOM and crypto bridges
//! - The orchestrator that runs scrapers concurrently and merges results

pub mod crypto;
pub mod dom;
pub mod http;
pub mod installer;
pub mod js_bindings;
pub mod js_runtime;
pub mod manager;
pub mod normalizer;
pub mod registry;
pub mod sandbox;
pub mod types;

pub use installer::{InstallReport, ScraperInstaller};
pub use js_runtime::{ExecutionOutcome, SandboxRuntime, ScriptInvocation, ScriptRunner};
pub use manager::ScraperManager;
pub use registry::{InstalledScraper, MemoryStore, ScraperStore};
pub use sandbox::{ExecutionPhase, ResourceLimits};
pub use types::{
    ExecutionStatus, MediaRequest, MediaType, RepositoryDescriptor, ScraperDescriptor, ScraperEvent,
    ScraperExecutionKey, ScraperResult,
};
