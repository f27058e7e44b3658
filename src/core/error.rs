//! Error type system for the scraper engine
//!
//! This module provides the error taxonomy shared by the orchestrator,
//! the sandbox runtime and the persistence layer:
//! - Repository and manifest failures surfaced to callers
//! - Execution and bridge failures that are recovered locally
//! - Ambient I/O, database and configuration failures

/// Main error type for the scraper engine
#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    // Repository-level errors (surfaced to the caller)
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Scraper not found: {0}")]
    ScraperNotFound(String),

    // Execution errors (recovered to an empty result)
    #[error("Scraper execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Scraper payload too large: {size} bytes exceeds {limit} bytes")]
    OversizedPayload { size: u64, limit: u64 },

    #[error("Bridge protocol error: {0}")]
    BridgeProtocol(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // System-level errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl ScraperError {
    /// Get the error type name used as a structured log field
    pub fn error_type(&self) -> &'static str {
        match self {
            ScraperError::ManifestFetch(_) => "ManifestFetchError",
            ScraperError::RepositoryNotFound(_) => "RepositoryNotFoundError",
            ScraperError::ScraperNotFound(_) => "ScraperNotFoundError",
            ScraperError::ExecutionFailure(_) => "ScraperExecutionFailure",
            ScraperError::OversizedPayload { .. } => "OversizedScraperPayload",
            ScraperError::BridgeProtocol(_) => "BridgeProtocolError",
            ScraperError::Timeout(_) => "Timeout",
            ScraperError::Config(_) => "ConfigError",
            ScraperError::Database(_) => "DatabaseError",
            ScraperError::Io(_) => "IoError",
            ScraperError::Network(_) => "NetworkError",
            ScraperError::Serialization(_) => "SerializationError",
            ScraperError::Task(_) => "TaskError",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScraperError::ManifestFetch(_)
                | ScraperError::Database(_)
                | ScraperError::Network(_)
                | ScraperError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for ScraperError {
    fn from(err: serde_json::Error) -> Self {
        ScraperError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ScraperError {
    fn from(err: reqwest::Error) -> Self {
        ScraperError::Network(err.to_string())
    }
}

/// Result type alias for operations that can fail with ScraperError
pub type Result<T> = std::result::Result<T, ScraperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        assert_eq!(
            ScraperError::ManifestFetch("boom".into()).error_type(),
            "ManifestFetchError"
        );
        assert_eq!(
            ScraperError::RepositoryNotFound("r1".into()).error_type(),
            "RepositoryNotFoundError"
        );
        assert_eq!(
            ScraperError::OversizedPayload { size: 10, limit: 5 }.error_type(),
            "OversizedScraperPayload"
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(ScraperError::Network("reset".into()).is_retryable());
        assert!(ScraperError::ManifestFetch("503".into()).is_retryable());
        assert!(!ScraperError::RepositoryNotFound("x".into()).is_retryable());
        assert!(!ScraperError::BridgeProtocol("bad".into()).is_retryable());
    }

    #[test]
    fn test_oversized_message() {
        let err = ScraperError::OversizedPayload { size: 6_000_000, limit: 5_242_880 };
        let msg = err.to_string();
        assert!(msg.contains("6000000"));
        assert!(msg.contains("5242880"));
    }

    #[test]
    fn test_from_serde_error() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: ScraperError = parse.unwrap_err().into();
        assert_eq!(err.error_type(), "SerializationError");
    }
}
