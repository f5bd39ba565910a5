//! Offerflow: a job-offer aggregation and caching engine
//!
//! This crate aggregates job listings from heterogeneous external sources
//! (JSON feeds, paged APIs, scraped HTML boards), merges them into a single
//! deduplicated result set, and serves results through a TTL cache. Recurring
//! company watches are mutualized across users, and an accessibility probe
//! classifies arbitrary user-submitted URLs.

pub mod ai;
pub mod cache;
pub mod config;
pub mod custom;
pub mod dedup;
pub mod engine;
pub mod normalize;
pub mod probe;
pub mod source;
pub mod storage;
pub mod watch;

use thiserror::Error;

/// Main error type for Offerflow operations
#[derive(Debug, Error)]
pub enum OfferflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown source id: {0}")]
    UnknownSource(String),

    #[error("Watch not found: {0}")]
    WatchNotFound(i64),

    #[error("Custom source rejected: {0}")]
    CustomSourceRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Offerflow operations
pub type Result<T> = std::result::Result<T, OfferflowError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use engine::{SearchEngine, SearchOutcome, SearchParams};
pub use normalize::NormalizedOffer;
pub use probe::{AccessibilityAnalysis, AccessibilityProbe};
pub use source::{RawOffer, SourceQuery, SourceRegistry};
pub use watch::WatchService;
