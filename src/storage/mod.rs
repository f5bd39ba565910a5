//! Storage module for persisting aggregation data
//!
//! This module handles all database operations for the engine, including:
//! - Persisted job offers (idempotent by source URL)
//! - Per-user source preferences
//! - The search result cache
//! - Watched entities and user watches
//! - User-submitted custom sources
//! - The background scrape queue

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::normalize::NormalizedOffer;
use chrono::{SecondsFormat, Utc};

/// Current time as the fixed-width RFC3339 string stored in the database
///
/// Second precision and a literal `Z` keep stored timestamps lexicographically
/// comparable, which the expiry queries rely on.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A persisted job offer
#[derive(Debug, Clone)]
pub struct OfferRecord {
    pub id: i64,
    /// Owning user, when the offer was persisted on behalf of one
    pub user_id: Option<String>,
    pub offer: NormalizedOffer,
    pub created_at: String,
}

/// Per-user source preferences
#[derive(Debug, Clone)]
pub struct PrefsRecord {
    pub user_id: String,
    pub enabled_sources: Vec<String>,
    pub priority_sources: Vec<String>,
    pub use_cache: bool,
    pub cache_ttl_hours: i64,
    pub background_scraping_enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the search result cache
#[derive(Debug, Clone)]
pub struct CacheEntryRecord {
    pub cache_key: String,
    pub user_id: String,
    pub keywords: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub work_mode: Option<String>,
    pub company: Option<String>,
    pub sources_used: Vec<String>,
    /// Versioned JSON payload, owned by the cache layer
    pub results: String,
    pub results_count: i64,
    pub scraped_count: i64,
    pub deduplicated_count: i64,
    pub created_at: String,
    pub expires_at: String,
    pub hit_count: i64,
    pub is_valid: bool,
}

/// A company watched by at least one user
#[derive(Debug, Clone)]
pub struct WatchedEntityRecord {
    pub id: i64,
    pub canonical_name: String,
    pub slug: String,
    pub watcher_count: i64,
    pub last_scraped_at: Option<String>,
    pub scraping_frequency_hours: i64,
    pub total_offers_found: i64,
    pub created_at: String,
}

/// One user's watch on an entity
#[derive(Debug, Clone)]
pub struct UserWatchRecord {
    pub id: i64,
    pub user_id: String,
    pub watched_entity_id: i64,
    pub alert_threshold: i64,
    pub profile_id: Option<String>,
    pub created_at: String,
}

/// A user-submitted custom source
#[derive(Debug, Clone)]
pub struct CustomSourceRecord {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub source_type: String,
    pub is_active: bool,
    /// JSON of the accessibility analysis captured at creation time
    pub last_analysis: Option<String>,
    pub last_scraped_at: Option<String>,
    pub created_at: String,
}

/// A deferred background scrape job
#[derive(Debug, Clone)]
pub struct PendingScrapeRecord {
    pub id: i64,
    pub user_id: String,
    /// Serialized search parameters
    pub params: String,
    pub source_ids: Vec<String>,
    pub queued_at: String,
}
