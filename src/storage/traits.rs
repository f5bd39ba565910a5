//! Storage traits and error types

use crate::normalize::NormalizedOffer;
use crate::storage::{
    CacheEntryRecord, CustomSourceRecord, OfferRecord, PendingScrapeRecord, PrefsRecord,
    UserWatchRecord, WatchedEntityRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    EntityNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// All timestamps are fixed-width RFC3339 strings (see
/// [`crate::storage::now_timestamp`]). The shared counters (`hit_count`,
/// `watcher_count`) must be mutated with single-statement SQL increments so
/// concurrent callers cannot lose updates.
pub trait Storage {
    // ===== Offers =====

    /// Persists an offer unless one with the same source URL already exists
    ///
    /// Returns true when a new row was inserted.
    fn insert_offer_if_new(
        &mut self,
        user_id: Option<&str>,
        offer: &NormalizedOffer,
    ) -> StorageResult<bool>;

    /// Looks up an offer by its source URL
    fn get_offer_by_url(&self, url: &str) -> StorageResult<Option<OfferRecord>>;

    /// Total persisted offers
    fn count_offers(&self) -> StorageResult<u64>;

    // ===== User source preferences =====

    fn get_prefs(&self, user_id: &str) -> StorageResult<Option<PrefsRecord>>;

    /// Inserts or replaces the preferences row for `record.user_id`
    fn save_prefs(&mut self, record: &PrefsRecord) -> StorageResult<()>;

    // ===== Result cache =====

    /// Reads a cache entry if it is valid and unexpired at `now`, counting
    /// the hit
    ///
    /// The hit counter is incremented with the same statement that checks
    /// validity, so every honored read counts exactly once.
    fn cache_read_valid(&mut self, key: &str, now: &str)
        -> StorageResult<Option<CacheEntryRecord>>;

    /// Fetches a cache entry regardless of validity or expiry
    fn get_cache_entry(&self, key: &str) -> StorageResult<Option<CacheEntryRecord>>;

    /// Upserts a cache entry; an existing row for the key is superseded and
    /// its hit count reset
    fn cache_write(&mut self, entry: &CacheEntryRecord) -> StorageResult<()>;

    /// Deletes all cache rows for a user; returns the number removed
    fn cache_invalidate_user(&mut self, user_id: &str) -> StorageResult<usize>;

    /// Deletes one cache row; returns the number removed
    fn cache_invalidate_key(&mut self, key: &str) -> StorageResult<usize>;

    /// Deletes all rows expired at `now`, valid or not; returns the number
    /// removed
    fn cache_sweep(&mut self, now: &str) -> StorageResult<usize>;

    fn count_cache_entries(&self) -> StorageResult<u64>;

    // ===== Watched entities =====

    fn get_entity_by_slug(&self, slug: &str) -> StorageResult<Option<WatchedEntityRecord>>;

    fn get_entity(&self, entity_id: i64) -> StorageResult<WatchedEntityRecord>;

    fn insert_entity(
        &mut self,
        canonical_name: &str,
        slug: &str,
        scraping_frequency_hours: i64,
    ) -> StorageResult<i64>;

    /// Atomically increments the watcher count; returns the new value
    fn increment_watchers(&mut self, entity_id: i64) -> StorageResult<i64>;

    /// Atomically decrements the watcher count, floored at zero; returns the
    /// new value
    fn decrement_watchers(&mut self, entity_id: i64) -> StorageResult<i64>;

    fn delete_entity(&mut self, entity_id: i64) -> StorageResult<()>;

    /// Entities with at least one watcher
    fn list_watched_entities(&self) -> StorageResult<Vec<WatchedEntityRecord>>;

    /// Stamps a completed scrape and adds `saved_count` to the entity's
    /// running total
    fn record_entity_scrape(
        &mut self,
        entity_id: i64,
        scraped_at: &str,
        saved_count: i64,
    ) -> StorageResult<()>;

    // ===== User watches =====

    fn get_user_watch(
        &self,
        user_id: &str,
        entity_id: i64,
    ) -> StorageResult<Option<UserWatchRecord>>;

    fn get_watch(&self, watch_id: i64) -> StorageResult<Option<UserWatchRecord>>;

    fn insert_watch(
        &mut self,
        user_id: &str,
        entity_id: i64,
        alert_threshold: i64,
        profile_id: Option<&str>,
    ) -> StorageResult<i64>;

    fn delete_watch(&mut self, watch_id: i64) -> StorageResult<()>;

    /// The oldest watch on an entity (used to assign ownership of offers
    /// found by the watch scraper)
    fn first_watcher(&self, entity_id: i64) -> StorageResult<Option<UserWatchRecord>>;

    fn list_watches_for_user(&self, user_id: &str) -> StorageResult<Vec<UserWatchRecord>>;

    // ===== Custom sources =====

    fn custom_source_exists(&self, user_id: &str, url: &str) -> StorageResult<bool>;

    fn insert_custom_source(
        &mut self,
        user_id: &str,
        name: &str,
        url: &str,
        source_type: &str,
        is_active: bool,
        last_analysis: Option<&str>,
    ) -> StorageResult<i64>;

    fn list_custom_sources(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> StorageResult<Vec<CustomSourceRecord>>;

    /// Manual override of the probe-derived active flag; returns false when
    /// the source does not belong to the user
    fn set_custom_source_active(
        &mut self,
        user_id: &str,
        source_id: i64,
        active: bool,
    ) -> StorageResult<bool>;

    fn delete_custom_source(&mut self, user_id: &str, source_id: i64) -> StorageResult<bool>;

    // ===== Background scrape queue =====

    fn enqueue_pending_scrape(
        &mut self,
        user_id: &str,
        params: &str,
        source_ids: &[String],
    ) -> StorageResult<i64>;

    /// Removes and returns up to `limit` queued jobs, oldest first
    fn drain_pending_scrapes(&mut self, limit: usize) -> StorageResult<Vec<PendingScrapeRecord>>;

    fn count_pending_scrapes(&self) -> StorageResult<u64>;
}
