//! Search result cache
//!
//! Caches complete search responses keyed by a stable fingerprint of the
//! user, the normalized query parameters, and the sorted source set. Results
//! are stored as a versioned JSON payload so stored history survives schema
//! evolution; rows whose payload no longer parses are treated as a miss, not
//! an error.

use crate::normalize::NormalizedOffer;
use crate::storage::{now_timestamp, CacheEntryRecord, SqliteStorage, Storage};
use crate::Result;
use chrono::{Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};

/// Version of the stored result payload
pub const CACHE_PAYLOAD_VERSION: u32 = 1;

/// The JSON value stored in a cache row's `results` column
#[derive(Debug, Serialize, Deserialize)]
pub struct CachePayload {
    pub version: u32,
    pub offers: Vec<NormalizedOffer>,
}

/// A cache hit returned to the engine
#[derive(Debug)]
pub struct CachedSearch {
    pub offers: Vec<NormalizedOffer>,
    pub scraped_count: i64,
    pub deduplicated_count: i64,
    pub sources_used: Vec<String>,
    pub cached_at: String,
    pub hit_count: i64,
}

pub struct CacheStore {
    storage: Arc<Mutex<SqliteStorage>>,
}

impl CacheStore {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>) -> Self {
        Self { storage }
    }

    /// Derives the stable cache key for a search
    ///
    /// Parameters are lowercased and trimmed, sources sorted, and the
    /// canonical string digested with SHA-256, so the key survives process
    /// restarts and parameter-order changes.
    pub fn derive_key(
        user_id: &str,
        keywords: &str,
        location: Option<&str>,
        job_type: Option<&str>,
        work_mode: Option<&str>,
        company: Option<&str>,
        sources: &[String],
    ) -> String {
        let norm = |s: Option<&str>| s.unwrap_or_default().trim().to_lowercase();

        let mut sorted_sources: Vec<&str> = sources.iter().map(String::as_str).collect();
        sorted_sources.sort_unstable();

        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}",
            user_id,
            keywords.trim().to_lowercase(),
            norm(location),
            norm(job_type),
            norm(work_mode),
            norm(company),
            sorted_sources.join("|"),
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Reads a valid, unexpired entry and counts the hit
    ///
    /// Returns `None` on miss, expiry, invalidation, or an unreadable
    /// payload. The returned offers are a fresh deep copy of the stored
    /// snapshot; callers can mutate them freely.
    pub fn read(&self, key: &str) -> Result<Option<CachedSearch>> {
        let entry = {
            let mut storage = self.storage.lock().unwrap();
            storage.cache_read_valid(key, &now_timestamp())?
        };

        let Some(entry) = entry else {
            return Ok(None);
        };

        let payload: CachePayload = match serde_json::from_str(&entry.results) {
            Ok(p) => p,
            Err(e) => {
                // A corrupted row behaves like a miss; the next write
                // supersedes it.
                tracing::warn!(key = %&key[..8.min(key.len())], "unreadable cache payload: {}", e);
                return Ok(None);
            }
        };

        if payload.version != CACHE_PAYLOAD_VERSION {
            tracing::warn!(
                key = %&key[..8.min(key.len())],
                version = payload.version,
                "cache payload from unsupported version, ignoring"
            );
            return Ok(None);
        }

        tracing::debug!(
            key = %&key[..8.min(key.len())],
            hits = entry.hit_count,
            "cache hit"
        );

        Ok(Some(CachedSearch {
            offers: payload.offers,
            scraped_count: entry.scraped_count,
            deduplicated_count: entry.deduplicated_count,
            sources_used: entry.sources_used,
            cached_at: entry.created_at,
            hit_count: entry.hit_count,
        }))
    }

    /// Writes a search response, superseding any row with the same key
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        key: &str,
        user_id: &str,
        keywords: &str,
        location: Option<&str>,
        job_type: Option<&str>,
        work_mode: Option<&str>,
        company: Option<&str>,
        sources_used: &[String],
        offers: &[NormalizedOffer],
        scraped_count: i64,
        deduplicated_count: i64,
        ttl_hours: i64,
    ) -> Result<()> {
        let now = Utc::now();
        let payload = CachePayload {
            version: CACHE_PAYLOAD_VERSION,
            offers: offers.to_vec(),
        };

        let entry = CacheEntryRecord {
            cache_key: key.to_string(),
            user_id: user_id.to_string(),
            keywords: keywords.to_string(),
            location: location.map(str::to_string),
            job_type: job_type.map(str::to_string),
            work_mode: work_mode.map(str::to_string),
            company: company.map(str::to_string),
            sources_used: sources_used.to_vec(),
            results: serde_json::to_string(&payload)?,
            results_count: offers.len() as i64,
            scraped_count,
            deduplicated_count,
            created_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            expires_at: (now + Duration::hours(ttl_hours))
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            hit_count: 0,
            is_valid: true,
        };

        let mut storage = self.storage.lock().unwrap();
        storage.cache_write(&entry)?;
        tracing::debug!(key = %&key[..8.min(key.len())], ttl_hours, "cache write");
        Ok(())
    }

    /// Deletes all cache rows for a user
    pub fn invalidate_user(&self, user_id: &str) -> Result<usize> {
        let mut storage = self.storage.lock().unwrap();
        Ok(storage.cache_invalidate_user(user_id)?)
    }

    /// Deletes one cache row
    pub fn invalidate_key(&self, key: &str) -> Result<usize> {
        let mut storage = self.storage.lock().unwrap();
        Ok(storage.cache_invalidate_key(key)?)
    }

    /// Deletes every expired row, valid or not
    pub fn sweep(&self) -> Result<usize> {
        let mut storage = self.storage.lock().unwrap();
        let removed = storage.cache_sweep(&now_timestamp())?;
        if removed > 0 {
            tracing::info!(removed, "swept expired cache entries");
        }
        Ok(removed)
    }
}
