//! SQLite storage implementation

use crate::normalize::NormalizedOffer;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    now_timestamp, CacheEntryRecord, CustomSourceRecord, OfferRecord, PendingScrapeRecord,
    PrefsRecord, UserWatchRecord, WatchedEntityRecord,
};
use crate::OfferflowError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> Result<Self, OfferflowError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, OfferflowError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Parses a JSON string-array column inside a row-mapping closure
fn json_vec(raw: String, idx: usize) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a stored RFC3339 timestamp inside a row-mapping closure
fn parse_timestamp(raw: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const OFFER_COLUMNS: &str = "id, user_id, job_title, company_name, location, description, \
     source_url, source_platform, job_type, work_mode, tags, scraped_at, created_at";

fn offer_from_row(row: &Row<'_>) -> rusqlite::Result<OfferRecord> {
    Ok(OfferRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        offer: NormalizedOffer {
            job_title: row.get(2)?,
            company_name: row.get(3)?,
            location: row.get(4)?,
            description: row.get(5)?,
            source_url: row.get(6)?,
            source_platform: row.get(7)?,
            job_type: row.get(8)?,
            work_mode: row.get(9)?,
            tags: json_vec(row.get(10)?, 10)?,
            scraped_at: parse_timestamp(row.get(11)?, 11)?,
        },
        created_at: row.get(12)?,
    })
}

const CACHE_COLUMNS: &str = "cache_key, user_id, keywords, location, job_type, work_mode, \
     company, sources_used, results, results_count, scraped_count, deduplicated_count, \
     created_at, expires_at, hit_count, is_valid";

fn cache_entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntryRecord> {
    Ok(CacheEntryRecord {
        cache_key: row.get(0)?,
        user_id: row.get(1)?,
        keywords: row.get(2)?,
        location: row.get(3)?,
        job_type: row.get(4)?,
        work_mode: row.get(5)?,
        company: row.get(6)?,
        sources_used: json_vec(row.get(7)?, 7)?,
        results: row.get(8)?,
        results_count: row.get(9)?,
        scraped_count: row.get(10)?,
        deduplicated_count: row.get(11)?,
        created_at: row.get(12)?,
        expires_at: row.get(13)?,
        hit_count: row.get(14)?,
        is_valid: row.get(15)?,
    })
}

const ENTITY_COLUMNS: &str = "id, canonical_name, slug, watcher_count, last_scraped_at, \
     scraping_frequency_hours, total_offers_found, created_at";

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<WatchedEntityRecord> {
    Ok(WatchedEntityRecord {
        id: row.get(0)?,
        canonical_name: row.get(1)?,
        slug: row.get(2)?,
        watcher_count: row.get(3)?,
        last_scraped_at: row.get(4)?,
        scraping_frequency_hours: row.get(5)?,
        total_offers_found: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const WATCH_COLUMNS: &str = "id, user_id, watched_entity_id, alert_threshold, profile_id, created_at";

fn watch_from_row(row: &Row<'_>) -> rusqlite::Result<UserWatchRecord> {
    Ok(UserWatchRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        watched_entity_id: row.get(2)?,
        alert_threshold: row.get(3)?,
        profile_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const CUSTOM_COLUMNS: &str =
    "id, user_id, name, url, source_type, is_active, last_analysis, last_scraped_at, created_at";

fn custom_from_row(row: &Row<'_>) -> rusqlite::Result<CustomSourceRecord> {
    Ok(CustomSourceRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        source_type: row.get(4)?,
        is_active: row.get(5)?,
        last_analysis: row.get(6)?,
        last_scraped_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Offers =====

    fn insert_offer_if_new(
        &mut self,
        user_id: Option<&str>,
        offer: &NormalizedOffer,
    ) -> StorageResult<bool> {
        let tags = serde_json::to_string(&offer.tags)?;
        let scraped_at = offer.scraped_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO job_offers
             (user_id, job_title, company_name, location, description, source_url,
              source_platform, job_type, work_mode, tags, scraped_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user_id,
                offer.job_title,
                offer.company_name,
                offer.location,
                offer.description,
                offer.source_url,
                offer.source_platform,
                offer.job_type,
                offer.work_mode,
                tags,
                scraped_at,
                now_timestamp(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_offer_by_url(&self, url: &str) -> StorageResult<Option<OfferRecord>> {
        let sql = format!("SELECT {} FROM job_offers WHERE source_url = ?1", OFFER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![url], offer_from_row).optional()?)
    }

    fn count_offers(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM job_offers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== User source preferences =====

    fn get_prefs(&self, user_id: &str) -> StorageResult<Option<PrefsRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, enabled_sources, priority_sources, use_cache, cache_ttl_hours,
             background_scraping_enabled, created_at, updated_at
             FROM user_source_prefs WHERE user_id = ?1",
        )?;

        let prefs = stmt
            .query_row(params![user_id], |row| {
                Ok(PrefsRecord {
                    user_id: row.get(0)?,
                    enabled_sources: json_vec(row.get(1)?, 1)?,
                    priority_sources: json_vec(row.get(2)?, 2)?,
                    use_cache: row.get(3)?,
                    cache_ttl_hours: row.get(4)?,
                    background_scraping_enabled: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })
            .optional()?;

        Ok(prefs)
    }

    fn save_prefs(&mut self, record: &PrefsRecord) -> StorageResult<()> {
        let enabled = serde_json::to_string(&record.enabled_sources)?;
        let priority = serde_json::to_string(&record.priority_sources)?;
        self.conn.execute(
            "INSERT INTO user_source_prefs
             (user_id, enabled_sources, priority_sources, use_cache, cache_ttl_hours,
              background_scraping_enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
               enabled_sources = excluded.enabled_sources,
               priority_sources = excluded.priority_sources,
               use_cache = excluded.use_cache,
               cache_ttl_hours = excluded.cache_ttl_hours,
               background_scraping_enabled = excluded.background_scraping_enabled,
               updated_at = excluded.updated_at",
            params![
                record.user_id,
                enabled,
                priority,
                record.use_cache,
                record.cache_ttl_hours,
                record.background_scraping_enabled,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    // ===== Result cache =====

    fn cache_read_valid(
        &mut self,
        key: &str,
        now: &str,
    ) -> StorageResult<Option<CacheEntryRecord>> {
        // The validity check and the hit count share one statement, so a
        // honored read always counts exactly once.
        let updated = self.conn.execute(
            "UPDATE cache_entries SET hit_count = hit_count + 1
             WHERE cache_key = ?1 AND is_valid = 1 AND expires_at > ?2",
            params![key, now],
        )?;

        if updated == 0 {
            return Ok(None);
        }

        self.get_cache_entry(key)
    }

    fn get_cache_entry(&self, key: &str) -> StorageResult<Option<CacheEntryRecord>> {
        let sql = format!(
            "SELECT {} FROM cache_entries WHERE cache_key = ?1",
            CACHE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![key], cache_entry_from_row).optional()?)
    }

    fn cache_write(&mut self, entry: &CacheEntryRecord) -> StorageResult<()> {
        let sources = serde_json::to_string(&entry.sources_used)?;
        self.conn.execute(
            "INSERT INTO cache_entries
             (cache_key, user_id, keywords, location, job_type, work_mode, company,
              sources_used, results, results_count, scraped_count, deduplicated_count,
              created_at, expires_at, hit_count, is_valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, 1)
             ON CONFLICT(cache_key) DO UPDATE SET
               sources_used = excluded.sources_used,
               results = excluded.results,
               results_count = excluded.results_count,
               scraped_count = excluded.scraped_count,
               deduplicated_count = excluded.deduplicated_count,
               created_at = excluded.created_at,
               expires_at = excluded.expires_at,
               hit_count = 0,
               is_valid = 1",
            params![
                entry.cache_key,
                entry.user_id,
                entry.keywords,
                entry.location,
                entry.job_type,
                entry.work_mode,
                entry.company,
                sources,
                entry.results,
                entry.results_count,
                entry.scraped_count,
                entry.deduplicated_count,
                entry.created_at,
                entry.expires_at,
            ],
        )?;
        Ok(())
    }

    fn cache_invalidate_user(&mut self, user_id: &str) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM cache_entries WHERE user_id = ?1",
            params![user_id],
        )?)
    }

    fn cache_invalidate_key(&mut self, key: &str) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM cache_entries WHERE cache_key = ?1",
            params![key],
        )?)
    }

    fn cache_sweep(&mut self, now: &str) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM cache_entries WHERE expires_at < ?1",
            params![now],
        )?)
    }

    fn count_cache_entries(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Watched entities =====

    fn get_entity_by_slug(&self, slug: &str) -> StorageResult<Option<WatchedEntityRecord>> {
        let sql = format!(
            "SELECT {} FROM watched_entities WHERE slug = ?1",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![slug], entity_from_row).optional()?)
    }

    fn get_entity(&self, entity_id: i64) -> StorageResult<WatchedEntityRecord> {
        let sql = format!(
            "SELECT {} FROM watched_entities WHERE id = ?1",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        stmt.query_row(params![entity_id], entity_from_row)
            .optional()?
            .ok_or(StorageError::EntityNotFound(entity_id))
    }

    fn insert_entity(
        &mut self,
        canonical_name: &str,
        slug: &str,
        scraping_frequency_hours: i64,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO watched_entities
             (canonical_name, slug, watcher_count, scraping_frequency_hours,
              total_offers_found, created_at)
             VALUES (?1, ?2, 0, ?3, 0, ?4)",
            params![canonical_name, slug, scraping_frequency_hours, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn increment_watchers(&mut self, entity_id: i64) -> StorageResult<i64> {
        let updated = self.conn.execute(
            "UPDATE watched_entities SET watcher_count = watcher_count + 1 WHERE id = ?1",
            params![entity_id],
        )?;
        if updated == 0 {
            return Err(StorageError::EntityNotFound(entity_id));
        }
        Ok(self.conn.query_row(
            "SELECT watcher_count FROM watched_entities WHERE id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?)
    }

    fn decrement_watchers(&mut self, entity_id: i64) -> StorageResult<i64> {
        let updated = self.conn.execute(
            "UPDATE watched_entities SET watcher_count = MAX(watcher_count - 1, 0) WHERE id = ?1",
            params![entity_id],
        )?;
        if updated == 0 {
            return Err(StorageError::EntityNotFound(entity_id));
        }
        Ok(self.conn.query_row(
            "SELECT watcher_count FROM watched_entities WHERE id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?)
    }

    fn delete_entity(&mut self, entity_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM watched_entities WHERE id = ?1",
            params![entity_id],
        )?;
        Ok(())
    }

    fn list_watched_entities(&self) -> StorageResult<Vec<WatchedEntityRecord>> {
        let sql = format!(
            "SELECT {} FROM watched_entities WHERE watcher_count > 0 ORDER BY id",
            ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map([], entity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    fn record_entity_scrape(
        &mut self,
        entity_id: i64,
        scraped_at: &str,
        saved_count: i64,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE watched_entities
             SET last_scraped_at = ?1, total_offers_found = total_offers_found + ?2
             WHERE id = ?3",
            params![scraped_at, saved_count, entity_id],
        )?;
        Ok(())
    }

    // ===== User watches =====

    fn get_user_watch(
        &self,
        user_id: &str,
        entity_id: i64,
    ) -> StorageResult<Option<UserWatchRecord>> {
        let sql = format!(
            "SELECT {} FROM user_watches WHERE user_id = ?1 AND watched_entity_id = ?2",
            WATCH_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt
            .query_row(params![user_id, entity_id], watch_from_row)
            .optional()?)
    }

    fn get_watch(&self, watch_id: i64) -> StorageResult<Option<UserWatchRecord>> {
        let sql = format!("SELECT {} FROM user_watches WHERE id = ?1", WATCH_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![watch_id], watch_from_row).optional()?)
    }

    fn insert_watch(
        &mut self,
        user_id: &str,
        entity_id: i64,
        alert_threshold: i64,
        profile_id: Option<&str>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO user_watches
             (user_id, watched_entity_id, alert_threshold, profile_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, entity_id, alert_threshold, profile_id, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete_watch(&mut self, watch_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM user_watches WHERE id = ?1", params![watch_id])?;
        Ok(())
    }

    fn first_watcher(&self, entity_id: i64) -> StorageResult<Option<UserWatchRecord>> {
        let sql = format!(
            "SELECT {} FROM user_watches WHERE watched_entity_id = ?1 ORDER BY id LIMIT 1",
            WATCH_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row(params![entity_id], watch_from_row).optional()?)
    }

    fn list_watches_for_user(&self, user_id: &str) -> StorageResult<Vec<UserWatchRecord>> {
        let sql = format!(
            "SELECT {} FROM user_watches WHERE user_id = ?1 ORDER BY id",
            WATCH_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let watches = stmt
            .query_map(params![user_id], watch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(watches)
    }

    // ===== Custom sources =====

    fn custom_source_exists(&self, user_id: &str, url: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM custom_sources WHERE user_id = ?1 AND url = ?2",
            params![user_id, url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert_custom_source(
        &mut self,
        user_id: &str,
        name: &str,
        url: &str,
        source_type: &str,
        is_active: bool,
        last_analysis: Option<&str>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO custom_sources
             (user_id, name, url, source_type, is_active, last_analysis, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![user_id, name, url, source_type, is_active, last_analysis, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_custom_sources(
        &self,
        user_id: &str,
        active_only: bool,
    ) -> StorageResult<Vec<CustomSourceRecord>> {
        let sql = if active_only {
            format!(
                "SELECT {} FROM custom_sources WHERE user_id = ?1 AND is_active = 1 ORDER BY id",
                CUSTOM_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM custom_sources WHERE user_id = ?1 ORDER BY id",
                CUSTOM_COLUMNS
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let sources = stmt
            .query_map(params![user_id], custom_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    fn set_custom_source_active(
        &mut self,
        user_id: &str,
        source_id: i64,
        active: bool,
    ) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE custom_sources SET is_active = ?1 WHERE id = ?2 AND user_id = ?3",
            params![active, source_id, user_id],
        )?;
        Ok(updated > 0)
    }

    fn delete_custom_source(&mut self, user_id: &str, source_id: i64) -> StorageResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM custom_sources WHERE id = ?1 AND user_id = ?2",
            params![source_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    // ===== Background scrape queue =====

    fn enqueue_pending_scrape(
        &mut self,
        user_id: &str,
        params_json: &str,
        source_ids: &[String],
    ) -> StorageResult<i64> {
        let sources = serde_json::to_string(source_ids)?;
        self.conn.execute(
            "INSERT INTO pending_scrapes (user_id, params, source_ids, queued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, params_json, sources, now_timestamp()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn drain_pending_scrapes(&mut self, limit: usize) -> StorageResult<Vec<PendingScrapeRecord>> {
        let jobs = {
            let mut stmt = self.conn.prepare(
                "SELECT id, user_id, params, source_ids, queued_at
                 FROM pending_scrapes ORDER BY id LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(PendingScrapeRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        params: row.get(2)?,
                        source_ids: json_vec(row.get(3)?, 3)?,
                        queued_at: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for job in &jobs {
            self.conn
                .execute("DELETE FROM pending_scrapes WHERE id = ?1", params![job.id])?;
        }

        Ok(jobs)
    }

    fn count_pending_scrapes(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM pending_scrapes", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
