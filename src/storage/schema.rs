//! Database schema definitions
//!
//! All SQL schema for the Offerflow database lives here.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Persisted job offers, idempotent by source URL
CREATE TABLE IF NOT EXISTS job_offers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT,
    job_title TEXT NOT NULL,
    company_name TEXT,
    location TEXT,
    description TEXT,
    source_url TEXT NOT NULL UNIQUE,
    source_platform TEXT NOT NULL,
    job_type TEXT,
    work_mode TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_offers_company ON job_offers(company_name);
CREATE INDEX IF NOT EXISTS idx_offers_scraped_at ON job_offers(scraped_at);

-- Per-user source preferences, created lazily on first search
CREATE TABLE IF NOT EXISTS user_source_prefs (
    user_id TEXT PRIMARY KEY,
    enabled_sources TEXT NOT NULL,
    priority_sources TEXT NOT NULL,
    use_cache INTEGER NOT NULL DEFAULT 1,
    cache_ttl_hours INTEGER NOT NULL DEFAULT 24,
    background_scraping_enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Search result cache
CREATE TABLE IF NOT EXISTS cache_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_key TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    keywords TEXT NOT NULL,
    location TEXT,
    job_type TEXT,
    work_mode TEXT,
    company TEXT,
    sources_used TEXT NOT NULL,
    results TEXT NOT NULL,
    results_count INTEGER NOT NULL DEFAULT 0,
    scraped_count INTEGER NOT NULL DEFAULT 0,
    deduplicated_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    is_valid INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_cache_user ON cache_entries(user_id);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);

-- Companies watched by at least one user (deleted at zero watchers)
CREATE TABLE IF NOT EXISTS watched_entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    watcher_count INTEGER NOT NULL DEFAULT 0,
    last_scraped_at TEXT,
    scraping_frequency_hours INTEGER NOT NULL DEFAULT 24,
    total_offers_found INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- One user's watch on an entity
CREATE TABLE IF NOT EXISTS user_watches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    watched_entity_id INTEGER NOT NULL REFERENCES watched_entities(id) ON DELETE CASCADE,
    alert_threshold INTEGER NOT NULL DEFAULT 70,
    profile_id TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, watched_entity_id)
);

CREATE INDEX IF NOT EXISTS idx_watches_user ON user_watches(user_id);
CREATE INDEX IF NOT EXISTS idx_watches_entity ON user_watches(watched_entity_id);

-- User-submitted custom sources, probe-gated at creation
CREATE TABLE IF NOT EXISTS custom_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    source_type TEXT NOT NULL DEFAULT 'html',
    is_active INTEGER NOT NULL DEFAULT 0,
    last_analysis TEXT,
    last_scraped_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, url)
);

-- Deferred background scrape jobs (non-priority enabled sources)
CREATE TABLE IF NOT EXISTS pending_scrapes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    params TEXT NOT NULL,
    source_ids TEXT NOT NULL,
    queued_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "job_offers",
            "user_source_prefs",
            "cache_entries",
            "watched_entities",
            "user_watches",
            "custom_sources",
            "pending_scrapes",
        ];

        for table in tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
