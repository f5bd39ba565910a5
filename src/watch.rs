//! Company watch mutualization
//!
//! Many users can watch the same company; the entity is keyed by a derived
//! slug and reference-counted, so one periodic scrape serves every watcher.
//! An entity exists exactly as long as its watcher count is positive.

use crate::config::Config;
use crate::normalize::normalize_batch;
use crate::source::{SourceQuery, SourceRegistry};
use crate::storage::{now_timestamp, SqliteStorage, Storage, UserWatchRecord, WatchedEntityRecord};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Options for a new watch
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub alert_threshold: i64,
    pub profile_id: Option<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            alert_threshold: 70,
            profile_id: None,
        }
    }
}

/// Result of an add-watch call
#[derive(Debug)]
pub struct AddWatchOutcome {
    pub watch_id: i64,
    pub entity_id: i64,
    pub slug: String,
    pub watcher_count: i64,
    /// True when the user already had a watch; counters were left untouched
    pub already_watching: bool,
}

/// Result of a remove-watch call
#[derive(Debug)]
pub struct RemoveWatchOutcome {
    pub success: bool,
    pub message: String,
}

/// One entity's failure during the periodic scrape
#[derive(Debug)]
pub struct WatchScrapeError {
    pub entity: String,
    pub reason: String,
}

/// Result of one periodic watch-scrape run
#[derive(Debug, Default)]
pub struct WatchScrapeOutcome {
    pub entities_scraped: usize,
    pub offers_found: usize,
    pub offers_saved: usize,
    pub errors: Vec<WatchScrapeError>,
}

pub struct WatchService {
    config: Arc<Config>,
    registry: Arc<SourceRegistry>,
    storage: Arc<Mutex<SqliteStorage>>,
}

impl WatchService {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SourceRegistry>,
        storage: Arc<Mutex<SqliteStorage>>,
    ) -> Self {
        Self {
            config,
            registry,
            storage,
        }
    }

    /// Adds a watch for a user, mutualizing the entity across watchers
    ///
    /// Repeat calls by the same user are idempotent: they report the existing
    /// watch and do not touch the counter.
    pub fn add_watch(
        &self,
        user_id: &str,
        company_name: &str,
        opts: WatchOptions,
    ) -> Result<AddWatchOutcome> {
        let slug = slugify(company_name);
        let mut storage = self.storage.lock().unwrap();

        let entity = match storage.get_entity_by_slug(&slug)? {
            Some(entity) => entity,
            None => {
                let id = storage.insert_entity(
                    company_name,
                    &slug,
                    self.config.watch.scraping_frequency_hours,
                )?;
                tracing::info!(company = company_name, slug = %slug, "watched entity created");
                storage.get_entity(id)?
            }
        };

        if let Some(existing) = storage.get_user_watch(user_id, entity.id)? {
            return Ok(AddWatchOutcome {
                watch_id: existing.id,
                entity_id: entity.id,
                slug,
                watcher_count: entity.watcher_count,
                already_watching: true,
            });
        }

        let watch_id = storage.insert_watch(
            user_id,
            entity.id,
            opts.alert_threshold,
            opts.profile_id.as_deref(),
        )?;
        let watcher_count = storage.increment_watchers(entity.id)?;

        tracing::info!(
            user = user_id,
            company = company_name,
            watchers = watcher_count,
            "watch added"
        );

        Ok(AddWatchOutcome {
            watch_id,
            entity_id: entity.id,
            slug,
            watcher_count,
            already_watching: false,
        })
    }

    /// Removes a user's watch; deletes the entity when nobody watches it
    /// anymore
    pub fn remove_watch(&self, user_id: &str, watch_id: i64) -> Result<RemoveWatchOutcome> {
        let mut storage = self.storage.lock().unwrap();

        let Some(watch) = storage.get_watch(watch_id)? else {
            return Ok(RemoveWatchOutcome {
                success: false,
                message: "watch not found".to_string(),
            });
        };

        if watch.user_id != user_id {
            return Ok(RemoveWatchOutcome {
                success: false,
                message: "watch does not belong to this user".to_string(),
            });
        }

        storage.delete_watch(watch_id)?;
        let remaining = storage.decrement_watchers(watch.watched_entity_id)?;

        if remaining == 0 {
            storage.delete_entity(watch.watched_entity_id)?;
            tracing::info!(entity = watch.watched_entity_id, "last watcher left, entity removed");
        }

        Ok(RemoveWatchOutcome {
            success: true,
            message: "watch removed".to_string(),
        })
    }

    /// Lists a user's watches together with the watched entities
    pub fn list_watches(
        &self,
        user_id: &str,
    ) -> Result<Vec<(UserWatchRecord, WatchedEntityRecord)>> {
        let storage = self.storage.lock().unwrap();
        let mut result = Vec::new();
        for watch in storage.list_watches_for_user(user_id)? {
            let entity = storage.get_entity(watch.watched_entity_id)?;
            result.push((watch, entity));
        }
        Ok(result)
    }

    /// Scrapes every watched entity that is due
    ///
    /// An entity is due when it has watchers and was last scraped more than
    /// its scraping frequency ago (or never). Per-entity failures are
    /// collected and never abort the batch.
    pub async fn scrape_due(&self) -> Result<WatchScrapeOutcome> {
        let entities = {
            let storage = self.storage.lock().unwrap();
            storage.list_watched_entities()?
        };

        let now = Utc::now();
        let due: Vec<WatchedEntityRecord> = entities
            .into_iter()
            .filter(|entity| is_due(entity, now))
            .collect();

        tracing::info!(count = due.len(), "watched entities due for scraping");

        let mut outcome = WatchScrapeOutcome::default();

        for entity in due {
            match self.scrape_entity(&entity).await {
                Ok((found, saved)) => {
                    outcome.entities_scraped += 1;
                    outcome.offers_found += found;
                    outcome.offers_saved += saved;
                    tracing::info!(
                        company = %entity.canonical_name,
                        found,
                        saved,
                        "watched entity scraped"
                    );
                }
                Err(e) => {
                    tracing::error!(company = %entity.canonical_name, "watch scrape failed: {}", e);
                    outcome.errors.push(WatchScrapeError {
                        entity: entity.canonical_name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Runs the multi-strategy fetch for one entity and persists new offers
    ///
    /// Returns (offers found, offers newly saved). The scrape stamp and the
    /// running total update even when nothing new was found.
    async fn scrape_entity(&self, entity: &WatchedEntityRecord) -> Result<(usize, usize)> {
        let limit = self.config.engine.limit_per_source;
        let (primary, secondary) = self.registry.watch_strategies();

        let mut raw = Vec::new();

        // Strategy 1: highest-priority source, filtered by the exact company
        // name
        if let Some(adapter) = primary {
            let query = SourceQuery::for_company(&entity.canonical_name);
            let fetch = adapter.fetch(&query, limit).await;
            if let Some(reason) = fetch.failure {
                tracing::warn!(
                    source = %adapter.spec().id,
                    company = %entity.canonical_name,
                    "primary watch fetch failed: {}",
                    reason
                );
            }
            raw.extend(fetch.offers);
        }

        // Strategy 2: broad keyword search on the secondary source; company
        // naming varies across sources, so results only count when the
        // offer's company fuzzy-matches the watched name
        if let Some(adapter) = secondary {
            let query = SourceQuery {
                keywords: Some(entity.canonical_name.clone()),
                ..Default::default()
            };
            let fetch = adapter.fetch(&query, limit).await;
            if let Some(reason) = fetch.failure {
                tracing::warn!(
                    source = %adapter.spec().id,
                    company = %entity.canonical_name,
                    "secondary watch fetch failed: {}",
                    reason
                );
            }

            let threshold = self.config.engine.company_match_threshold;
            let matched = fetch.offers.into_iter().filter(|offer| {
                offer
                    .company
                    .as_deref()
                    .map(|company| company_name_matches(&entity.canonical_name, company, threshold))
                    .unwrap_or(false)
            });
            raw.extend(matched);
        }

        let offers = normalize_batch(raw);
        let found = offers.len();

        let mut storage = self.storage.lock().unwrap();

        // New offers are owned by one arbitrary existing watcher
        let owner = storage.first_watcher(entity.id)?.map(|w| w.user_id);

        let mut saved = 0;
        for offer in &offers {
            if storage.insert_offer_if_new(owner.as_deref(), offer)? {
                saved += 1;
            }
        }

        storage.record_entity_scrape(entity.id, &now_timestamp(), saved as i64)?;

        Ok((found, saved))
    }
}

/// Checks whether an entity is due for scraping at `now`
fn is_due(entity: &WatchedEntityRecord, now: DateTime<Utc>) -> bool {
    let Some(last) = &entity.last_scraped_at else {
        return true;
    };

    match DateTime::parse_from_rfc3339(last) {
        Ok(last) => {
            let next = last.with_timezone(&Utc) + Duration::hours(entity.scraping_frequency_hours);
            now >= next
        }
        // An unreadable stamp should not park the entity forever
        Err(_) => true,
    }
}

/// Derives the unique entity slug from a company name
///
/// Built on the same normalization the matcher uses (lowercase, accents
/// folded, legal suffixes stripped), with the remaining words joined by `-`.
/// "Google" and "Google Inc." therefore share one entity.
pub fn slugify(name: &str) -> String {
    normalize_company_name(name).replace(' ', "-")
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' | 'í' | 'ì' => 'i',
        'ô' | 'ö' | 'ó' | 'ò' => 'o',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Normalizes a company name for matching and slug derivation: lowercase,
/// accents folded, common legal suffixes stripped, punctuation removed,
/// whitespace collapsed
fn normalize_company_name(name: &str) -> String {
    let mut normalized: String = name.trim().to_lowercase().chars().map(fold_accent).collect();

    const SUFFIXES: &[&str] = &[
        "incorporated",
        "corporation",
        "limited",
        "company",
        "group",
        "inc.",
        "inc",
        "llc",
        "ltd.",
        "ltd",
        "corp.",
        "corp",
        "gmbh",
        "sasu",
        "sarl",
        "sas",
        "sa",
        "ag",
        "bv",
        "nv",
    ];

    loop {
        let before = normalized.clone();
        for suffix in SUFFIXES {
            if let Some(stripped) = normalized.strip_suffix(suffix) {
                // Only strip whole trailing words
                if stripped.is_empty() || stripped.ends_with(' ') {
                    normalized = stripped.trim_end().to_string();
                }
            }
        }
        if normalized == before {
            break;
        }
    }

    let cleaned: String = normalized
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fuzzy company-name match used by the broad-search watch strategy
///
/// Exact match after normalization, containment either way, or a normalized
/// edit-distance ratio at or above `threshold`.
pub fn company_name_matches(watched: &str, candidate: &str, threshold: f64) -> bool {
    let watched = normalize_company_name(watched);
    let candidate = normalize_company_name(candidate);

    if watched.is_empty() || candidate.is_empty() {
        return false;
    }

    if watched == candidate {
        return true;
    }

    if watched.contains(&candidate) || candidate.contains(&watched) {
        return true;
    }

    strsim::normalized_levenshtein(&watched, &candidate) >= threshold
}
