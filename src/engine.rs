//! Search orchestration engine
//!
//! Coordinates one search request end to end: user preferences (created
//! lazily with system defaults), the cache check, the bounded concurrent
//! fan-out to priority sources, normalization, deduplication, caller
//! filters, persistence, and the cache write. Enabled sources outside the
//! priority set are queued for the periodic background batch instead of
//! being awaited in-request.

use crate::ai::{rank_by_profile, Embedder};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::normalize::{normalize_batch, NormalizedOffer};
use crate::source::{FetchOutcome, SourceFetch, SourceQuery, SourceRegistry};
use crate::storage::{now_timestamp, PrefsRecord, SqliteStorage, Storage};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Caller-facing search parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    pub keywords: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub work_mode: Option<String>,
    pub company: Option<String>,
    /// Free-text profile; when set and an embedder is available, results are
    /// ranked by compatibility instead of recency
    pub profile_text: Option<String>,
}

/// What one source contributed to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source_id: String,
    pub outcome: FetchOutcome,
}

/// The complete result of one search request
#[derive(Debug)]
pub struct SearchOutcome {
    pub offers: Vec<NormalizedOffer>,
    /// Raw offers before deduplication
    pub scraped_count: usize,
    /// Offers surviving deduplication (before caller filters)
    pub deduplicated_count: usize,
    /// Offers newly persisted (not already known by URL)
    pub saved_count: usize,
    pub sources_used: Vec<String>,
    pub source_reports: Vec<SourceReport>,
    pub cached: bool,
    pub duration_seconds: f64,
    pub message: Option<String>,
}

/// Result of draining the background scrape queue
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub jobs_processed: usize,
    pub offers_found: usize,
    pub offers_saved: usize,
    pub errors: Vec<String>,
}

pub struct SearchEngine {
    config: Arc<Config>,
    registry: Arc<SourceRegistry>,
    storage: Arc<Mutex<SqliteStorage>>,
    cache: CacheStore,
    /// Bounds concurrently running source fetches across all requests
    fetch_semaphore: Arc<Semaphore>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SearchEngine {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SourceRegistry>,
        storage: Arc<Mutex<SqliteStorage>>,
    ) -> Self {
        let cache = CacheStore::new(storage.clone());
        let fetch_semaphore = Arc::new(Semaphore::new(
            config.engine.max_concurrent_fetches as usize,
        ));
        Self {
            config,
            registry,
            storage,
            cache,
            fetch_semaphore,
            embedder: None,
        }
    }

    /// Attaches the external embedding capability used for profile ranking
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Runs one search request
    pub async fn search(&self, params: &SearchParams, user_id: &str) -> Result<SearchOutcome> {
        let started = Instant::now();
        tracing::info!(user = user_id, keywords = %params.keywords, "search started");

        let prefs = self.get_or_create_prefs(user_id)?;

        // No enabled sources is a successful empty response, not an error
        if prefs.enabled_sources.is_empty() {
            tracing::info!(user = user_id, "no sources enabled, returning empty result");
            return Ok(SearchOutcome {
                offers: Vec::new(),
                scraped_count: 0,
                deduplicated_count: 0,
                saved_count: 0,
                sources_used: Vec::new(),
                source_reports: Vec::new(),
                cached: false,
                duration_seconds: elapsed_seconds(started),
                message: Some(
                    "No source is enabled. Enable at least one source in your settings."
                        .to_string(),
                ),
            });
        }

        // Stale preference entries (sources removed from the catalog) are
        // skipped with a warning
        let enabled: Vec<String> = prefs
            .enabled_sources
            .iter()
            .filter(|id| {
                let known = self.registry.get(id).is_some();
                if !known {
                    tracing::warn!(source = %id, "preference references unknown source");
                }
                known
            })
            .cloned()
            .collect();

        let cache_key = CacheStore::derive_key(
            user_id,
            &params.keywords,
            params.location.as_deref(),
            params.job_type.as_deref(),
            params.work_mode.as_deref(),
            params.company.as_deref(),
            &enabled,
        );

        if prefs.use_cache {
            if let Some(hit) = self.cache.read(&cache_key)? {
                tracing::info!(user = user_id, hits = hit.hit_count, "served from cache");
                return Ok(SearchOutcome {
                    scraped_count: hit.scraped_count as usize,
                    deduplicated_count: hit.deduplicated_count as usize,
                    saved_count: 0,
                    sources_used: hit.sources_used,
                    source_reports: Vec::new(),
                    offers: hit.offers,
                    cached: true,
                    duration_seconds: elapsed_seconds(started),
                    message: None,
                });
            }
        }

        // Split the enabled set: priority sources run in-request, the rest
        // go to the background batch. Scraping is slow; awaiting every
        // enabled source inline would make latency unbounded.
        let mut priority: Vec<String> = prefs
            .priority_sources
            .iter()
            .filter(|id| enabled.contains(id))
            .take(self.config.engine.max_priority_sources)
            .cloned()
            .collect();
        if priority.is_empty() {
            // A user with enabled sources but no usable priority list still
            // gets an in-request fetch from the top of the enabled set
            priority = enabled
                .iter()
                .take(self.config.engine.max_priority_sources)
                .cloned()
                .collect();
        }

        let deferred: Vec<String> = enabled
            .iter()
            .filter(|id| !priority.contains(id))
            .cloned()
            .collect();

        let mut reports: Vec<SourceReport> = Vec::new();

        if !deferred.is_empty() && prefs.background_scraping_enabled {
            let params_json = serde_json::to_string(params)?;
            {
                let mut storage = self.storage.lock().unwrap();
                storage.enqueue_pending_scrape(user_id, &params_json, &deferred)?;
            }
            tracing::debug!(count = deferred.len(), "sources deferred to background batch");
            for id in &deferred {
                reports.push(SourceReport {
                    source_id: id.clone(),
                    outcome: FetchOutcome::Deferred,
                });
            }
        }

        // Fan out to the priority sources
        let query = to_query(params);
        let fetches = self.fan_out(&priority, &query).await;

        let mut raw = Vec::new();
        for (source_id, fetch) in fetches {
            let outcome = match &fetch.failure {
                Some(reason) => FetchOutcome::Failed {
                    reason: reason.clone(),
                },
                None => FetchOutcome::Fetched {
                    count: fetch.offers.len(),
                },
            };
            reports.push(SourceReport { source_id, outcome });
            raw.extend(fetch.offers);
        }

        let normalized = normalize_batch(raw);
        let scraped_count = normalized.len();

        let deduplicated =
            Deduplicator::new(self.config.engine.dedup_similarity_threshold).dedup(normalized);
        let deduplicated_count = deduplicated.len();

        // Caller filters run after dedup so filtering never hides how many
        // raw duplicates existed
        let mut offers = apply_filters(deduplicated, params);

        let saved_count = self.persist_offers(user_id, &offers);

        self.order_offers(&mut offers, params).await;

        tracing::info!(
            user = user_id,
            scraped = scraped_count,
            deduplicated = deduplicated_count,
            filtered = offers.len(),
            saved = saved_count,
            "search scrape complete"
        );

        if prefs.use_cache {
            // A failed cache write costs future latency, not this response
            if let Err(e) = self.cache.write(
                &cache_key,
                user_id,
                &params.keywords,
                params.location.as_deref(),
                params.job_type.as_deref(),
                params.work_mode.as_deref(),
                params.company.as_deref(),
                &enabled,
                &offers,
                scraped_count as i64,
                deduplicated_count as i64,
                prefs.cache_ttl_hours,
            ) {
                tracing::error!("cache write failed: {}", e);
            }
        }

        Ok(SearchOutcome {
            offers,
            scraped_count,
            deduplicated_count,
            saved_count,
            sources_used: enabled,
            source_reports: reports,
            cached: false,
            duration_seconds: elapsed_seconds(started),
            message: None,
        })
    }

    /// Drains the background scrape queue
    ///
    /// Each queued job fans out to its deferred sources and persists new
    /// offers for the requesting user. Invoked by a scheduler, never from
    /// the request path, and it bypasses the per-request cache entirely.
    pub async fn run_background_batch(&self) -> Result<BatchOutcome> {
        let jobs = {
            let mut storage = self.storage.lock().unwrap();
            storage.drain_pending_scrapes(50)?
        };

        tracing::info!(count = jobs.len(), "background batch started");
        let mut outcome = BatchOutcome::default();

        for job in jobs {
            let params: SearchParams = match serde_json::from_str(&job.params) {
                Ok(p) => p,
                Err(e) => {
                    outcome
                        .errors
                        .push(format!("job {}: unreadable params: {}", job.id, e));
                    continue;
                }
            };

            let query = to_query(&params);
            let fetches = self.fan_out(&job.source_ids, &query).await;

            let mut raw = Vec::new();
            for (source_id, fetch) in fetches {
                if let Some(reason) = fetch.failure {
                    outcome.errors.push(format!("{}: {}", source_id, reason));
                }
                raw.extend(fetch.offers);
            }

            let offers = Deduplicator::new(self.config.engine.dedup_similarity_threshold)
                .dedup(normalize_batch(raw));
            outcome.offers_found += offers.len();
            outcome.offers_saved += self.persist_offers(&job.user_id, &offers);
            outcome.jobs_processed += 1;
        }

        tracing::info!(
            jobs = outcome.jobs_processed,
            found = outcome.offers_found,
            saved = outcome.offers_saved,
            errors = outcome.errors.len(),
            "background batch complete"
        );

        Ok(outcome)
    }

    /// Loads a user's preferences, creating system defaults on first use
    ///
    /// Defaults: every source enabled by default in the catalog, the top
    /// sources by priority as the in-request set, cache settings from the
    /// config.
    fn get_or_create_prefs(&self, user_id: &str) -> Result<PrefsRecord> {
        {
            let storage = self.storage.lock().unwrap();
            if let Some(prefs) = storage.get_prefs(user_id)? {
                return Ok(prefs);
            }
        }

        let now = now_timestamp();
        let prefs = PrefsRecord {
            user_id: user_id.to_string(),
            enabled_sources: self.registry.default_enabled_ids(),
            priority_sources: self
                .registry
                .default_priority_ids(self.config.engine.max_priority_sources),
            use_cache: self.config.cache.enabled_by_default,
            cache_ttl_hours: self.config.cache.default_ttl_hours,
            background_scraping_enabled: self.config.watch.background_scraping_enabled,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut storage = self.storage.lock().unwrap();
        storage.save_prefs(&prefs)?;
        tracing::info!(user = user_id, "default source preferences created");
        Ok(prefs)
    }

    /// Invokes the selected adapters concurrently under the fetch semaphore
    ///
    /// Sources keep failing independently: one adapter's failure never
    /// aborts the others. With an overall deadline configured, fetches still
    /// in flight past the budget are aborted and reported as failed.
    /// Completion order is not deterministic.
    async fn fan_out(
        &self,
        source_ids: &[String],
        query: &SourceQuery,
    ) -> Vec<(String, SourceFetch)> {
        let limit = self.config.engine.limit_per_source;
        let mut results: Vec<(String, SourceFetch)> = Vec::new();
        let mut pending: HashSet<String> = HashSet::new();
        let mut join: JoinSet<(String, SourceFetch)> = JoinSet::new();

        for id in source_ids {
            let Some(adapter) = self.registry.get(id) else {
                results.push((
                    id.clone(),
                    SourceFetch::partial(Vec::new(), "unknown source id"),
                ));
                continue;
            };

            pending.insert(id.clone());
            let semaphore = self.fetch_semaphore.clone();
            let query = query.clone();
            let id = id.clone();
            join.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (id, SourceFetch::partial(Vec::new(), "engine shut down"));
                    }
                };
                let fetch = adapter.fetch(&query, limit).await;
                (id, fetch)
            });
        }

        let deadline = self
            .config
            .engine
            .overall_deadline_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

        while !join.is_empty() {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::warn!(
                                remaining = pending.len(),
                                "overall deadline exceeded, aborting in-flight fetches"
                            );
                            join.abort_all();
                            break;
                        }
                    }
                }
                None => join.join_next().await,
            };

            match next {
                Some(Ok((id, fetch))) => {
                    pending.remove(&id);
                    results.push((id, fetch));
                }
                Some(Err(e)) => {
                    tracing::error!("source fetch task failed: {}", e);
                }
                None => break,
            }
        }

        // Anything still pending was aborted or panicked
        for id in pending {
            results.push((
                id,
                SourceFetch::partial(Vec::new(), "aborted: overall deadline exceeded"),
            ));
        }

        results
    }

    /// Persists offers idempotently by URL, logging instead of failing
    ///
    /// A persistence failure degrades durability, not availability: the
    /// in-memory result is still returned to the caller.
    fn persist_offers(&self, user_id: &str, offers: &[NormalizedOffer]) -> usize {
        let mut storage = self.storage.lock().unwrap();
        let mut saved = 0;
        for offer in offers {
            match storage.insert_offer_if_new(Some(user_id), offer) {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(url = %offer.source_url, "offer persistence failed: {}", e);
                }
            }
        }
        saved
    }

    /// Orders the final offers: compatibility score when requested and
    /// possible, recency otherwise
    async fn order_offers(&self, offers: &mut Vec<NormalizedOffer>, params: &SearchParams) {
        if let (Some(profile_text), Some(embedder)) = (&params.profile_text, &self.embedder) {
            match rank_by_profile(embedder.as_ref(), profile_text, offers).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!("profile ranking failed, falling back to recency: {}", e);
                }
            }
        }
        offers.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
    }
}

/// Maps the caller's parameters onto the adapter query
fn to_query(params: &SearchParams) -> SourceQuery {
    SourceQuery {
        keywords: if params.keywords.trim().is_empty() {
            None
        } else {
            Some(params.keywords.clone())
        },
        location: params.location.clone(),
        job_type: params.job_type.clone(),
        work_mode: params.work_mode.clone(),
        company: params.company.clone(),
    }
}

/// Applies the caller's filters to deduplicated offers
fn apply_filters(offers: Vec<NormalizedOffer>, params: &SearchParams) -> Vec<NormalizedOffer> {
    offers
        .into_iter()
        .filter(|offer| {
            if let Some(job_type) = &params.job_type {
                if !offer
                    .job_type
                    .as_deref()
                    .is_some_and(|jt| jt.eq_ignore_ascii_case(job_type))
                {
                    return false;
                }
            }
            if let Some(work_mode) = &params.work_mode {
                if !offer
                    .work_mode
                    .as_deref()
                    .is_some_and(|wm| wm.eq_ignore_ascii_case(work_mode))
                {
                    return false;
                }
            }
            if let Some(company) = &params.company {
                if !offer
                    .company_name
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&company.to_lowercase()))
                {
                    return false;
                }
            }
            true
        })
        .collect()
}

fn elapsed_seconds(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}
