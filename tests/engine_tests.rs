//! Integration tests for the aggregation engine
//!
//! These tests use wiremock to stand in for external sources and exercise
//! the full search cycle: fan-out, normalization, deduplication, caching,
//! persistence, the background batch, and the watch scraper.

use offerflow::config::{
    AdapterKind, CacheConfig, ClientConfig, Config, EngineConfig, SourceSpec, StorageConfig,
    WatchConfig,
};
use offerflow::engine::{SearchEngine, SearchParams};
use offerflow::source::{build_http_client, FetchOutcome, SourceRegistry};
use offerflow::storage::{SqliteStorage, Storage};
use offerflow::watch::{WatchOptions, WatchService};
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a config whose sources point at the mock server
fn test_config(server_uri: &str, source_paths: &[(&str, &str)]) -> Config {
    let sources = source_paths
        .iter()
        .enumerate()
        .map(|(i, (id, feed_path))| SourceSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: AdapterKind::JsonFeed,
            endpoint: format!("{}{}", server_uri, feed_path),
            priority: (i + 1) as u32,
            enabled_by_default: true,
            max_pages: 1,
            page_delay_ms: 0,
            selectors: None,
        })
        .collect();

    Config {
        engine: EngineConfig {
            max_concurrent_fetches: 4,
            source_timeout_secs: 5,
            overall_deadline_secs: None,
            limit_per_source: 50,
            dedup_similarity_threshold: 0.9,
            company_match_threshold: 0.75,
            max_priority_sources: 2,
        },
        cache: CacheConfig {
            enabled_by_default: true,
            default_ttl_hours: 1,
        },
        watch: WatchConfig {
            scraping_frequency_hours: 24,
            background_scraping_enabled: true,
        },
        client: ClientConfig {
            agent_name: "TestAgent".to_string(),
            agent_version: "1.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
        },
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
        },
        sources,
    }
}

struct Harness {
    engine: SearchEngine,
    watch: WatchService,
    storage: Arc<Mutex<SqliteStorage>>,
}

fn build_harness(config: Config) -> Harness {
    let config = Arc::new(config);
    let client = build_http_client(&config.client, config.engine.source_timeout_secs).unwrap();
    let registry = Arc::new(SourceRegistry::from_config(&config, client).unwrap());
    let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));

    Harness {
        engine: SearchEngine::new(config.clone(), registry.clone(), storage.clone()),
        watch: WatchService::new(config, registry, storage.clone()),
        storage,
    }
}

fn feed_entry(title: &str, company: &str, url: &str) -> serde_json::Value {
    json!({
        "position": title,
        "company": company,
        "location": "Remote",
        "description": format!("{} at {}", title, company),
        "url": url,
        "tags": [],
        "work_mode": "remote"
    })
}

async fn mount_feed(server: &MockServer, feed_path: &str, entries: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(feed_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(entries))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cross_source_dedup_counts() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Source A: 5 offers
    mount_feed(
        &server,
        "/feed-a",
        json!([
            feed_entry("Platform Engineer", "Acme", &format!("{}/jobs/1", base)),
            feed_entry("Senior Backend Engineer", "Acme Corporation", &format!("{}/jobs/2", base)),
            feed_entry("Data Platform Engineer", "Globex Industries", &format!("{}/jobs/3", base)),
            feed_entry("Frontend Engineer", "Initech", &format!("{}/jobs/4", base)),
            feed_entry("Mobile Engineer", "Umbrella", &format!("{}/jobs/5", base)),
        ]),
    )
    .await;

    // Source B: 5 offers; one shares a URL with A, two are fuzzy duplicates
    mount_feed(
        &server,
        "/feed-b",
        json!([
            feed_entry("Platform Engineer (Remote)", "Acme", &format!("{}/jobs/1", base)),
            feed_entry("Senior Backend Enginee", "Acme Corporation", &format!("{}/jobs/12", base)),
            feed_entry("Data Platform Enginee", "Globex Industries", &format!("{}/jobs/13", base)),
            feed_entry("Security Engineer", "Hooli", &format!("{}/jobs/14", base)),
            feed_entry("QA Engineer", "Pied Piper", &format!("{}/jobs/15", base)),
        ]),
    )
    .await;

    let harness = build_harness(test_config(&base, &[("feed-a", "/feed-a"), ("feed-b", "/feed-b")]));

    let params = SearchParams {
        keywords: "engineer".to_string(),
        ..Default::default()
    };
    let outcome = harness.engine.search(&params, "user-1").await.unwrap();

    // 10 scraped − 1 URL duplicate − 2 fuzzy duplicates = 7
    assert_eq!(outcome.scraped_count, 10);
    assert_eq!(outcome.deduplicated_count, 7);
    assert_eq!(outcome.offers.len(), 7);
    assert_eq!(outcome.saved_count, 7);
    assert!(!outcome.cached);
    assert_eq!(outcome.sources_used.len(), 2);

    // All sources fetched, nothing deferred
    for report in &outcome.source_reports {
        assert!(matches!(report.outcome, FetchOutcome::Fetched { count: 5 }));
    }

    // Offers were persisted idempotently
    let stored = harness.storage.lock().unwrap().count_offers().unwrap();
    assert_eq!(stored, 7);
}

#[tokio::test]
async fn test_second_search_is_served_from_cache() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_feed(
        &server,
        "/feed-a",
        json!([feed_entry("Rust Engineer", "Acme", &format!("{}/jobs/1", base))]),
    )
    .await;

    let harness = build_harness(test_config(&base, &[("feed-a", "/feed-a")]));
    let params = SearchParams {
        keywords: "rust".to_string(),
        ..Default::default()
    };

    let first = harness.engine.search(&params, "user-1").await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.offers.len(), 1);

    let second = harness.engine.search(&params, "user-1").await.unwrap();
    assert!(second.cached);
    assert_eq!(second.offers, first.offers);
    assert_eq!(second.scraped_count, first.scraped_count);
    assert_eq!(second.deduplicated_count, first.deduplicated_count);

    // Only the first search hit the source
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_failing_source_never_aborts_the_others() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_feed(
        &server,
        "/feed-a",
        json!([
            feed_entry("Rust Engineer", "Acme", &format!("{}/jobs/1", base)),
            feed_entry("Go Engineer", "Globex", &format!("{}/jobs/2", base)),
        ]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/feed-b"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let harness = build_harness(test_config(&base, &[("feed-a", "/feed-a"), ("feed-b", "/feed-b")]));
    let outcome = harness
        .engine
        .search(
            &SearchParams {
                keywords: "engineer".to_string(),
                ..Default::default()
            },
            "user-1",
        )
        .await
        .unwrap();

    assert_eq!(outcome.offers.len(), 2);

    let failed: Vec<_> = outcome
        .source_reports
        .iter()
        .filter(|r| matches!(r.outcome, FetchOutcome::Failed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_id, "feed-b");
}

#[tokio::test]
async fn test_non_priority_sources_are_deferred_to_batch() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_feed(
        &server,
        "/feed-a",
        json!([feed_entry("Rust Engineer", "Acme", &format!("{}/jobs/1", base))]),
    )
    .await;
    mount_feed(
        &server,
        "/feed-b",
        json!([feed_entry("Go Engineer", "Globex", &format!("{}/jobs/2", base))]),
    )
    .await;
    mount_feed(
        &server,
        "/feed-c",
        json!([feed_entry("C++ Engineer", "Initech", &format!("{}/jobs/3", base))]),
    )
    .await;

    // max_priority_sources = 2, so the third source defers
    let harness = build_harness(test_config(
        &base,
        &[("feed-a", "/feed-a"), ("feed-b", "/feed-b"), ("feed-c", "/feed-c")],
    ));

    let outcome = harness
        .engine
        .search(
            &SearchParams {
                keywords: "engineer".to_string(),
                ..Default::default()
            },
            "user-1",
        )
        .await
        .unwrap();

    assert_eq!(outcome.offers.len(), 2);
    let deferred: Vec<_> = outcome
        .source_reports
        .iter()
        .filter(|r| r.outcome == FetchOutcome::Deferred)
        .collect();
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].source_id, "feed-c");

    assert_eq!(
        harness.storage.lock().unwrap().count_pending_scrapes().unwrap(),
        1
    );

    // The periodic batch drains the queue and persists the deferred source's
    // offers
    let batch = harness.engine.run_background_batch().await.unwrap();
    assert_eq!(batch.jobs_processed, 1);
    assert_eq!(batch.offers_found, 1);
    assert_eq!(batch.offers_saved, 1);
    assert!(batch.errors.is_empty());

    assert_eq!(
        harness.storage.lock().unwrap().count_pending_scrapes().unwrap(),
        0
    );
    assert!(harness
        .storage
        .lock()
        .unwrap()
        .get_offer_by_url(&format!("{}/jobs/3", base))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_watch_reference_counting_across_name_variants() {
    let server = MockServer::start().await;
    let harness = build_harness(test_config(&server.uri(), &[("feed-a", "/feed-a")]));

    // Both names slug to the same entity
    let first = harness
        .watch
        .add_watch("user-1", "Google", WatchOptions::default())
        .unwrap();
    let second = harness
        .watch
        .add_watch("user-2", "Google Inc.", WatchOptions::default())
        .unwrap();

    assert_eq!(first.entity_id, second.entity_id);
    assert_eq!(second.watcher_count, 2);
    assert!(!second.already_watching);

    // Repeat add by the same user mutates nothing
    let repeat = harness
        .watch
        .add_watch("user-1", "Google", WatchOptions::default())
        .unwrap();
    assert!(repeat.already_watching);
    assert_eq!(repeat.watch_id, first.watch_id);

    // First removal keeps the entity alive
    let removed = harness.watch.remove_watch("user-1", first.watch_id).unwrap();
    assert!(removed.success);
    {
        let storage = harness.storage.lock().unwrap();
        let entity = storage.get_entity(first.entity_id).unwrap();
        assert_eq!(entity.watcher_count, 1);
    }

    // Last removal deletes the entity
    let removed = harness.watch.remove_watch("user-2", second.watch_id).unwrap();
    assert!(removed.success);
    {
        let storage = harness.storage.lock().unwrap();
        assert!(storage.get_entity_by_slug("google").unwrap().is_none());
    }
}

#[tokio::test]
async fn test_remove_watch_requires_ownership() {
    let server = MockServer::start().await;
    let harness = build_harness(test_config(&server.uri(), &[("feed-a", "/feed-a")]));

    let added = harness
        .watch
        .add_watch("user-1", "Acme", WatchOptions::default())
        .unwrap();

    let outcome = harness.watch.remove_watch("user-2", added.watch_id).unwrap();
    assert!(!outcome.success);

    let missing = harness.watch.remove_watch("user-1", 9999).unwrap();
    assert!(!missing.success);
}

#[tokio::test]
async fn test_watch_scrape_multi_strategy() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Primary strategy: company-filtered fetch against the first source
    mount_feed(
        &server,
        "/feed-a",
        json!([
            feed_entry("Platform Engineer", "Acme", &format!("{}/jobs/a1", base)),
            feed_entry("Unrelated Role", "Other Co", &format!("{}/jobs/a2", base)),
        ]),
    )
    .await;

    // Secondary strategy: broad search; company names vary, so only fuzzy
    // matches count
    mount_feed(
        &server,
        "/feed-b",
        json!([
            feed_entry("Backend Engineer", "Acme Inc.", &format!("{}/jobs/b1", base)),
            feed_entry("Acme-adjacent role", "Globex", &format!("{}/jobs/b2", base)),
        ]),
    )
    .await;

    let harness = build_harness(test_config(&base, &[("feed-a", "/feed-a"), ("feed-b", "/feed-b")]));

    harness
        .watch
        .add_watch("user-1", "Acme", WatchOptions::default())
        .unwrap();

    let outcome = harness.watch.scrape_due().await.unwrap();
    assert_eq!(outcome.entities_scraped, 1);
    // a1 via the company filter, b1 via the fuzzy match; a2 and b2 excluded
    assert_eq!(outcome.offers_found, 2);
    assert_eq!(outcome.offers_saved, 2);
    assert!(outcome.errors.is_empty());

    {
        let storage = harness.storage.lock().unwrap();
        let entity = storage.get_entity_by_slug("acme").unwrap().unwrap();
        assert_eq!(entity.total_offers_found, 2);
        assert!(entity.last_scraped_at.is_some());

        // Offers are owned by the first watcher
        let offer = storage
            .get_offer_by_url(&format!("{}/jobs/a1", base))
            .unwrap()
            .unwrap();
        assert_eq!(offer.user_id.as_deref(), Some("user-1"));

        assert!(storage
            .get_offer_by_url(&format!("{}/jobs/b2", base))
            .unwrap()
            .is_none());
    }

    // Just scraped, so nothing is due; a second run is a no-op
    let second = harness.watch.scrape_due().await.unwrap();
    assert_eq!(second.entities_scraped, 0);

    // Even when due again, already-known URLs are not saved twice
    let third_outcome = {
        let mut storage = harness.storage.lock().unwrap();
        let entity = storage.get_entity_by_slug("acme").unwrap().unwrap();
        storage
            .record_entity_scrape(entity.id, "2000-01-01T00:00:00Z", 0)
            .unwrap();
        drop(storage);
        harness.watch.scrape_due().await.unwrap()
    };
    assert_eq!(third_outcome.entities_scraped, 1);
    assert_eq!(third_outcome.offers_found, 2);
    assert_eq!(third_outcome.offers_saved, 0);
}

#[tokio::test]
async fn test_search_counts_are_always_present() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_feed(&server, "/feed-a", json!([])).await;

    let harness = build_harness(test_config(&base, &[("feed-a", "/feed-a")]));
    let outcome = harness
        .engine
        .search(
            &SearchParams {
                keywords: "anything".to_string(),
                ..Default::default()
            },
            "user-1",
        )
        .await
        .unwrap();

    assert_eq!(outcome.scraped_count, 0);
    assert_eq!(outcome.deduplicated_count, 0);
    assert_eq!(outcome.saved_count, 0);
    assert!(outcome.offers.is_empty());
    assert!(!outcome.cached);
}
