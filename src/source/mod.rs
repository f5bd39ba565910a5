//! Source adapters and the source registry
//!
//! Every external source is described by a [`SourceSpec`] catalog entry and
//! resolved at startup to exactly one adapter instance implementing
//! [`SourceAdapter`]. Adapters are an isolated failure domain: they never
//! propagate errors to the orchestrator, returning whatever partial results
//! they obtained together with an optional failure reason.

mod html_board;
mod json_feed;
mod paged_api;
mod registry;

pub use html_board::HtmlBoardAdapter;
pub use json_feed::JsonFeedAdapter;
pub use paged_api::PagedApiAdapter;
pub use registry::SourceRegistry;

use crate::config::{ClientConfig, SourceSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::Client;
use std::time::Duration;

/// Search parameters passed to every adapter
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub keywords: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub work_mode: Option<String>,
    pub company: Option<String>,
}

impl SourceQuery {
    /// Query that matches everything from a source (used by the watch scraper
    /// with a company filter only)
    pub fn for_company(company: &str) -> Self {
        Self {
            company: Some(company.to_string()),
            ..Default::default()
        }
    }
}

/// An offer in the shape the adapter's source delivered it
///
/// Fields the source does not provide are `None`, never fabricated.
#[derive(Debug, Clone)]
pub struct RawOffer {
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub job_type: Option<String>,
    pub work_mode: Option<String>,
    pub tags: Vec<String>,
    pub source_id: String,
    pub scraped_at: DateTime<Utc>,
}

/// What one adapter produced for one fan-out call
///
/// `offers` may be non-empty even when `failure` is set: an adapter that
/// failed on page 3 of 5 still returns the first two pages.
#[derive(Debug, Default)]
pub struct SourceFetch {
    pub offers: Vec<RawOffer>,
    pub failure: Option<String>,
}

impl SourceFetch {
    pub fn ok(offers: Vec<RawOffer>) -> Self {
        Self {
            offers,
            failure: None,
        }
    }

    pub fn partial(offers: Vec<RawOffer>, reason: impl Into<String>) -> Self {
        Self {
            offers,
            failure: Some(reason.into()),
        }
    }
}

/// Per-source result reported back to callers of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The source contributed this many raw offers
    Fetched { count: usize },

    /// The source failed; partial offers (if any) were still used
    Failed { reason: String },

    /// The source was enabled but not priority and was queued for the
    /// background batch instead of being awaited in-request
    Deferred,
}

/// Common adapter contract
///
/// `fetch` must not panic and must not return an error: internal failures are
/// converted into a `SourceFetch` with a `failure` reason. Pagination and
/// inter-page pacing happen inside the adapter, bounded by the catalog
/// entry's `max_pages` and `page_delay_ms`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The catalog entry this adapter was built from
    fn spec(&self) -> &SourceSpec;

    /// Fetches up to `max_results` raw offers matching `query`
    async fn fetch(&self, query: &SourceQuery, max_results: usize) -> SourceFetch;
}

/// Builds the shared HTTP client used by all adapters and the probe
///
/// The user agent is formatted as `AgentName/Version (+contact-url)`.
pub fn build_http_client(
    config: &ClientConfig,
    timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{})",
        config.agent_name, config.agent_version, config.contact_url
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sleeps between page requests to the same source
///
/// The configured base delay gets up to 50% random jitter so paginated
/// fetches do not hit sources on a fixed beat.
pub(crate) async fn page_pause(base_ms: u64) {
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 2 + 1);
    tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
}

/// Checks whether any whitespace-separated keyword occurs in the haystack
///
/// Matching is case-insensitive; an empty keyword string matches everything.
pub(crate) fn keywords_match(keywords: &Option<String>, haystack: &str) -> bool {
    let Some(keywords) = keywords else {
        return true;
    };
    let haystack = haystack.to_lowercase();
    keywords
        .split_whitespace()
        .any(|kw| haystack.contains(&kw.to_lowercase()))
        || keywords.trim().is_empty()
}

/// Case-insensitive company substring filter
pub(crate) fn company_matches(filter: &Option<String>, company: &Option<String>) -> bool {
    match filter {
        None => true,
        Some(wanted) => company
            .as_deref()
            .map(|c| c.to_lowercase().contains(&wanted.to_lowercase()))
            .unwrap_or(false),
    }
}
