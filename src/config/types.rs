use serde::Deserialize;

/// Main configuration structure for Offerflow
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    pub client: ClientConfig,
    pub storage: StorageConfig,
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceSpec>,
}

/// Aggregation engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently running source fetches
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: u32,

    /// Per-source HTTP timeout in seconds
    #[serde(rename = "source-timeout-secs", default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    /// Optional overall budget for one search request; in-flight fetches past
    /// the budget are aborted and the request returns partial results
    #[serde(rename = "overall-deadline-secs", default)]
    pub overall_deadline_secs: Option<u64>,

    /// Maximum offers requested from each source
    #[serde(rename = "limit-per-source", default = "default_limit_per_source")]
    pub limit_per_source: usize,

    /// Signature similarity at or above which two offers are duplicates
    #[serde(
        rename = "dedup-similarity-threshold",
        default = "default_dedup_threshold"
    )]
    pub dedup_similarity_threshold: f64,

    /// Company-name similarity required for broad-search watch results
    #[serde(
        rename = "company-match-threshold",
        default = "default_company_threshold"
    )]
    pub company_match_threshold: f64,

    /// How many sources a user may mark as priority (fetched in-request)
    #[serde(rename = "max-priority-sources", default = "default_max_priority")]
    pub max_priority_sources: usize,
}

/// Result cache defaults applied to newly created user preferences
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(rename = "enabled-by-default", default = "default_true")]
    pub enabled_by_default: bool,

    #[serde(rename = "default-ttl-hours", default = "default_ttl_hours")]
    pub default_ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            default_ttl_hours: default_ttl_hours(),
        }
    }
}

/// Company watch scraping configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Hours between scrapes of a watched entity
    #[serde(
        rename = "scraping-frequency-hours",
        default = "default_watch_frequency"
    )]
    pub scraping_frequency_hours: i64,

    /// Whether non-priority enabled sources are queued for background scraping
    #[serde(rename = "background-scraping-enabled", default = "default_true")]
    pub background_scraping_enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            scraping_frequency_hours: default_watch_frequency(),
            background_scraping_enabled: true,
        }
    }
}

/// HTTP client identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "agent-name")]
    pub agent_name: String,

    #[serde(rename = "agent-version")]
    pub agent_version: String,

    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// The adapter implementation a source resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AdapterKind {
    /// Single JSON endpoint returning the whole feed as an array
    #[serde(rename = "json-feed")]
    JsonFeed,

    /// Page-numbered JSON API
    #[serde(rename = "paged-api")]
    PagedApi,

    /// HTML listing pages parsed with per-source selectors
    #[serde(rename = "html-board")]
    HtmlBoard,
}

/// One entry of the source catalog
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    /// Stable identifier referenced by user preferences and cache keys
    pub id: String,

    #[serde(rename = "display-name")]
    pub display_name: String,

    pub kind: AdapterKind,

    /// Base URL of the feed, API, or board
    pub endpoint: String,

    /// Tie-break ordering; lower values are preferred
    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(rename = "enabled-by-default", default = "default_true")]
    pub enabled_by_default: bool,

    /// Pagination cap for paged adapters
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Delay between page requests to the same source, in milliseconds
    #[serde(rename = "page-delay-ms", default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// CSS selectors, required for `html-board` sources
    #[serde(default)]
    pub selectors: Option<SelectorConfig>,
}

/// CSS selectors for the HTML board adapter
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Selector for one listing container
    #[serde(rename = "listing")]
    pub listing: String,

    pub title: String,

    pub company: String,

    #[serde(default)]
    pub location: Option<String>,

    /// Anchor element whose `href` is the offer URL
    pub link: String,
}

fn default_true() -> bool {
    true
}

fn default_source_timeout() -> u64 {
    30
}

fn default_limit_per_source() -> usize {
    100
}

fn default_dedup_threshold() -> f64 {
    0.9
}

fn default_company_threshold() -> f64 {
    0.75
}

fn default_max_priority() -> usize {
    3
}

fn default_ttl_hours() -> i64 {
    24
}

fn default_watch_frequency() -> i64 {
    24
}

fn default_priority() -> u32 {
    1
}

fn default_max_pages() -> u32 {
    3
}

fn default_page_delay() -> u64 {
    1000
}
