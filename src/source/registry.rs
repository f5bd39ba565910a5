//! Startup-time source registry
//!
//! Each catalog entry resolves to exactly one adapter instance when the
//! registry is built; lookups afterwards are cheap map reads. This replaces
//! string-keyed dynamic dispatch with adapters constructed per call.

use crate::config::{AdapterKind, Config, SourceSpec};
use crate::source::{HtmlBoardAdapter, JsonFeedAdapter, PagedApiAdapter, SourceAdapter};
use crate::{ConfigError, OfferflowError};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    /// Catalog order: ascending priority, id as tie-break
    ordered_ids: Vec<String>,
}

impl SourceRegistry {
    /// Builds the registry from the configured catalog
    ///
    /// Selector compilation failures surface here, at startup.
    pub fn from_config(config: &Config, client: Client) -> Result<Self, OfferflowError> {
        let mut adapters: HashMap<String, Arc<dyn SourceAdapter>> = HashMap::new();

        let mut specs: Vec<&SourceSpec> = config.sources.iter().collect();
        specs.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        let ordered_ids = specs.iter().map(|s| s.id.clone()).collect();

        for spec in specs {
            let adapter: Arc<dyn SourceAdapter> = match spec.kind {
                AdapterKind::JsonFeed => {
                    Arc::new(JsonFeedAdapter::new(spec.clone(), client.clone()))
                }
                AdapterKind::PagedApi => {
                    Arc::new(PagedApiAdapter::new(spec.clone(), client.clone()))
                }
                AdapterKind::HtmlBoard => Arc::new(
                    HtmlBoardAdapter::new(spec.clone(), client.clone())
                        .map_err(ConfigError::Validation)?,
                ),
            };
            adapters.insert(spec.id.clone(), adapter);
        }

        Ok(Self {
            adapters,
            ordered_ids,
        })
    }

    /// Resolves a source id to its adapter
    pub fn get(&self, id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(id).cloned()
    }

    /// All source ids in priority order
    pub fn all_ids(&self) -> &[String] {
        &self.ordered_ids
    }

    /// Source ids enabled by default, in priority order
    ///
    /// These become `enabled_sources` when user preferences are created
    /// lazily on first search.
    pub fn default_enabled_ids(&self) -> Vec<String> {
        self.ordered_ids
            .iter()
            .filter(|id| {
                self.adapters
                    .get(*id)
                    .map(|a| a.spec().enabled_by_default)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// The top `limit` default-enabled sources by priority
    pub fn default_priority_ids(&self, limit: usize) -> Vec<String> {
        self.default_enabled_ids().into_iter().take(limit).collect()
    }

    /// The adapters used by the watch scraper: the highest-priority source as
    /// the company-filtered primary, the next one as the broad-search
    /// secondary (when the catalog has more than one source)
    pub fn watch_strategies(&self) -> (Option<Arc<dyn SourceAdapter>>, Option<Arc<dyn SourceAdapter>>) {
        let defaults = self.default_enabled_ids();
        let primary = defaults.first().and_then(|id| self.get(id));
        let secondary = defaults.get(1).and_then(|id| self.get(id));
        (primary, secondary)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, ClientConfig, EngineConfig, StorageConfig, WatchConfig};

    fn spec(id: &str, priority: u32, enabled: bool) -> SourceSpec {
        SourceSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: AdapterKind::JsonFeed,
            endpoint: "https://example.com/api".to_string(),
            priority,
            enabled_by_default: enabled,
            max_pages: 1,
            page_delay_ms: 0,
            selectors: None,
        }
    }

    fn test_config(sources: Vec<SourceSpec>) -> Config {
        Config {
            engine: EngineConfig {
                max_concurrent_fetches: 6,
                source_timeout_secs: 30,
                overall_deadline_secs: None,
                limit_per_source: 100,
                dedup_similarity_threshold: 0.9,
                company_match_threshold: 0.75,
                max_priority_sources: 3,
            },
            cache: CacheConfig::default(),
            watch: WatchConfig::default(),
            client: ClientConfig {
                agent_name: "TestAgent".to_string(),
                agent_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
            },
            storage: StorageConfig {
                database_path: ":memory:".to_string(),
            },
            sources,
        }
    }

    #[test]
    fn test_registry_resolves_ids() {
        let config = test_config(vec![spec("b", 2, true), spec("a", 1, true)]);
        let registry = SourceRegistry::from_config(&config, Client::new()).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.all_ids(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_default_enabled_respects_flag_and_order() {
        let config = test_config(vec![
            spec("low", 5, true),
            spec("off", 1, false),
            spec("top", 1, true),
        ]);
        let registry = SourceRegistry::from_config(&config, Client::new()).unwrap();

        assert_eq!(
            registry.default_enabled_ids(),
            vec!["top".to_string(), "low".to_string()]
        );
        assert_eq!(registry.default_priority_ids(1), vec!["top".to_string()]);
    }

    #[test]
    fn test_watch_strategies() {
        let config = test_config(vec![spec("first", 1, true), spec("second", 2, true)]);
        let registry = SourceRegistry::from_config(&config, Client::new()).unwrap();

        let (primary, secondary) = registry.watch_strategies();
        assert_eq!(primary.unwrap().spec().id, "first");
        assert_eq!(secondary.unwrap().spec().id, "second");
    }
}
