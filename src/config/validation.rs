use crate::config::types::{
    AdapterKind, CacheConfig, ClientConfig, Config, EngineConfig, SourceSpec, StorageConfig,
    WatchConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_cache_config(&config.cache)?;
    validate_watch_config(&config.watch)?;
    validate_client_config(&config.client)?;
    validate_storage_config(&config.storage)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates engine configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.source_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "source_timeout_secs must be >= 1, got {}",
            config.source_timeout_secs
        )));
    }

    if let Some(deadline) = config.overall_deadline_secs {
        if deadline < config.source_timeout_secs {
            return Err(ConfigError::Validation(format!(
                "overall_deadline_secs ({}) must not be smaller than source_timeout_secs ({})",
                deadline, config.source_timeout_secs
            )));
        }
    }

    if config.limit_per_source < 1 {
        return Err(ConfigError::Validation(
            "limit_per_source must be >= 1".to_string(),
        ));
    }

    validate_ratio("dedup_similarity_threshold", config.dedup_similarity_threshold)?;
    validate_ratio("company_match_threshold", config.company_match_threshold)?;

    if config.max_priority_sources < 1 {
        return Err(ConfigError::Validation(
            "max_priority_sources must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that a similarity threshold lies in [0, 1]
fn validate_ratio(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.default_ttl_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "default_ttl_hours must be >= 1, got {}",
            config.default_ttl_hours
        )));
    }
    Ok(())
}

/// Validates watch configuration
fn validate_watch_config(config: &WatchConfig) -> Result<(), ConfigError> {
    if config.scraping_frequency_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "scraping_frequency_hours must be >= 1, got {}",
            config.scraping_frequency_hours
        )));
    }
    Ok(())
}

/// Validates client identification configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.agent_name.is_empty() {
        return Err(ConfigError::Validation(
            "agent_name cannot be empty".to_string(),
        ));
    }

    if !config
        .agent_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "agent_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.agent_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates the source catalog
fn validate_sources(sources: &[SourceSpec]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[source]] entry is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for spec in sources {
        if spec.id.is_empty() {
            return Err(ConfigError::Validation(
                "source id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(spec.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id '{}'",
                spec.id
            )));
        }

        Url::parse(&spec.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint for '{}': {}", spec.id, e))
        })?;

        if spec.max_pages < 1 {
            return Err(ConfigError::Validation(format!(
                "max_pages for '{}' must be >= 1",
                spec.id
            )));
        }

        if spec.kind == AdapterKind::HtmlBoard && spec.selectors.is_none() {
            return Err(ConfigError::Validation(format!(
                "html-board source '{}' requires a [source.selectors] table",
                spec.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SelectorConfig;

    fn base_engine() -> EngineConfig {
        EngineConfig {
            max_concurrent_fetches: 6,
            source_timeout_secs: 30,
            overall_deadline_secs: None,
            limit_per_source: 100,
            dedup_similarity_threshold: 0.9,
            company_match_threshold: 0.75,
            max_priority_sources: 3,
        }
    }

    fn base_spec(id: &str) -> SourceSpec {
        SourceSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: AdapterKind::JsonFeed,
            endpoint: "https://example.com/api".to_string(),
            priority: 1,
            enabled_by_default: true,
            max_pages: 3,
            page_delay_ms: 1000,
            selectors: None,
        }
    }

    #[test]
    fn test_valid_engine_config() {
        assert!(validate_engine_config(&base_engine()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut cfg = base_engine();
        cfg.max_concurrent_fetches = 0;
        assert!(validate_engine_config(&cfg).is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut cfg = base_engine();
        cfg.dedup_similarity_threshold = 1.5;
        assert!(validate_engine_config(&cfg).is_err());

        let mut cfg = base_engine();
        cfg.company_match_threshold = -0.1;
        assert!(validate_engine_config(&cfg).is_err());
    }

    #[test]
    fn test_deadline_below_source_timeout_rejected() {
        let mut cfg = base_engine();
        cfg.overall_deadline_secs = Some(10);
        cfg.source_timeout_secs = 30;
        assert!(validate_engine_config(&cfg).is_err());
    }

    #[test]
    fn test_duplicate_source_id_rejected() {
        let sources = vec![base_spec("feed"), base_spec("feed")];
        assert!(validate_sources(&sources).is_err());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert!(validate_sources(&[]).is_err());
    }

    #[test]
    fn test_html_board_requires_selectors() {
        let mut spec = base_spec("board");
        spec.kind = AdapterKind::HtmlBoard;
        assert!(validate_sources(&[spec.clone()]).is_err());

        spec.selectors = Some(SelectorConfig {
            listing: "li.job".to_string(),
            title: "h2".to_string(),
            company: ".company".to_string(),
            location: None,
            link: "a".to_string(),
        });
        assert!(validate_sources(&[spec]).is_ok());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut spec = base_spec("feed");
        spec.endpoint = "not a url".to_string();
        assert!(validate_sources(&[spec]).is_err());
    }
}
