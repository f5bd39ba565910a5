//! Whole-feed JSON adapter
//!
//! Covers sources that publish their complete active listing set as a single
//! JSON array. Some feeds prepend a metadata object (legal notice, feed
//! stats) as the first element; any leading element without a `title`/
//! `position` field is skipped. Filtering by keyword and company happens
//! client-side because these feeds take no query parameters.

use crate::config::SourceSpec;
use crate::source::{
    company_matches, keywords_match, RawOffer, SourceAdapter, SourceFetch, SourceQuery,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;

pub struct JsonFeedAdapter {
    spec: SourceSpec,
    client: Client,
}

impl JsonFeedAdapter {
    pub fn new(spec: SourceSpec, client: Client) -> Self {
        Self { spec, client }
    }

    /// Maps one feed element onto a RawOffer
    ///
    /// Returns None for elements without a usable title or URL (including the
    /// feed metadata element).
    fn parse_entry(&self, entry: &Value) -> Option<RawOffer> {
        let title = entry
            .get("position")
            .or_else(|| entry.get("title"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())?;

        let url = match entry.get("url").and_then(Value::as_str) {
            Some(u) => u.to_string(),
            None => {
                // Feeds without absolute URLs carry a slug relative to the endpoint
                let slug = entry.get("slug").and_then(Value::as_str)?;
                format!("{}/{}", self.spec.endpoint.trim_end_matches('/'), slug)
            }
        };

        let tags = entry
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(|t| t.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        Some(RawOffer {
            title: title.to_string(),
            company: string_field(entry, "company"),
            location: string_field(entry, "location"),
            description: string_field(entry, "description"),
            url,
            job_type: string_field(entry, "job_type"),
            work_mode: string_field(entry, "work_mode"),
            tags,
            source_id: self.spec.id.clone(),
            scraped_at: Utc::now(),
        })
    }
}

fn string_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SourceAdapter for JsonFeedAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, query: &SourceQuery, max_results: usize) -> SourceFetch {
        let response = match self.client.get(&self.spec.endpoint).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(source = %self.spec.id, "feed request failed: {}", e);
                return SourceFetch::partial(Vec::new(), e.to_string());
            }
        };

        if !response.status().is_success() {
            let reason = format!("HTTP {}", response.status().as_u16());
            tracing::warn!(source = %self.spec.id, "feed request failed: {}", reason);
            return SourceFetch::partial(Vec::new(), reason);
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(source = %self.spec.id, "feed body was not JSON: {}", e);
                return SourceFetch::partial(Vec::new(), e.to_string());
            }
        };

        let Some(entries) = body.as_array() else {
            tracing::warn!(source = %self.spec.id, "feed root was not an array");
            return SourceFetch::partial(Vec::new(), "feed root was not an array");
        };

        let mut offers = Vec::new();
        for entry in entries {
            let Some(offer) = self.parse_entry(entry) else {
                continue;
            };

            let searchable = format!(
                "{} {} {}",
                offer.title,
                offer.description.as_deref().unwrap_or_default(),
                offer.tags.join(" ")
            );
            if !keywords_match(&query.keywords, &searchable) {
                continue;
            }
            if !company_matches(&query.company, &offer.company) {
                continue;
            }

            offers.push(offer);
            if offers.len() >= max_results {
                break;
            }
        }

        tracing::debug!(source = %self.spec.id, count = offers.len(), "feed fetch complete");
        SourceFetch::ok(offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterKind;

    fn test_spec() -> SourceSpec {
        SourceSpec {
            id: "remotefeed".to_string(),
            display_name: "RemoteFeed".to_string(),
            kind: AdapterKind::JsonFeed,
            endpoint: "https://feed.example.com/api".to_string(),
            priority: 1,
            enabled_by_default: true,
            max_pages: 1,
            page_delay_ms: 0,
            selectors: None,
        }
    }

    fn adapter() -> JsonFeedAdapter {
        JsonFeedAdapter::new(test_spec(), Client::new())
    }

    #[test]
    fn test_parse_entry_full() {
        let entry = serde_json::json!({
            "position": "Rust Engineer",
            "company": "Acme",
            "location": "Remote",
            "description": "Build things",
            "url": "https://feed.example.com/jobs/1",
            "tags": ["Rust", "Backend"],
            "work_mode": "remote"
        });

        let offer = adapter().parse_entry(&entry).unwrap();
        assert_eq!(offer.title, "Rust Engineer");
        assert_eq!(offer.company.as_deref(), Some("Acme"));
        assert_eq!(offer.tags, vec!["rust", "backend"]);
        assert_eq!(offer.work_mode.as_deref(), Some("remote"));
        assert_eq!(offer.source_id, "remotefeed");
    }

    #[test]
    fn test_parse_entry_slug_url() {
        let entry = serde_json::json!({
            "title": "Backend Developer",
            "slug": "backend-developer-42"
        });

        let offer = adapter().parse_entry(&entry).unwrap();
        assert_eq!(
            offer.url,
            "https://feed.example.com/api/backend-developer-42"
        );
        assert!(offer.company.is_none());
    }

    #[test]
    fn test_parse_entry_metadata_element_skipped() {
        let entry = serde_json::json!({
            "legal": "API terms of use",
            "last_updated": 1700000000
        });

        assert!(adapter().parse_entry(&entry).is_none());
    }

    #[test]
    fn test_parse_entry_missing_url_and_slug() {
        let entry = serde_json::json!({ "title": "No link" });
        assert!(adapter().parse_entry(&entry).is_none());
    }
}
