//! Page-numbered JSON API adapter
//!
//! Covers aggregator APIs that expose a `?page=N` search endpoint returning
//! `{"results": [...], "page_count": N}`. Pages are requested sequentially
//! with the source's configured pacing delay in between; fetching stops at
//! the page cap, an empty page, the advertised page count, or once
//! `max_results` offers were collected. A failure mid-pagination keeps the
//! pages already parsed.

use crate::config::SourceSpec;
use crate::source::{page_pause, RawOffer, SourceAdapter, SourceFetch, SourceQuery};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;

pub struct PagedApiAdapter {
    spec: SourceSpec,
    client: Client,
}

impl PagedApiAdapter {
    pub fn new(spec: SourceSpec, client: Client) -> Self {
        Self { spec, client }
    }

    /// Fetches and parses a single result page
    async fn fetch_page(&self, query: &SourceQuery, page: u32) -> Result<PageResult, String> {
        let mut request = self
            .client
            .get(&self.spec.endpoint)
            .query(&[("page", page.to_string())]);

        if let Some(keywords) = &query.keywords {
            request = request.query(&[("q", keywords.as_str())]);
        }
        if let Some(location) = &query.location {
            request = request.query(&[("location", location.as_str())]);
        }
        if let Some(company) = &query.company {
            request = request.query(&[("company", company.as_str())]);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        let body: Value = response.json().await.map_err(|e| e.to_string())?;

        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| "response had no results array".to_string())?;

        let offers = results
            .iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect();

        let page_count = body
            .get("page_count")
            .and_then(Value::as_u64)
            .map(|n| n as u32);

        Ok(PageResult { offers, page_count })
    }

    /// Maps one API result onto a RawOffer; entries without a title or
    /// landing URL are dropped
    fn parse_entry(&self, entry: &Value) -> Option<RawOffer> {
        let title = entry
            .get("title")
            .or_else(|| entry.get("name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())?;

        let url = entry
            .get("url")
            .and_then(Value::as_str)
            .or_else(|| {
                entry
                    .get("refs")
                    .and_then(|r| r.get("landing_page"))
                    .and_then(Value::as_str)
            })?
            .to_string();

        // Company comes either as a plain string or as {"name": ...}
        let company = match entry.get("company") {
            Some(Value::String(s)) => non_empty(s),
            Some(obj) => obj.get("name").and_then(Value::as_str).and_then(non_empty),
            None => None,
        };

        // Location: plain string, or the first element of a locations array
        let location = match entry.get("location") {
            Some(Value::String(s)) => non_empty(s),
            _ => entry
                .get("locations")
                .and_then(Value::as_array)
                .and_then(|arr| arr.first())
                .and_then(|l| l.get("name"))
                .and_then(Value::as_str)
                .and_then(non_empty),
        };

        let description = entry
            .get("description")
            .or_else(|| entry.get("contents"))
            .and_then(Value::as_str)
            .and_then(non_empty);

        let job_type = entry
            .get("job_type")
            .or_else(|| entry.get("type"))
            .and_then(Value::as_str)
            .and_then(non_empty);

        let tags = entry
            .get("tags")
            .or_else(|| entry.get("categories"))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().or_else(|| t.get("name").and_then(Value::as_str)))
                    .map(|t| t.trim().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        Some(RawOffer {
            title: title.to_string(),
            company,
            location,
            description,
            url,
            job_type,
            work_mode: entry.get("work_mode").and_then(Value::as_str).and_then(non_empty),
            tags,
            source_id: self.spec.id.clone(),
            scraped_at: Utc::now(),
        })
    }
}

struct PageResult {
    offers: Vec<RawOffer>,
    page_count: Option<u32>,
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[async_trait]
impl SourceAdapter for PagedApiAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, query: &SourceQuery, max_results: usize) -> SourceFetch {
        let mut offers: Vec<RawOffer> = Vec::new();

        for page in 0..self.spec.max_pages {
            if page > 0 {
                page_pause(self.spec.page_delay_ms).await;
            }

            let result = match self.fetch_page(query, page).await {
                Ok(r) => r,
                Err(reason) => {
                    tracing::warn!(
                        source = %self.spec.id,
                        page,
                        "page fetch failed: {}",
                        reason
                    );
                    return SourceFetch::partial(offers, reason);
                }
            };

            if result.offers.is_empty() {
                break;
            }

            let remaining = max_results.saturating_sub(offers.len());
            offers.extend(result.offers.into_iter().take(remaining));

            if offers.len() >= max_results {
                break;
            }

            if let Some(page_count) = result.page_count {
                if page + 1 >= page_count {
                    break;
                }
            }
        }

        tracing::debug!(source = %self.spec.id, count = offers.len(), "paged fetch complete");
        SourceFetch::ok(offers)
    }
}
