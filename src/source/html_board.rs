//! HTML job board adapter
//!
//! Covers sources without a usable API. Listing pages are fetched with the
//! shared client and parsed with CSS selectors taken from the source's
//! catalog entry, so per-site markup knowledge lives in configuration rather
//! than code. Pagination uses a `?q=...&page=N` query string convention and
//! stops at the page cap or the first page without listings.

use crate::config::{SelectorConfig, SourceSpec};
use crate::source::{page_pause, RawOffer, SourceAdapter, SourceFetch, SourceQuery};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

pub struct HtmlBoardAdapter {
    spec: SourceSpec,
    client: Client,
    selectors: CompiledSelectors,
}

/// Selectors parsed once at registry construction
struct CompiledSelectors {
    listing: Selector,
    title: Selector,
    company: Selector,
    location: Option<Selector>,
    link: Selector,
}

impl HtmlBoardAdapter {
    /// Compiles the configured selectors; invalid selector syntax is a
    /// startup error, not a per-request one
    pub fn new(spec: SourceSpec, client: Client) -> Result<Self, String> {
        let config = spec
            .selectors
            .clone()
            .ok_or_else(|| format!("html-board source '{}' has no selectors", spec.id))?;
        let selectors = CompiledSelectors::compile(&config)?;
        Ok(Self {
            spec,
            client,
            selectors,
        })
    }

    fn page_url(&self, query: &SourceQuery, page: u32) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.spec.endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(keywords) = &query.keywords {
                pairs.append_pair("q", keywords);
            }
            if let Some(location) = &query.location {
                pairs.append_pair("location", location);
            }
            if let Some(company) = &query.company {
                pairs.append_pair("company", company);
            }
            if page > 0 {
                pairs.append_pair("page", &(page + 1).to_string());
            }
        }
        Ok(url)
    }

    /// Extracts offers from one listing page
    fn parse_listings(&self, html: &str, base: &Url) -> Vec<RawOffer> {
        let document = Html::parse_document(html);
        let mut offers = Vec::new();

        for listing in document.select(&self.selectors.listing) {
            let Some(title) = listing
                .select(&self.selectors.title)
                .next()
                .map(|el| el.text().collect::<String>())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
            else {
                continue;
            };

            let Some(href) = listing
                .select(&self.selectors.link)
                .next()
                .and_then(|el| el.value().attr("href"))
            else {
                continue;
            };

            // Relative hrefs resolve against the page URL
            let Ok(url) = base.join(href) else {
                tracing::debug!(source = %self.spec.id, href, "unresolvable listing href");
                continue;
            };

            let company = listing
                .select(&self.selectors.company)
                .next()
                .map(|el| el.text().collect::<String>())
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty());

            let location = self.selectors.location.as_ref().and_then(|sel| {
                listing
                    .select(sel)
                    .next()
                    .map(|el| el.text().collect::<String>())
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
            });

            offers.push(RawOffer {
                title,
                company,
                location,
                description: None,
                url: url.to_string(),
                job_type: None,
                work_mode: None,
                tags: Vec::new(),
                source_id: self.spec.id.clone(),
                scraped_at: Utc::now(),
            });
        }

        offers
    }
}

impl CompiledSelectors {
    fn compile(config: &SelectorConfig) -> Result<Self, String> {
        let parse = |name: &str, raw: &str| {
            Selector::parse(raw).map_err(|e| format!("invalid {} selector '{}': {:?}", name, raw, e))
        };

        Ok(Self {
            listing: parse("listing", &config.listing)?,
            title: parse("title", &config.title)?,
            company: parse("company", &config.company)?,
            location: config
                .location
                .as_deref()
                .map(|raw| parse("location", raw))
                .transpose()?,
            link: parse("link", &config.link)?,
        })
    }
}

#[async_trait]
impl SourceAdapter for HtmlBoardAdapter {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, query: &SourceQuery, max_results: usize) -> SourceFetch {
        let mut offers: Vec<RawOffer> = Vec::new();

        for page in 0..self.spec.max_pages {
            if page > 0 {
                page_pause(self.spec.page_delay_ms).await;
            }

            let url = match self.page_url(query, page) {
                Ok(u) => u,
                Err(e) => {
                    return SourceFetch::partial(offers, format!("bad endpoint: {}", e));
                }
            };

            let body = match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.text().await {
                        Ok(body) => body,
                        Err(e) => {
                            tracing::warn!(source = %self.spec.id, page, "body read failed: {}", e);
                            return SourceFetch::partial(offers, e.to_string());
                        }
                    }
                }
                Ok(response) => {
                    let reason = format!("HTTP {}", response.status().as_u16());
                    tracing::warn!(source = %self.spec.id, page, "page fetch failed: {}", reason);
                    return SourceFetch::partial(offers, reason);
                }
                Err(e) => {
                    tracing::warn!(source = %self.spec.id, page, "page fetch failed: {}", e);
                    return SourceFetch::partial(offers, e.to_string());
                }
            };

            let page_offers = self.parse_listings(&body, &url);
            if page_offers.is_empty() {
                break;
            }

            let remaining = max_results.saturating_sub(offers.len());
            offers.extend(page_offers.into_iter().take(remaining));

            if offers.len() >= max_results {
                break;
            }
        }

        tracing::debug!(source = %self.spec.id, count = offers.len(), "board fetch complete");
        SourceFetch::ok(offers)
    }
}
