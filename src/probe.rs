//! URL accessibility probe
//!
//! Classifies an arbitrary user-submitted URL before it becomes a custom
//! source: is it reachable, does it look like a careers page, and does it sit
//! behind anti-bot protection. The probe never fails: every error path
//! collapses into a structured "not accessible" analysis with a readable
//! recommendation.

use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};

/// Keywords whose presence marks a page as job-related
const JOB_KEYWORDS: &[&str] = &[
    "job", "career", "position", "hiring", "vacancy", "opening", "emploi", "poste",
];

/// Marker substrings of common anti-bot walls
const ANTI_BOT_MARKERS: &[&str] = &[
    "cloudflare",
    "captcha",
    "recaptcha",
    "bot detection",
    "access denied",
];

/// Content classification of a probed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Json,
    Unknown,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of probing a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityAnalysis {
    pub is_accessible: bool,
    pub content_type: ContentKind,
    pub has_jobs: bool,
    pub job_keywords_found: Vec<String>,
    /// Rough count of job-looking elements, HTML pages only
    pub estimated_job_count: Option<usize>,
    pub has_anti_bot: bool,
    pub anti_bot_markers: Vec<String>,
    pub recommendation: String,
    pub is_scrapable: bool,
}

impl AccessibilityAnalysis {
    /// The analysis produced for every failure path
    fn inaccessible(reason: &str) -> Self {
        Self {
            is_accessible: false,
            content_type: ContentKind::Unknown,
            has_jobs: false,
            job_keywords_found: Vec::new(),
            estimated_job_count: None,
            has_anti_bot: false,
            anti_bot_markers: Vec::new(),
            recommendation: format!("URL is not accessible: {}", reason),
            is_scrapable: false,
        }
    }
}

pub struct AccessibilityProbe {
    client: Client,
}

impl AccessibilityProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Probes a URL and classifies its scrapability
    ///
    /// Never returns an error: timeouts, DNS failures, TLS problems and
    /// non-200 statuses all become a structured negative analysis.
    pub async fn probe(&self, url: &str) -> AccessibilityAnalysis {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, "probe request failed: {}", e);
                return AccessibilityAnalysis::inaccessible(&e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            return AccessibilityAnalysis::inaccessible(&format!("HTTP {}", status.as_u16()));
        }

        let content_type_header = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return AccessibilityAnalysis::inaccessible(&e.to_string()),
        };

        let content_type = if content_type_header.contains("application/json") {
            ContentKind::Json
        } else if content_type_header.contains("text/html") {
            ContentKind::Html
        } else {
            ContentKind::Unknown
        };

        // Keyword scanning happens on visible text for HTML, the raw body
        // otherwise
        let (scan_text, estimated_job_count) = match content_type {
            ContentKind::Html => {
                let document = Html::parse_document(&body);
                let text = document
                    .root_element()
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                let estimate = estimate_job_elements(&body);
                (text, Some(estimate))
            }
            _ => (body.to_lowercase(), None),
        };

        let job_keywords_found: Vec<String> = JOB_KEYWORDS
            .iter()
            .filter(|kw| scan_text.contains(**kw))
            .map(|kw| kw.to_string())
            .collect();
        let has_jobs = !job_keywords_found.is_empty();

        // Anti-bot markers hide in scripts and headers as much as in the
        // visible text, so scan the raw body
        let body_lower = body.to_lowercase();
        let anti_bot_markers: Vec<String> = ANTI_BOT_MARKERS
            .iter()
            .filter(|marker| body_lower.contains(**marker))
            .map(|marker| marker.to_string())
            .collect();
        let has_anti_bot = !anti_bot_markers.is_empty();

        let is_scrapable = has_jobs && !has_anti_bot;

        AccessibilityAnalysis {
            is_accessible: true,
            content_type,
            has_jobs,
            job_keywords_found,
            estimated_job_count,
            has_anti_bot,
            anti_bot_markers,
            recommendation: recommendation(has_jobs, has_anti_bot, content_type),
            is_scrapable,
        }
    }
}

/// Counts elements that look like individual job listings
fn estimate_job_elements(html: &str) -> usize {
    let document = Html::parse_document(html);

    let mut count = 0;
    for element in document.root_element().descendants() {
        let Some(el) = scraper::ElementRef::wrap(element) else {
            continue;
        };
        let value = el.value();

        let class_hit = value.attr("class").is_some_and(|classes| {
            let lower = classes.to_lowercase();
            lower.contains("job") || lower.contains("position")
        });
        let href_hit = value.name() == "a"
            && value
                .attr("href")
                .is_some_and(|href| href.to_lowercase().contains("/job"));

        if class_hit || href_hit {
            count += 1;
        }
    }

    count
}

fn recommendation(has_jobs: bool, has_anti_bot: bool, content_type: ContentKind) -> String {
    if !has_jobs {
        "No job listings detected; this does not look like a careers page.".to_string()
    } else if has_anti_bot {
        "Anti-bot protection detected; scraping is likely to fail.".to_string()
    } else if content_type == ContentKind::Json {
        "JSON API detected; scraping should be easy and reliable.".to_string()
    } else {
        "HTML page with job listings detected; scraping should work.".to_string()
    }
}
