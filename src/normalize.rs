//! Offer normalization
//!
//! Maps adapter-native [`RawOffer`]s onto the canonical [`NormalizedOffer`]
//! shape used by dedup, the cache, and persistence. Pure field renaming and
//! coercion only: no I/O, no business logic, and idempotent (normalizing an
//! already-normalized offer changes nothing).

use crate::source::RawOffer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The canonical offer shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOffer {
    pub job_title: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub source_url: String,
    pub source_platform: String,
    pub job_type: Option<String>,
    pub work_mode: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Normalizes a single raw offer
pub fn normalize(raw: RawOffer) -> NormalizedOffer {
    NormalizedOffer {
        job_title: raw.title.trim().to_string(),
        company_name: trimmed(raw.company),
        location: trimmed(raw.location),
        description: trimmed(raw.description),
        source_url: raw.url.trim().to_string(),
        source_platform: raw.source_id,
        job_type: trimmed(raw.job_type),
        work_mode: trimmed(raw.work_mode),
        tags: raw.tags,
        scraped_at: raw.scraped_at,
    }
}

/// Normalizes a batch, preserving the fan-out order
pub fn normalize_batch(raw: Vec<RawOffer>) -> Vec<NormalizedOffer> {
    raw.into_iter().map(normalize).collect()
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
