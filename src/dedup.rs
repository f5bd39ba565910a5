//! Offer deduplication
//!
//! Two passes over the fan-out output, first occurrence wins (the fan-out
//! order is not stable across runs, so the tie-break is non-deterministic):
//!
//! 1. exact `source_url` match
//! 2. fuzzy signature match: `lowercase(title)|lowercase(company)` compared
//!    with a normalized edit-distance ratio; at or above the threshold the
//!    newcomer is dropped
//!
//! The fuzzy pass is O(n²) over the batch. Fine for the low hundreds of
//! offers a request produces; bucket signatures by the title's first word
//! before comparing if volumes ever grow past that.

use crate::normalize::NormalizedOffer;
use std::collections::HashSet;

pub struct Deduplicator {
    threshold: f64,
}

impl Deduplicator {
    /// `threshold` is the similarity ratio (0.0–1.0) at which two signatures
    /// count as duplicates
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Builds the fuzzy-match signature for an offer
    pub fn signature(offer: &NormalizedOffer) -> String {
        format!(
            "{}|{}",
            offer.job_title.trim().to_lowercase(),
            offer
                .company_name
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_lowercase()
        )
    }

    /// Removes URL and fuzzy-signature duplicates, preserving input order
    pub fn dedup(&self, offers: Vec<NormalizedOffer>) -> Vec<NormalizedOffer> {
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut seen_signatures: Vec<String> = Vec::new();
        let mut kept = Vec::with_capacity(offers.len());

        for offer in offers {
            if !offer.source_url.is_empty() && seen_urls.contains(&offer.source_url) {
                continue;
            }

            let signature = Self::signature(&offer);
            let is_duplicate = seen_signatures
                .iter()
                .any(|existing| strsim::normalized_levenshtein(&signature, existing) >= self.threshold);
            if is_duplicate {
                continue;
            }

            if !offer.source_url.is_empty() {
                seen_urls.insert(offer.source_url.clone());
            }
            seen_signatures.push(signature);
            kept.push(offer);
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn offer(title: &str, company: &str, url: &str) -> NormalizedOffer {
        NormalizedOffer {
            job_title: title.to_string(),
            company_name: Some(company.to_string()),
            location: None,
            description: None,
            source_url: url.to_string(),
            source_platform: "test".to_string(),
            job_type: None,
            work_mode: None,
            tags: Vec::new(),
            scraped_at: Utc::now(),
        }
    }

    fn dedup(offers: Vec<NormalizedOffer>) -> Vec<NormalizedOffer> {
        Deduplicator::new(0.9).dedup(offers)
    }

    #[test]
    fn test_exact_url_duplicate_dropped() {
        let offers = vec![
            offer("Rust Engineer", "Acme", "https://a.example.com/1"),
            offer("Completely Different Role", "Globex", "https://a.example.com/1"),
        ];
        let kept = dedup(offers);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].job_title, "Rust Engineer");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let offers = vec![
            offer("Rust Engineer", "Acme", "https://a.example.com/1"),
            offer("Rust Engineer", "Acme", "https://b.example.com/2"),
        ];
        let kept = dedup(offers);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_url, "https://a.example.com/1");
    }

    #[test]
    fn test_near_identical_signatures_collapse() {
        // One character differs over a long signature, well above 0.9
        let offers = vec![
            offer("Senior Backend Engineer", "Acme Corporation", "https://a.example.com/1"),
            offer("Senior Backend Enginee", "Acme Corporation", "https://b.example.com/2"),
        ];
        assert_eq!(dedup(offers).len(), 1);
    }

    #[test]
    fn test_dissimilar_signatures_survive() {
        let offers = vec![
            offer("Rust Engineer", "Acme", "https://a.example.com/1"),
            offer("Product Designer", "Globex", "https://b.example.com/2"),
        ];
        assert_eq!(dedup(offers).len(), 2);
    }

    #[test]
    fn test_threshold_boundary() {
        // "aaaaaaaaaa|x" vs "aaaaaaaaaa|y": one edit over 12 chars,
        // similarity ≈ 0.917 >= 0.9 → duplicate
        let offers = vec![
            offer("aaaaaaaaaa", "x", "https://a.example.com/1"),
            offer("aaaaaaaaaa", "y", "https://b.example.com/2"),
        ];
        assert_eq!(dedup(offers).len(), 1);

        // "aaaa|x" vs "aaaa|y": one edit over 6 chars, ≈ 0.833 < 0.9 → both kept
        let offers = vec![
            offer("aaaa", "x", "https://a.example.com/1"),
            offer("aaaa", "y", "https://b.example.com/2"),
        ];
        assert_eq!(dedup(offers).len(), 2);
    }

    #[test]
    fn test_idempotence() {
        let offers = vec![
            offer("Rust Engineer", "Acme", "https://a.example.com/1"),
            offer("Rust Engineer", "Acme", "https://b.example.com/2"),
            offer("Product Designer", "Globex", "https://c.example.com/3"),
        ];
        let once = dedup(offers);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedup(Vec::new()).is_empty());
    }
}
