//! Embedding capability
//!
//! Compatibility scoring consumes an embedding service that lives outside
//! this crate. It is injected as a trait object at engine construction, so
//! nothing here knows whether vectors come from a local model or a remote
//! API.

use crate::normalize::NormalizedOffer;
use async_trait::async_trait;

/// Text embedding capability, provided by an external collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a text into a fixed-dimension vector
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Cosine similarity of two vectors, 0.0 for degenerate input
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// The text embedded for an offer when scoring against a profile
pub fn offer_scoring_text(offer: &NormalizedOffer) -> String {
    format!(
        "{} {} {}",
        offer.job_title,
        offer.company_name.as_deref().unwrap_or_default(),
        offer.description.as_deref().unwrap_or_default()
    )
}

/// Scores offers against a profile embedding and sorts them best-first
///
/// Offers whose embedding fails keep a zero score rather than failing the
/// search.
pub async fn rank_by_profile(
    embedder: &dyn Embedder,
    profile_text: &str,
    offers: &mut Vec<NormalizedOffer>,
) -> anyhow::Result<()> {
    let profile = embedder.embed(profile_text).await?;

    let mut scored: Vec<(f32, NormalizedOffer)> = Vec::with_capacity(offers.len());
    for offer in offers.drain(..) {
        let score = match embedder.embed(&offer_scoring_text(&offer)).await {
            Ok(vector) => cosine_similarity(&profile, &vector),
            Err(e) => {
                tracing::warn!(url = %offer.source_url, "offer embedding failed: {}", e);
                0.0
            }
        };
        scored.push((score, offer));
    }

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    offers.extend(scored.into_iter().map(|(_, offer)| offer));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Deterministic embedder for tests: counts occurrences of marker words
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(vec![
                lower.matches("rust").count() as f32,
                lower.matches("design").count() as f32,
                1.0,
            ])
        }
    }

    fn offer(title: &str, url: &str) -> NormalizedOffer {
        NormalizedOffer {
            job_title: title.to_string(),
            company_name: None,
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

    #[test]
    fn test_cosine_similarity_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_rank_by_profile_orders_best_first() {
        let mut offers = vec![
            offer("Product Designer", "https://a/1"),
            offer("Rust Engineer", "https://a/2"),
        ];

        rank_by_profile(&KeywordEmbedder, "rust developer", &mut offers)
            .await
            .unwrap();

        assert_eq!(offers[0].source_url, "https://a/2");
        assert_eq!(offers.len(), 2);
    }
}
