//! User-submitted custom sources
//!
//! Users can point the engine at their own careers-page URLs. Every
//! submission is probed first: inaccessible URLs are rejected outright, and
//! `is_active` starts as the probe's `is_scrapable` verdict (manually
//! overridable afterwards). The analysis is stored with the source and not
//! re-run on reads.

use crate::probe::{AccessibilityAnalysis, AccessibilityProbe};
use crate::storage::{CustomSourceRecord, SqliteStorage, Storage};
use crate::{OfferflowError, Result};
use std::sync::{Arc, Mutex};

pub struct CustomSourceService {
    storage: Arc<Mutex<SqliteStorage>>,
    probe: AccessibilityProbe,
}

/// A created custom source together with its probe analysis
#[derive(Debug)]
pub struct CreatedCustomSource {
    pub record: CustomSourceRecord,
    pub analysis: AccessibilityAnalysis,
}

impl CustomSourceService {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, probe: AccessibilityProbe) -> Self {
        Self { storage, probe }
    }

    /// Probes and registers a custom source for a user
    ///
    /// Rejects duplicates (same user and URL) and URLs the probe reports as
    /// inaccessible.
    pub async fn add(&self, user_id: &str, name: &str, url: &str) -> Result<CreatedCustomSource> {
        {
            let storage = self.storage.lock().unwrap();
            if storage.custom_source_exists(user_id, url)? {
                return Err(OfferflowError::CustomSourceRejected(
                    "this URL was already added".to_string(),
                ));
            }
        }

        let analysis = self.probe.probe(url).await;

        if !analysis.is_accessible {
            return Err(OfferflowError::CustomSourceRejected(
                analysis.recommendation.clone(),
            ));
        }

        let analysis_json = serde_json::to_string(&analysis)?;
        let id = {
            let mut storage = self.storage.lock().unwrap();
            storage.insert_custom_source(
                user_id,
                name,
                url,
                analysis.content_type.as_str(),
                analysis.is_scrapable,
                Some(&analysis_json),
            )?
        };

        tracing::info!(
            user = user_id,
            url,
            active = analysis.is_scrapable,
            "custom source added"
        );

        let record = {
            let storage = self.storage.lock().unwrap();
            storage
                .list_custom_sources(user_id, false)?
                .into_iter()
                .find(|s| s.id == id)
                .ok_or(crate::storage::StorageError::EntityNotFound(id))?
        };

        Ok(CreatedCustomSource { record, analysis })
    }

    /// Lists a user's custom sources
    pub fn list(&self, user_id: &str, active_only: bool) -> Result<Vec<CustomSourceRecord>> {
        let storage = self.storage.lock().unwrap();
        Ok(storage.list_custom_sources(user_id, active_only)?)
    }

    /// Manually overrides the probe-derived active flag
    pub fn set_active(&self, user_id: &str, source_id: i64, active: bool) -> Result<bool> {
        let mut storage = self.storage.lock().unwrap();
        Ok(storage.set_custom_source_active(user_id, source_id, active)?)
    }

    /// Deletes a user's custom source
    pub fn delete(&self, user_id: &str, source_id: i64) -> Result<bool> {
        let mut storage = self.storage.lock().unwrap();
        Ok(storage.delete_custom_source(user_id, source_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> CustomSourceService {
        CustomSourceService::new(
            Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap())),
            AccessibilityProbe::new(Client::new()),
        )
    }

    async fn careers_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(
                        "<html><body><div class='job'><a href='/job/1'>Open position</a></div></body></html>",
                        "text/html",
                    ),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_add_scrapable_source_auto_activates() {
        let server = careers_server().await;
        let service = service();
        let url = format!("{}/careers", server.uri());

        let created = service.add("user-1", "Acme Careers", &url).await.unwrap();
        assert!(created.record.is_active);
        assert_eq!(created.record.source_type, "html");
        assert!(created.record.last_analysis.is_some());
        assert!(created.analysis.is_scrapable);
    }

    #[tokio::test]
    async fn test_duplicate_url_rejected() {
        let server = careers_server().await;
        let service = service();
        let url = format!("{}/careers", server.uri());

        service.add("user-1", "Acme", &url).await.unwrap();
        let result = service.add("user-1", "Acme again", &url).await;
        assert!(matches!(
            result,
            Err(OfferflowError::CustomSourceRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_inaccessible_url_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = service().add("user-1", "Broken", &server.uri()).await;
        assert!(matches!(
            result,
            Err(OfferflowError::CustomSourceRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_override_after_creation() {
        let server = careers_server().await;
        let service = service();
        let url = format!("{}/careers", server.uri());

        let created = service.add("user-1", "Acme", &url).await.unwrap();
        assert!(service
            .set_active("user-1", created.record.id, false)
            .unwrap());

        let listed = service.list("user-1", false).unwrap();
        assert!(!listed[0].is_active);
        assert!(service.list("user-1", true).unwrap().is_empty());
    }
}
