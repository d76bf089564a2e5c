use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::errors::Error;

use super::record::{FollowUp, FollowUpStatus, ENTITY};
use super::store::{
    FollowUpChanges, FollowUpFilter, FollowUpStore, NewFollowUp, Page, ReminderOutcome,
};

/// `FollowUpStore` backed by the clinic backend's REST API.
pub struct HttpFollowUpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFollowUpStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Store {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/follow-ups{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        let response = Self::check(response).await?;
        response.json().await.map_err(|e| Error::Store {
            message: format!("invalid store response: {e}"),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound {
                entity: ENTITY.to_string(),
            }),
            // The backend enforces Pending-only edits too; its rejection can
            // race past the engine's own pre-check.
            StatusCode::CONFLICT => Err(Error::InvalidState {
                message: if body.trim().is_empty() {
                    "store rejected the update for the record's current status".to_string()
                } else {
                    body
                },
            }),
            _ => Err(Error::Store {
                message: format!("store returned {status}: {body}"),
            }),
        }
    }

    fn transport(e: reqwest::Error) -> Error {
        Error::Store {
            message: format!("store request failed: {e}"),
        }
    }
}

#[async_trait]
impl FollowUpStore for HttpFollowUpStore {
    async fn create(&self, new: NewFollowUp) -> Result<FollowUp, Error> {
        let response = self
            .client
            .post(self.url(""))
            .json(&new)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn get(&self, id: &str) -> Result<FollowUp, Error> {
        let response = self
            .client
            .get(self.url(&format!("/{id}")))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn list(
        &self,
        filter: FollowUpFilter,
        page: u32,
        size: u32,
    ) -> Result<Page<FollowUp>, Error> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("size", size.to_string()),
            ("sort", "followUpDate,asc".to_string()),
        ];
        if let Some(patient_id) = &filter.patient_id {
            query.push(("patientId", patient_id.clone()));
        }
        if let Some(from) = filter.from {
            query.push(("from", from.to_rfc3339()));
        }
        if let Some(to) = filter.to {
            query.push(("to", to.to_rfc3339()));
        }

        let response = self
            .client
            .get(self.url(""))
            .query(&query)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FollowUp>, Error> {
        let response = self
            .client
            .get(self.url("/between"))
            .query(&[("start", from.to_rfc3339()), ("end", to.to_rfc3339())])
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn update_full(&self, id: &str, changes: FollowUpChanges) -> Result<FollowUp, Error> {
        let response = self
            .client
            .put(self.url(&format!("/{id}")))
            .json(&changes)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: FollowUpStatus,
    ) -> Result<FollowUp, Error> {
        let response = self
            .client
            .put(self.url(&format!("/{id}/status")))
            .query(&[("status", status.as_str())])
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn record_reminder(
        &self,
        id: &str,
        outcome: ReminderOutcome,
    ) -> Result<FollowUp, Error> {
        let response = self
            .client
            .put(self.url(&format!("/{id}/reminder")))
            .json(&outcome)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::decode(response).await
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let response = self
            .client
            .delete(self.url(&format!("/{id}")))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body.to_string())
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn backend_404_maps_to_not_found() {
        let err = HttpFollowUpStore::check(response(404, "")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref entity } if entity == ENTITY));
    }

    #[tokio::test]
    async fn backend_409_maps_to_a_state_conflict() {
        let err = HttpFollowUpStore::check(response(409, "pending-only update rejected"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::InvalidState { ref message } if message.contains("pending-only"))
        );
    }

    #[tokio::test]
    async fn backend_409_without_detail_gets_a_generic_message() {
        let err = HttpFollowUpStore::check(response(409, "  ")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { ref message } if !message.trim().is_empty()));
    }

    #[tokio::test]
    async fn other_backend_failures_map_to_store() {
        let err = HttpFollowUpStore::check(response(500, "boom")).await.unwrap_err();
        assert!(matches!(err, Error::Store { ref message } if message.contains("500")));
    }
}
