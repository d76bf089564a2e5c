use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::record::{FollowUp, FollowUpStatus, ReminderStatus};

/// Listing filter; `to` is exclusive.
#[derive(Clone, Debug, Default)]
pub struct FollowUpFilter {
    pub patient_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One page of results, shaped like the backend's page JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_pages: u32,
    pub total_elements: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct NewFollowUp {
    pub patient_id: String,
    pub follow_up_date: DateTime<Utc>,
    pub reason: String,
    pub status: FollowUpStatus,
    pub reminder_status: ReminderStatus,
}

/// Full-record edit: date and reason, plus an optional status override.
#[derive(Clone, Debug, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpChanges {
    pub follow_up_date: DateTime<Utc>,
    pub reason: String,
    #[serde(default)]
    pub status: Option<FollowUpStatus>,
}

/// Persisted outcome of one dispatch attempt. `error` is `Some` exactly
/// when `status` is `Failed`.
#[derive(Clone, Debug, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct ReminderOutcome {
    pub status: ReminderStatus,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub provider_message_id: Option<String>,
}

/// Persistence boundary, owned by the clinic backend.
///
/// Listing methods return records ordered by `follow_up_date` ascending.
#[async_trait]
pub trait FollowUpStore: Send + Sync {
    async fn create(&self, new: NewFollowUp) -> Result<FollowUp, Error>;

    async fn get(&self, id: &str) -> Result<FollowUp, Error>;

    async fn list(
        &self,
        filter: FollowUpFilter,
        page: u32,
        size: u32,
    ) -> Result<Page<FollowUp>, Error>;

    /// Unpaged window query, `[from, to)`.
    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FollowUp>, Error>;

    async fn update_full(&self, id: &str, changes: FollowUpChanges) -> Result<FollowUp, Error>;

    async fn update_status(&self, id: &str, status: FollowUpStatus)
        -> Result<FollowUp, Error>;

    async fn record_reminder(
        &self,
        id: &str,
        outcome: ReminderOutcome,
    ) -> Result<FollowUp, Error>;

    async fn delete(&self, id: &str) -> Result<(), Error>;
}
