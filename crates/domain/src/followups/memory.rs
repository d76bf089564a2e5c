use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::errors::Error;

use super::record::{FollowUp, FollowUpStatus, ENTITY};
use super::store::{
    FollowUpChanges, FollowUpFilter, FollowUpStore, NewFollowUp, Page, ReminderOutcome,
};

#[derive(Clone, Debug)]
struct PatientContact {
    name: String,
    phone: Option<String>,
}

/// In-memory `FollowUpStore` for tests and local development.
///
/// Patients must be registered before follow-ups can reference them; the
/// backend performs the same existence check on create.
#[derive(Default)]
pub struct MemoryFollowUpStore {
    records: RwLock<HashMap<String, FollowUp>>,
    patients: RwLock<HashMap<String, PatientContact>>,
}

impl MemoryFollowUpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_patient(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        phone: Option<&str>,
    ) {
        self.patients.write().await.insert(
            id.into(),
            PatientContact {
                name: name.into(),
                phone: phone.map(str::to_string),
            },
        );
    }

    fn sorted(mut records: Vec<FollowUp>) -> Vec<FollowUp> {
        records.sort_by_key(|r| (r.follow_up_date, r.id.clone()));
        records
    }

    fn matches(record: &FollowUp, filter: &FollowUpFilter) -> bool {
        if let Some(patient_id) = &filter.patient_id {
            if &record.patient_id != patient_id {
                return false;
            }
        }
        if let Some(from) = filter.from {
            if record.follow_up_date < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if record.follow_up_date >= to {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl FollowUpStore for MemoryFollowUpStore {
    async fn create(&self, new: NewFollowUp) -> Result<FollowUp, Error> {
        let contact = self
            .patients
            .read()
            .await
            .get(&new.patient_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: "Patient".to_string(),
            })?;

        let now = Utc::now();
        let record = FollowUp {
            id: Ulid::new().to_string(),
            patient_id: new.patient_id,
            patient_name: Some(contact.name),
            patient_phone: contact.phone,
            follow_up_date: new.follow_up_date,
            reason: new.reason,
            status: new.status,
            reminder_status: new.reminder_status,
            reminder_error: None,
            reminder_sent_at: None,
            provider_message_id: None,
            created_at: now,
            updated_at: now,
        };

        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<FollowUp, Error> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: ENTITY.to_string(),
            })
    }

    async fn list(
        &self,
        filter: FollowUpFilter,
        page: u32,
        size: u32,
    ) -> Result<Page<FollowUp>, Error> {
        let records = self.records.read().await;
        let matching = Self::sorted(
            records
                .values()
                .filter(|r| Self::matches(r, &filter))
                .cloned()
                .collect(),
        );

        let size = size.max(1) as usize;
        let total_elements = matching.len() as u64;
        let total_pages = matching.len().div_ceil(size) as u32;
        let content = matching
            .into_iter()
            .skip(page as usize * size)
            .take(size)
            .collect();

        Ok(Page {
            content,
            total_pages,
            total_elements,
        })
    }

    async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FollowUp>, Error> {
        let records = self.records.read().await;
        Ok(Self::sorted(
            records
                .values()
                .filter(|r| r.follow_up_date >= from && r.follow_up_date < to)
                .cloned()
                .collect(),
        ))
    }

    async fn update_full(&self, id: &str, changes: FollowUpChanges) -> Result<FollowUp, Error> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| Error::NotFound {
            entity: ENTITY.to_string(),
        })?;

        if record.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: record.status,
                to: record.status,
            });
        }

        record.follow_up_date = changes.follow_up_date;
        record.reason = changes.reason;
        if let Some(status) = changes.status {
            record.status = status;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn update_status(
        &self,
        id: &str,
        status: FollowUpStatus,
    ) -> Result<FollowUp, Error> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| Error::NotFound {
            entity: ENTITY.to_string(),
        })?;

        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn record_reminder(
        &self,
        id: &str,
        outcome: ReminderOutcome,
    ) -> Result<FollowUp, Error> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| Error::NotFound {
            entity: ENTITY.to_string(),
        })?;

        record.reminder_status = outcome.status;
        record.reminder_error = outcome.error;
        record.reminder_sent_at = Some(outcome.sent_at);
        record.provider_message_id = outcome.provider_message_id;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let mut records = self.records.write().await;
        records.remove(id).ok_or_else(|| Error::NotFound {
            entity: ENTITY.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::followups::record::ReminderStatus;

    fn new_follow_up(patient_id: &str, offset_hours: i64) -> NewFollowUp {
        NewFollowUp::new(
            patient_id.to_string(),
            Utc::now() + Duration::hours(offset_hours),
            "Checkup".to_string(),
            FollowUpStatus::Pending,
            ReminderStatus::NotSent,
        )
    }

    #[tokio::test]
    async fn create_rejects_unknown_patients() {
        let store = MemoryFollowUpStore::new();
        let err = store.create(new_follow_up("nobody", 24)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref entity } if entity == "Patient"));
    }

    #[tokio::test]
    async fn list_filters_and_paginates_in_date_order() {
        let store = MemoryFollowUpStore::new();
        store.register_patient("p-1", "Asha Rao", Some("+911234567890")).await;
        store.register_patient("p-2", "Vikram Shah", None).await;

        for offset in [72, 24, 48] {
            store.create(new_follow_up("p-1", offset)).await.unwrap();
        }
        store.create(new_follow_up("p-2", 36)).await.unwrap();

        let filter = FollowUpFilter {
            patient_id: Some("p-1".to_string()),
            ..Default::default()
        };
        let page = store.list(filter, 0, 2).await.unwrap();
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.content.len(), 2);
        assert!(page.content[0].follow_up_date <= page.content[1].follow_up_date);
    }

    #[tokio::test]
    async fn list_between_is_half_open() {
        let store = MemoryFollowUpStore::new();
        store.register_patient("p-1", "Asha Rao", None).await;

        let inside = store.create(new_follow_up("p-1", 12)).await.unwrap();
        store.create(new_follow_up("p-1", 80)).await.unwrap();

        let from = Utc::now();
        let to = from + Duration::hours(24);
        let window = store.list_between(from, to).await.unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, inside.id);
    }
}
