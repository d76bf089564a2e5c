use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::errors::Error;

use super::dispatch::{render_reminder, ReminderDispatcher, ReminderMessage};
use super::inputs::{ScheduleFollowUpInput, UpdateFollowUpInput};
use super::record::{FollowUp, FollowUpStatus, ReminderStatus};
use super::store::{
    FollowUpChanges, FollowUpFilter, FollowUpStore, NewFollowUp, Page, ReminderOutcome,
};
use super::validate::validate_schedule;

/// Per-id result of a bulk reminder send.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendOutcome {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
}

/// Follow-up workflow engine
///
/// Owns scheduling validation, the status state machine, reminder dispatch
/// orchestration and the read projections. The store and dispatcher are
/// external collaborators; every failure is returned typed, nothing is
/// retried here.
pub struct FollowUpEngine {
    store: Arc<dyn FollowUpStore>,
    dispatcher: Arc<dyn ReminderDispatcher>,
    clinic_name: String,
    dispatch_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the per-id dispatch slot on every exit path.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.id);
    }
}

fn lock<'a>(set: &'a Mutex<HashSet<String>>) -> MutexGuard<'a, HashSet<String>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl FollowUpEngine {
    pub fn new(
        store: Arc<dyn FollowUpStore>,
        dispatcher: Arc<dyn ReminderDispatcher>,
        clinic_name: impl Into<String>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clinic_name: clinic_name.into(),
            dispatch_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Validate and persist a new follow-up. Fresh records are always
    /// `Pending` with no reminder sent.
    pub async fn schedule(&self, input: ScheduleFollowUpInput) -> Result<FollowUp, Error> {
        let fields = validate_schedule(
            Utc::now(),
            input.follow_up_date.as_deref(),
            input.reason.as_deref(),
        )?;

        let new = NewFollowUp::new(
            input.patient_id,
            fields.follow_up_date,
            fields.reason,
            FollowUpStatus::Pending,
            ReminderStatus::NotSent,
        );

        let record = self.store.create(new).await.map_err(|e| match e {
            // A 404 on create means the referenced patient does not exist.
            Error::NotFound { .. } => Error::NotFound {
                entity: "Patient".to_string(),
            },
            Error::Store { message } => Error::SchedulingFailed { message },
            other => other,
        })?;

        tracing::info!(
            id = %record.id,
            patient_id = %record.patient_id,
            date = %record.follow_up_date,
            "follow-up scheduled"
        );
        Ok(record)
    }

    /// Full-record edit (date/reason/status together), `Pending` only.
    pub async fn update(&self, id: &str, input: UpdateFollowUpInput) -> Result<FollowUp, Error> {
        let record = self.store.get(id).await?;
        record.validate_editable()?;

        let fields = validate_schedule(
            Utc::now(),
            input.follow_up_date.as_deref(),
            input.reason.as_deref(),
        )?;

        let changes = FollowUpChanges::new(fields.follow_up_date, fields.reason, input.status);
        let updated = self.store.update_full(id, changes).await.map_err(|e| match e {
            Error::Store { message } => Error::SchedulingFailed { message },
            other => other,
        })?;

        tracing::info!(id, "follow-up updated");
        Ok(updated)
    }

    pub async fn get(&self, id: &str) -> Result<FollowUp, Error> {
        self.store.get(id).await
    }

    /// Move a follow-up along the state machine. Transitioning to the
    /// current status is an idempotent no-op.
    pub async fn transition_status(
        &self,
        id: &str,
        target: FollowUpStatus,
    ) -> Result<FollowUp, Error> {
        let record = self.store.get(id).await?;

        if let Err(err) = record.validate_transition(target) {
            tracing::warn!(
                id,
                from = %record.status,
                to = %target,
                "invalid status transition attempted"
            );
            return Err(err);
        }

        if record.status == target {
            return Ok(record);
        }

        let updated = self.store.update_status(id, target).await?;
        tracing::info!(id, status = %target, "follow-up status updated");
        Ok(updated)
    }

    /// Dispatch a reminder and record the outcome.
    ///
    /// At most one dispatch per follow-up is in flight at a time; a second
    /// concurrent call observes `DispatchInProgress` instead of queueing.
    /// An already-sent reminder is skipped unless `resend` is set.
    pub async fn send_reminder(&self, id: &str, resend: bool) -> Result<FollowUp, Error> {
        let _guard = self.begin_dispatch(id)?;

        let record = self.store.get(id).await?;
        record.validate_remindable()?;

        if record.reminder_status == ReminderStatus::Sent && !resend {
            tracing::info!(id, "reminder already sent, skipping dispatch");
            return Ok(record);
        }

        let Some(phone) = record.patient_phone.clone() else {
            return self
                .record_failure(id, "patient has no phone number on file".to_string())
                .await;
        };

        let patient_name = record.patient_name.as_deref().unwrap_or("patient");
        let body = render_reminder(
            patient_name,
            record.follow_up_date,
            &self.clinic_name,
            &record.reason,
        );
        let message = ReminderMessage::new(record.id.clone(), phone, body);

        match tokio::time::timeout(self.dispatch_timeout, self.dispatcher.send(&message)).await {
            Ok(Ok(receipt)) => {
                let outcome = ReminderOutcome::new(
                    ReminderStatus::Sent,
                    None,
                    Utc::now(),
                    receipt.provider_message_id,
                );
                let updated = self.store.record_reminder(id, outcome).await?;
                tracing::info!(id, "reminder sent");
                Ok(updated)
            }
            Ok(Err(err)) => self.record_failure(id, err.detail).await,
            Err(_) => {
                self.record_failure(
                    id,
                    format!(
                        "dispatch timed out after {}s",
                        self.dispatch_timeout.as_secs()
                    ),
                )
                .await
            }
        }
    }

    /// User-initiated batch send; individual failures never abort the batch.
    pub async fn send_bulk_reminders(&self, ids: &[String]) -> Vec<BulkSendOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut success = 0usize;
        let mut failed = 0usize;

        for id in ids {
            match self.send_reminder(id, false).await {
                Ok(record) => {
                    success += 1;
                    outcomes.push(BulkSendOutcome {
                        id: id.clone(),
                        ok: true,
                        error: None,
                        follow_up: Some(record),
                    });
                }
                Err(err) => {
                    failed += 1;
                    outcomes.push(BulkSendOutcome {
                        id: id.clone(),
                        ok: false,
                        error: Some(err.to_string()),
                        follow_up: None,
                    });
                }
            }
        }

        tracing::info!(success, failed, "bulk reminder send completed");
        outcomes
    }

    /// Today's agenda: every record in the current local calendar day,
    /// regardless of status, ascending.
    pub async fn today(&self) -> Result<Vec<FollowUp>, Error> {
        let (start, end) = local_day_window(Local::now());
        self.store.list_between(start, end).await
    }

    /// All upcoming follow-ups, paginated ascending. Status filtering is
    /// the presentation layer's concern.
    pub async fn upcoming(&self, page: u32, size: u32) -> Result<Page<FollowUp>, Error> {
        let filter = FollowUpFilter {
            from: Some(Utc::now()),
            ..Default::default()
        };
        self.store.list(filter, page, size).await
    }

    pub async fn by_patient(
        &self,
        patient_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Page<FollowUp>, Error> {
        let filter = FollowUpFilter {
            patient_id: Some(patient_id.to_string()),
            ..Default::default()
        };
        self.store.list(filter, page, size).await
    }

    /// `Pending` records in the next 24 hours whose reminder has not gone
    /// out yet.
    pub async fn due_for_reminder(&self) -> Result<Vec<FollowUp>, Error> {
        let now = Utc::now();
        let records = self
            .store
            .list_between(now, now + ChronoDuration::days(1))
            .await?;
        Ok(records
            .into_iter()
            .filter(|r| {
                r.status == FollowUpStatus::Pending && r.reminder_status != ReminderStatus::Sent
            })
            .collect())
    }

    /// Administrative pass-through; the workflow itself never deletes.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.store.delete(id).await?;
        tracing::info!(id, "follow-up deleted");
        Ok(())
    }

    fn begin_dispatch(&self, id: &str) -> Result<InFlightGuard<'_>, Error> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(id.to_string()) {
            return Err(Error::DispatchInProgress { id: id.to_string() });
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            id: id.to_string(),
        })
    }

    async fn record_failure(&self, id: &str, detail: String) -> Result<FollowUp, Error> {
        let detail = if detail.trim().is_empty() {
            "reminder dispatch failed".to_string()
        } else {
            detail
        };
        tracing::error!(id, detail = %detail, "reminder dispatch failed");

        let outcome =
            ReminderOutcome::new(ReminderStatus::Failed, Some(detail.clone()), Utc::now(), None);
        if let Err(err) = self.store.record_reminder(id, outcome).await {
            tracing::error!(id, error = %err, "failed to record reminder failure");
        }

        Err(Error::DispatchFailed { detail })
    }
}

/// `[local midnight, next local midnight)` in UTC. Falls back across DST
/// gaps where a local midnight does not exist.
fn local_day_window(now: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = now.date_naive();
    let start = local_midnight(day).unwrap_or(now);
    let end = day
        .succ_opt()
        .and_then(local_midnight)
        .unwrap_or(start + ChronoDuration::days(1));
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

fn local_midnight(day: NaiveDate) -> Option<DateTime<Local>> {
    day.and_time(NaiveTime::MIN).and_local_timezone(Local).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn day_window_spans_the_local_calendar_day() {
        let now = Local::now();
        let (start, end) = local_day_window(now);

        assert!(start <= now.with_timezone(&Utc));
        assert!(now.with_timezone(&Utc) < end);

        let local_start = start.with_timezone(&Local);
        assert_eq!(local_start.date_naive(), now.date_naive());
        assert_eq!(local_start.time().hour(), 0);
        assert_eq!(local_start.time().minute(), 0);
    }

    #[test]
    fn tomorrow_first_minute_is_outside_the_window() {
        let now = Local::now();
        let (_, end) = local_day_window(now);

        let tomorrow = now
            .date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 1, 0))
            .and_then(|dt| Local.from_local_datetime(&dt).earliest())
            .map(|dt| dt.with_timezone(&Utc));
        if let Some(tomorrow) = tomorrow {
            assert!(tomorrow >= end);
        }
    }
}
