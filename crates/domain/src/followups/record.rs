use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Follow-up visit status
///
/// Canonical wire form is SCREAMING_SNAKE_CASE; the aliases absorb the
/// mixed-case spellings still emitted by older frontend builds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum FollowUpStatus {
    /// Initial state - visit is scheduled
    #[serde(rename = "PENDING", alias = "Pending", alias = "pending")]
    Pending,
    /// Patient attended the visit (terminal)
    #[serde(rename = "COMPLETED", alias = "Completed", alias = "completed")]
    Completed,
    /// Patient did not show up (terminal)
    #[serde(rename = "MISSED", alias = "Missed", alias = "missed")]
    Missed,
    /// Visit cancelled by the clinic or patient (terminal)
    #[serde(rename = "CANCELLED", alias = "Cancelled", alias = "cancelled")]
    Cancelled,
}

impl Default for FollowUpStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl FollowUpStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Missed => "MISSED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FollowUpStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "MISSED" => Ok(Self::Missed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(Error::InvalidInput {
                field: "status".to_string(),
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// Outcome of the last reminder dispatch attempt
///
/// The legacy backend used "PENDING" for not-yet-sent; accepted here as an
/// alias during migration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum ReminderStatus {
    #[serde(rename = "NOT_SENT", alias = "NotSent", alias = "PENDING")]
    NotSent,
    #[serde(rename = "SENT", alias = "Sent")]
    Sent,
    #[serde(rename = "FAILED", alias = "Failed")]
    Failed,
}

impl Default for ReminderStatus {
    fn default() -> Self {
        Self::NotSent
    }
}

pub const ENTITY: &str = "FollowUp";

/// A scheduled patient visit
///
/// `patient_name` and `patient_phone` are denormalized onto the record by
/// the store so reminder dispatch needs no second lookup.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    pub follow_up_date: DateTime<Utc>,
    pub reason: String,
    pub status: FollowUpStatus,
    pub reminder_status: ReminderStatus,
    #[serde(default)]
    pub reminder_error: Option<String>,
    #[serde(default)]
    pub reminder_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FollowUp {
    /// Transitioning to the current status is an idempotent no-op; any
    /// other transition out of a terminal status is rejected.
    pub fn validate_transition(&self, target: FollowUpStatus) -> Result<(), Error> {
        if self.status == target {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }

    /// Full-record edits are permitted only while `Pending`; rescheduling a
    /// terminal follow-up means creating a new one.
    pub fn validate_editable(&self) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: self.status,
            });
        }
        Ok(())
    }

    pub fn validate_remindable(&self) -> Result<(), Error> {
        if self.status.is_terminal() {
            return Err(Error::InvalidState {
                message: format!("cannot send a reminder for a {} follow-up", self.status),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(status: FollowUpStatus) -> FollowUp {
        FollowUp {
            id: "01J00000000000000000000000".to_string(),
            patient_id: "p-1".to_string(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn pending_can_reach_every_terminal_status() {
        let record = record_with(FollowUpStatus::Pending);
        for target in [
            FollowUpStatus::Completed,
            FollowUpStatus::Missed,
            FollowUpStatus::Cancelled,
        ] {
            assert!(record.validate_transition(target).is_ok());
        }
    }

    #[test]
    fn terminal_statuses_reject_different_targets() {
        for from in [
            FollowUpStatus::Completed,
            FollowUpStatus::Missed,
            FollowUpStatus::Cancelled,
        ] {
            let record = record_with(from);
            let err = record
                .validate_transition(FollowUpStatus::Pending)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
        }
    }

    #[test]
    fn same_status_transition_is_a_no_op() {
        let record = record_with(FollowUpStatus::Completed);
        assert!(record
            .validate_transition(FollowUpStatus::Completed)
            .is_ok());
    }

    #[test]
    fn terminal_records_are_not_editable() {
        assert!(record_with(FollowUpStatus::Pending).validate_editable().is_ok());
        assert!(record_with(FollowUpStatus::Cancelled)
            .validate_editable()
            .is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "completed".parse::<FollowUpStatus>().unwrap(),
            FollowUpStatus::Completed
        );
        assert_eq!(
            "PENDING".parse::<FollowUpStatus>().unwrap(),
            FollowUpStatus::Pending
        );
        assert!("archived".parse::<FollowUpStatus>().is_err());
    }

    #[test]
    fn status_serializes_in_canonical_casing() {
        let json = serde_json::to_string(&FollowUpStatus::Missed).unwrap();
        assert_eq!(json, r#""MISSED""#);
        // Legacy frontend casing deserializes too.
        let status: FollowUpStatus = serde_json::from_str(r#""Missed""#).unwrap();
        assert_eq!(status, FollowUpStatus::Missed);
        let reminder: ReminderStatus = serde_json::from_str(r#""PENDING""#).unwrap();
        assert_eq!(reminder, ReminderStatus::NotSent);
    }
}
