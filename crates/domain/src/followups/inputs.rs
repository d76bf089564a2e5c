use serde::{Deserialize, Serialize};

use super::record::FollowUpStatus;

/// Raw scheduling submission. The date stays a string until the validator
/// parses it, so an unparseable value surfaces as a field-level error
/// instead of a body rejection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFollowUpInput {
    pub patient_id: String,
    #[serde(default)]
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFollowUpInput {
    #[serde(default)]
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Optional direct status override, valid only while the record is
    /// still `Pending`.
    #[serde(default)]
    pub status: Option<FollowUpStatus>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkReminderInput {
    pub ids: Vec<String>,
}
