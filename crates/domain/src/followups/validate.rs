use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crate::errors::Error;

/// Scheduling fields that passed validation.
#[derive(Clone, Debug)]
pub struct ScheduleFields {
    pub follow_up_date: DateTime<Utc>,
    pub reason: String,
}

/// Accepts RFC 3339 or the zone-less `datetime-local` format the clinic
/// frontend submits; zone-less values are read as clinic local time.
pub fn parse_follow_up_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            if let Some(local) = naive.and_local_timezone(Local).earliest() {
                return Some(local.with_timezone(&Utc));
            }
        }
    }
    None
}

/// Submit-time scheduling validation, first failure wins.
///
/// `now` is the caller's clock at the moment of submission, never the time
/// the form was opened: a long-idle form must not sneak a now-past date
/// through.
pub fn validate_schedule(
    now: DateTime<Utc>,
    follow_up_date: Option<&str>,
    reason: Option<&str>,
) -> Result<ScheduleFields, Error> {
    let raw_date = follow_up_date
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidInput {
            field: "followUpDate".to_string(),
            message: "follow-up date and time is required".to_string(),
        })?;

    let follow_up_date = parse_follow_up_date(raw_date).ok_or_else(|| Error::InvalidInput {
        field: "followUpDate".to_string(),
        message: format!("'{raw_date}' is not a valid date-time"),
    })?;

    if follow_up_date <= now {
        return Err(Error::SchedulingConflict {
            message: "follow-up date must be in the future".to_string(),
        });
    }

    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.is_empty() {
        return Err(Error::InvalidInput {
            field: "reason".to_string(),
            message: "reason is required".to_string(),
        });
    }

    Ok(ScheduleFields {
        follow_up_date,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 31, 9, 0, 0).unwrap()
    }

    fn rfc3339(date: DateTime<Utc>) -> String {
        date.to_rfc3339()
    }

    #[test]
    fn accepts_a_future_date_with_reason() {
        let date = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let fields =
            validate_schedule(now(), Some(&rfc3339(date)), Some("Checkup")).unwrap();
        assert_eq!(fields.follow_up_date, date);
        assert_eq!(fields.reason, "Checkup");
    }

    #[test]
    fn accepts_the_frontends_zoneless_format() {
        // datetime-local inputs submit without an offset.
        let parsed = parse_follow_up_date("2030-06-15T14:30").expect("parses");
        let local = parsed.with_timezone(&Local);
        assert_eq!(local.format("%Y-%m-%dT%H:%M").to_string(), "2030-06-15T14:30");
    }

    #[test]
    fn missing_date_is_invalid_input() {
        for raw in [None, Some(""), Some("  ")] {
            let err = validate_schedule(now(), raw, Some("Checkup")).unwrap_err();
            assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "followUpDate"));
        }
    }

    #[test]
    fn garbage_dates_are_invalid_input() {
        let err = validate_schedule(now(), Some("next tuesday"), Some("Checkup")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "followUpDate"));
    }

    #[test]
    fn past_and_present_dates_are_scheduling_conflicts() {
        for date in [now() - Duration::hours(1), now()] {
            let err =
                validate_schedule(now(), Some(&rfc3339(date)), Some("Checkup")).unwrap_err();
            assert!(matches!(err, Error::SchedulingConflict { .. }));
        }
    }

    #[test]
    fn one_second_into_the_future_is_enough() {
        let date = now() + Duration::seconds(1);
        assert!(validate_schedule(now(), Some(&rfc3339(date)), Some("Checkup")).is_ok());
    }

    #[test]
    fn blank_reason_is_invalid_input() {
        let date = rfc3339(now() + Duration::days(1));
        for reason in [None, Some(""), Some("   ")] {
            let err = validate_schedule(now(), Some(&date), reason).unwrap_err();
            assert!(matches!(err, Error::InvalidInput { ref field, .. } if field == "reason"));
        }
    }

    #[test]
    fn date_rules_win_over_reason_rules() {
        let err =
            validate_schedule(now(), Some(&rfc3339(now() - Duration::days(1))), None).unwrap_err();
        assert!(matches!(err, Error::SchedulingConflict { .. }));
    }

    #[test]
    fn reason_is_trimmed() {
        let date = rfc3339(now() + Duration::days(1));
        let fields = validate_schedule(now(), Some(&date), Some("  Blood pressure  ")).unwrap();
        assert_eq!(fields.reason, "Blood pressure");
    }
}
