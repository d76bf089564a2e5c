use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use derive_new::new;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::Error;

/// A rendered reminder ready for dispatch.
#[derive(Clone, Debug, new)]
pub struct ReminderMessage {
    pub follow_up_id: String,
    pub to_phone: String,
    pub body: String,
}

#[derive(Clone, Debug, Default)]
pub struct DispatchReceipt {
    pub provider_message_id: Option<String>,
}

#[derive(Error, Debug)]
#[error("{detail}")]
pub struct DispatchError {
    pub detail: String,
}

impl DispatchError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// External notification collaborator. One call, one send attempt; retries
/// are always the caller's decision.
#[async_trait]
pub trait ReminderDispatcher: Send + Sync {
    async fn send(&self, message: &ReminderMessage) -> Result<DispatchReceipt, DispatchError>;
}

/// Renders the patient-facing reminder body. Dates are shown in clinic
/// local time.
pub fn render_reminder(
    patient_name: &str,
    follow_up_date: DateTime<Utc>,
    clinic_name: &str,
    reason: &str,
) -> String {
    let formatted_date = follow_up_date
        .with_timezone(&Local)
        .format("%d %b %Y at %I:%M %p");
    let reason = if reason.trim().is_empty() {
        "General checkup"
    } else {
        reason.trim()
    };

    format!(
        "Hello {patient_name}, this is a reminder for your follow-up appointment on \
         {formatted_date} at {clinic_name}. Reason: {reason}. \
         Please contact us if you need to reschedule."
    )
}

/// Destination numbers must carry a country code; the gateway rejects
/// anything else after the send, so fail fast here.
pub fn validate_phone(phone: &str) -> Result<(), DispatchError> {
    if !phone.starts_with('+') {
        return Err(DispatchError::new(
            "invalid phone number format, must include country code (+)",
        ));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDispatchRequest<'a> {
    to: String,
    from: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDispatchResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

/// WhatsApp gateway client (Twilio-style number addressing).
pub struct WhatsAppDispatcher {
    client: reqwest::Client,
    gateway_url: String,
    from_number: String,
    enabled: bool,
}

impl WhatsAppDispatcher {
    pub fn new(
        gateway_url: impl Into<String>,
        from_number: impl Into<String>,
        enabled: bool,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::DispatchFailed {
                detail: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            from_number: from_number.into(),
            enabled,
        })
    }
}

#[async_trait]
impl ReminderDispatcher for WhatsAppDispatcher {
    async fn send(&self, message: &ReminderMessage) -> Result<DispatchReceipt, DispatchError> {
        if !self.enabled {
            tracing::warn!("WhatsApp reminders are disabled in configuration");
            return Err(DispatchError::new(
                "WhatsApp reminders are disabled in configuration",
            ));
        }

        validate_phone(&message.to_phone)?;

        let request = WireDispatchRequest {
            to: format!("whatsapp:{}", message.to_phone),
            from: &self.from_number,
            body: &message.body,
        };

        tracing::info!(
            follow_up_id = %message.follow_up_id,
            to = %request.to,
            "sending WhatsApp reminder"
        );

        let response = self
            .client
            .post(format!("{}/messages", self.gateway_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DispatchError::new(format!("gateway request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::new(format!(
                "gateway returned {status}: {body}"
            )));
        }

        let outcome: WireDispatchResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::new(format!("invalid gateway response: {e}")))?;

        if !outcome.ok {
            return Err(DispatchError::new(
                outcome
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "gateway reported failure without detail".to_string()),
            ));
        }

        tracing::info!(
            follow_up_id = %message.follow_up_id,
            message_id = outcome.message_id.as_deref().unwrap_or("-"),
            "WhatsApp reminder accepted by gateway"
        );

        Ok(DispatchReceipt {
            provider_message_id: outcome.message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reminder_body_includes_patient_clinic_and_reason() {
        let date = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let body = render_reminder("Asha Rao", date, "Sunrise Clinic", "Blood pressure review");
        assert!(body.starts_with("Hello Asha Rao,"));
        assert!(body.contains("Sunrise Clinic"));
        assert!(body.contains("Reason: Blood pressure review."));
        assert!(body.ends_with("reschedule."));
    }

    #[test]
    fn blank_reason_falls_back_to_general_checkup() {
        let date = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let body = render_reminder("Asha Rao", date, "Sunrise Clinic", "   ");
        assert!(body.contains("Reason: General checkup."));
    }

    #[test]
    fn phone_numbers_need_a_country_code() {
        assert!(validate_phone("+911234567890").is_ok());
        let err = validate_phone("9912345678").unwrap_err();
        assert!(err.detail.contains("country code"));
    }
}
