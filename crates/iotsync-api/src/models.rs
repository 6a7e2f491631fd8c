// Wire types for the backend's REST and streaming payloads.
//
// These mirror the JSON exactly (camelCase, optional fields as sent).
// Unknown fields are kept in `extra` so nothing the backend adds later is
// lost on the way to the domain layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A device as returned by `GET /api/devices` and embedded in
/// `DEVICE_CREATED` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Aggregate counts from `GET /api/devices/stats` and `DEVICE_STATS_UPDATE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceStatsRecord {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    pub warning: u64,
    pub error: u64,
}

/// A notification from `GET /api/notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// `data:` payload of a `progress` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub stage: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub sub_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retryable: Option<bool>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub step_details: Option<StepDetailsRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDetailsRecord {
    pub current_step: u32,
    pub total_steps: u32,
    pub step_name: String,
    pub status: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
}

/// `data:` payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamErrorRecord {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retryable: Option<bool>,
}

impl StreamErrorRecord {
    /// Human-readable failure text, whichever field the server filled.
    pub fn text(&self) -> &str {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or("onboarding failed")
    }
}

/// Multipart body shared by the streaming and non-streaming onboarding
/// endpoints.
#[derive(Debug, Clone)]
pub struct OnboardingRequest {
    /// Sent as the `deviceData` text part.
    pub device_data: Value,
    pub manual: Option<OnboardingFile>,
    pub datasheet: Option<OnboardingFile>,
    pub certificate: Option<OnboardingFile>,
}

impl OnboardingRequest {
    pub fn new(device_data: Value) -> Self {
        Self {
            device_data,
            manual: None,
            datasheet: None,
            certificate: None,
        }
    }

    /// Build a fresh multipart form. Forms are single-use, so every
    /// attempt calls this again.
    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        let mut form = reqwest::multipart::Form::new()
            .text("deviceData", self.device_data.to_string());
        for (field, file) in [
            ("manualFile", &self.manual),
            ("datasheetFile", &self.datasheet),
            ("certificateFile", &self.certificate),
        ] {
            if let Some(file) = file {
                form = form.part(field, file.to_part()?);
            }
        }
        Ok(form)
    }
}

/// One attached document.
#[derive(Debug, Clone)]
pub struct OnboardingFile {
    pub file_name: String,
    pub bytes: Bytes,
    pub mime: String,
}

impl OnboardingFile {
    pub fn pdf(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime: "application/pdf".into(),
        }
    }

    fn to_part(&self) -> Result<reqwest::multipart::Part, reqwest::Error> {
        reqwest::multipart::Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_keeps_unknown_fields() {
        let device: DeviceRecord = serde_json::from_value(json!({
            "id": "d1",
            "name": "Boiler",
            "status": "ONLINE",
            "organizationId": "org-1",
            "firmware": "2.1.0"
        }))
        .unwrap();
        assert_eq!(device.status.as_deref(), Some("ONLINE"));
        assert_eq!(device.organization_id.as_deref(), Some("org-1"));
        assert_eq!(device.extra["firmware"], "2.1.0");
    }

    #[test]
    fn progress_record_with_step_details() {
        let record: ProgressRecord = serde_json::from_value(json!({
            "stage": "rules",
            "progress": 50,
            "message": "Generating rules",
            "stepDetails": {
                "currentStep": 3,
                "totalSteps": 6,
                "stepName": "Rules",
                "status": "processing"
            }
        }))
        .unwrap();
        assert!((record.progress - 50.0).abs() < f64::EPSILON);
        let steps = record.step_details.unwrap();
        assert_eq!(steps.current_step, 3);
        assert_eq!(steps.status, "processing");
    }

    #[test]
    fn stream_error_accepts_either_field_name() {
        let a: StreamErrorRecord = serde_json::from_value(json!({"message": "bad pdf"})).unwrap();
        let b: StreamErrorRecord = serde_json::from_value(json!({"error": "bad pdf"})).unwrap();
        assert_eq!(a.text(), "bad pdf");
        assert_eq!(a.text(), b.text());
    }
}
