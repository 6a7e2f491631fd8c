// ── API-to-domain type conversions ──
//
// Bridges raw `iotsync_api` wire types into canonical `iotsync_core::model`
// domain types. Each `From` impl normalizes field names, parses strings
// into strong types, and fills defaults for missing optional data.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use iotsync_api::models::{
    DeviceRecord, DeviceStatsRecord, NotificationRecord, ProgressRecord, StepDetailsRecord,
};

use crate::error::CoreError;
use crate::model::{
    Device, DeviceStats, DeviceStatus, InboundEvent, Notification, NotificationKind,
    OnboardingResult, OnboardingStage, PdfSummary, ProgressEvent, StepDetails, StepStatus,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse an RFC 3339 timestamp, or a zone-less ISO-8601 one taken as UTC
/// (the backend serializes `LocalDateTime` without an offset).
pub(crate) fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn datetime_value(value: Option<&Value>) -> Option<DateTime<Utc>> {
    parse_datetime(value.and_then(Value::as_str))
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Devices ────────────────────────────────────────────────────────

impl From<DeviceRecord> for Device {
    fn from(r: DeviceRecord) -> Self {
        Self {
            status: r
                .status
                .as_deref()
                .map_or(DeviceStatus::Unknown, DeviceStatus::from_wire),
            last_seen: parse_datetime(r.last_seen.as_deref()),
            updated_at: parse_datetime(r.updated_at.as_deref()),
            id: r.id,
            name: r.name,
            location: r.location,
            manufacturer: r.manufacturer,
            model: r.model,
            organization_id: r.organization_id,
        }
    }
}

impl From<DeviceStatsRecord> for DeviceStats {
    fn from(r: DeviceStatsRecord) -> Self {
        Self {
            total: r.total,
            online: r.online,
            offline: r.offline,
            warning: r.warning,
            error: r.error,
        }
    }
}

// ── Notifications ──────────────────────────────────────────────────

impl From<NotificationRecord> for Notification {
    fn from(r: NotificationRecord) -> Self {
        Self {
            kind: r
                .kind
                .as_deref()
                .and_then(|k| k.parse().ok())
                .unwrap_or(NotificationKind::Info),
            created_at: parse_datetime(r.created_at.as_deref()),
            id: r.id,
            title: r.title,
            message: r.message,
            read: r.read,
            device_id: r.device_id,
            rule_id: r.rule_id,
        }
    }
}

// ── Live messages ──────────────────────────────────────────────────

/// Push payloads, discriminated by their `type` field.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    #[serde(rename = "DEVICE_STATUS_UPDATE", rename_all = "camelCase")]
    StatusUpdate {
        device_id: String,
        status: String,
        #[serde(default)]
        device_name: Option<String>,
        #[serde(default)]
        updated_at: Option<Value>,
    },
    #[serde(rename = "DEVICE_CREATED")]
    Created { device: DeviceRecord },
    #[serde(rename = "DEVICE_DELETED", rename_all = "camelCase")]
    Deleted {
        device_id: String,
        #[serde(default)]
        device_name: Option<String>,
    },
    #[serde(rename = "DEVICE_STATS_UPDATE")]
    Stats { stats: DeviceStatsRecord },
    #[serde(other)]
    Unknown,
}

/// Decode a push payload. Unknown discriminators and malformed payloads
/// are logged and dropped.
pub fn inbound_event(kind: &str, payload: &Value) -> Option<InboundEvent> {
    let wire = match WireMessage::deserialize(payload) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::warn!(kind, error = %e, "dropping malformed push message");
            return None;
        }
    };

    match wire {
        WireMessage::StatusUpdate {
            device_id,
            status,
            device_name,
            updated_at,
        } => Some(InboundEvent::DeviceStatusChanged {
            device_id,
            status: DeviceStatus::from_wire(&status),
            device_name,
            updated_at: datetime_value(updated_at.as_ref()),
        }),
        WireMessage::Created { device } => Some(InboundEvent::DeviceCreated {
            device: device.into(),
        }),
        WireMessage::Deleted {
            device_id,
            device_name,
        } => Some(InboundEvent::DeviceDeleted {
            device_id,
            device_name,
        }),
        WireMessage::Stats { stats } => Some(InboundEvent::StatsUpdated {
            stats: stats.into(),
        }),
        WireMessage::Unknown => {
            tracing::warn!(kind, "dropping push message of unknown type");
            None
        }
    }
}

// ── Onboarding ─────────────────────────────────────────────────────

impl From<StepDetailsRecord> for StepDetails {
    fn from(r: StepDetailsRecord) -> Self {
        Self {
            current_step: r.current_step,
            total_steps: r.total_steps,
            status: r.status.parse().unwrap_or(StepStatus::Unknown),
            start_time: parse_datetime(r.start_time.as_deref()),
            end_time: parse_datetime(r.end_time.as_deref()),
            duration: r.duration.map(Duration::from_millis),
            step_name: r.step_name,
        }
    }
}

impl From<ProgressRecord> for ProgressEvent {
    fn from(r: ProgressRecord) -> Self {
        let progress_percent = if r.progress.is_finite() {
            r.progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            stage: OnboardingStage::from_wire(&r.stage),
            progress_percent,
            timestamp: parse_datetime(r.timestamp.as_deref()).unwrap_or_else(Utc::now),
            step_details: r.step_details.map(Into::into),
            message: r.message,
            sub_message: r.sub_message,
            error: r.error,
            retryable: r.retryable,
        }
    }
}

impl OnboardingResult {
    /// Normalize either response shape: a bare device object, or a
    /// `{device, pdfData}` wrapper.
    pub fn from_response(raw: Value) -> Result<Self, CoreError> {
        let device = raw.get("device").filter(|d| d.is_object()).unwrap_or(&raw);

        let device_id = id_string(device.get("id")).ok_or_else(|| CoreError::InvalidResponse {
            message: "onboarding result has no device id".into(),
        })?;
        let device_name = device
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let pdf = raw
            .get("pdfData")
            .filter(|p| p.is_object())
            .map(|p| PdfSummary::deserialize(p))
            .transpose()
            .map_err(|e| CoreError::InvalidResponse {
                message: format!("pdfData: {e}"),
            })?;

        Ok(Self {
            device_id,
            device_name,
            pdf,
            raw,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_status_update() {
        let payload = json!({
            "type": "DEVICE_STATUS_UPDATE",
            "deviceId": "d1",
            "status": "OFFLINE",
            "deviceName": "Pump 1",
            "organizationId": "org-1",
            "updatedAt": "2026-03-01T10:15:00"
        });
        let event = inbound_event("DEVICE_STATUS_UPDATE", &payload).unwrap();
        match event {
            InboundEvent::DeviceStatusChanged {
                device_id,
                status,
                device_name,
                updated_at,
            } => {
                assert_eq!(device_id, "d1");
                assert_eq!(status, DeviceStatus::Offline);
                assert_eq!(device_name.as_deref(), Some("Pump 1"));
                assert!(updated_at.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_created_and_stats() {
        let created = json!({
            "type": "DEVICE_CREATED",
            "device": { "id": "d9", "name": "Chiller", "status": "ONLINE" }
        });
        let Some(InboundEvent::DeviceCreated { device }) = inbound_event("DEVICE_CREATED", &created)
        else {
            panic!("expected DeviceCreated");
        };
        assert_eq!(device.status, DeviceStatus::Online);

        let stats = json!({
            "type": "DEVICE_STATS_UPDATE",
            "organizationId": "org-1",
            "stats": { "total": 3, "online": 2, "offline": 1, "warning": 0, "error": 0 }
        });
        let Some(InboundEvent::StatsUpdated { stats }) =
            inbound_event("DEVICE_STATS_UPDATE", &stats)
        else {
            panic!("expected StatsUpdated");
        };
        assert_eq!(stats.online, 2);
    }

    #[test]
    fn unknown_type_is_dropped() {
        let payload = json!({ "type": "FIRMWARE_ROLLOUT", "deviceId": "d1" });
        assert!(inbound_event("FIRMWARE_ROLLOUT", &payload).is_none());
    }

    #[test]
    fn malformed_known_type_is_dropped() {
        let payload = json!({ "type": "DEVICE_DELETED" });
        assert!(inbound_event("DEVICE_DELETED", &payload).is_none());
    }

    #[test]
    fn progress_is_clamped_and_staged() {
        let record: ProgressRecord = serde_json::from_value(json!({
            "stage": "knowledge",
            "progress": 140,
            "message": "Indexing"
        }))
        .unwrap();
        let event = ProgressEvent::from(record);
        assert_eq!(event.stage, OnboardingStage::Other("knowledge".into()));
        assert!((event.progress_percent - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn onboarding_result_from_wrapper() {
        let result = OnboardingResult::from_response(json!({
            "device": { "id": "d9", "name": "Pump 7" },
            "pdfData": {
                "pdfName": "pump7.pdf",
                "originalFileName": "Pump 7 Manual.pdf",
                "rulesGenerated": 4,
                "maintenanceItems": 2,
                "safetyPrecautions": 5
            }
        }))
        .unwrap();
        assert_eq!(result.device_id, "d9");
        assert_eq!(result.device_name, "Pump 7");
        let pdf = result.pdf.unwrap();
        assert_eq!(pdf.rules_generated, 4);
        assert_eq!(pdf.safety_precautions, 5);
    }

    #[test]
    fn onboarding_result_from_bare_device() {
        let result = OnboardingResult::from_response(json!({ "id": 42, "name": "Fan" })).unwrap();
        assert_eq!(result.device_id, "42");
        assert!(result.pdf.is_none());
    }

    #[test]
    fn onboarding_result_without_id_is_invalid() {
        let err = OnboardingResult::from_response(json!({ "ok": true })).unwrap_err();
        assert!(matches!(err, CoreError::InvalidResponse { .. }));
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let dt = parse_datetime(Some("2026-03-01T10:15:00.123")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T10:15:00.123+00:00");
    }
}
