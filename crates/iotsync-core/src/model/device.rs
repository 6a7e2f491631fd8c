// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Operational status reported by the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[non_exhaustive]
pub enum DeviceStatus {
    Online,
    Offline,
    Warning,
    Error,
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    /// Lenient parse: anything unrecognized becomes `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(Self::Unknown)
    }

    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// A managed IoT device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub status: DeviceStatus,
    pub location: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub organization_id: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Aggregate counters for one organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    pub warning: u64,
    pub error: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_leniently() {
        assert_eq!(DeviceStatus::from_wire("ONLINE"), DeviceStatus::Online);
        assert_eq!(DeviceStatus::from_wire("warning"), DeviceStatus::Warning);
        assert_eq!(DeviceStatus::from_wire("MAINTENANCE"), DeviceStatus::Unknown);
        assert_eq!(DeviceStatus::Offline.to_string(), "OFFLINE");
    }
}
