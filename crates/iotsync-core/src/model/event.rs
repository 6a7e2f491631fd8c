// ── Live event types ──
//
// `InboundEvent` is the closed set of messages the backend pushes.
// `SyncEvent` is what the connection manager fans out: inbound events
// plus session-level signals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use super::device::{Device, DeviceStats, DeviceStatus};
use super::session::TransportTier;

/// A decoded push message. Delivered once to the registered handler and
/// the broadcast subscribers, never retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    DeviceStatusChanged {
        device_id: String,
        status: DeviceStatus,
        device_name: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    },
    DeviceCreated {
        device: Device,
    },
    DeviceDeleted {
        device_id: String,
        device_name: Option<String>,
    },
    StatsUpdated {
        stats: DeviceStats,
    },
}

/// Why a session stopped by itself. Never reported after `disconnect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SessionEnd {
    /// The server closed the live channel with a normal close code.
    ServerClosed,
    /// Live tiers failed and polling is disabled or has no source.
    Exhausted,
}

/// Everything a session can report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// `true` on every successful open, `false` on every close or failure.
    ConnectionStatus { connected: bool },
    Inbound(InboundEvent),
    /// The polled collection shrank; which devices went away is unknown.
    DevicesRemoved { previous: usize, current: usize },
    TransportChanged { tier: TransportTier },
    PollFailed { message: String },
    /// Terminal: nothing more arrives until the next `connect`.
    SessionEnded { reason: SessionEnd },
}
