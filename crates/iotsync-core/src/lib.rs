//! Real-time sync and streaming-progress layer between `iotsync-api` and
//! consumers (CLI, dashboards).
//!
//! - **[`ConnectionManager`]** owns the single live session per tenant. It
//!   dials STOMP over WebSocket first, the raw JSON socket next, and
//!   degrades to [`PollingChannel`] once live tiers are exhausted.
//!   Abnormal closes reconnect with exponential [`Backoff`]; a normal close
//!   or [`disconnect()`](ConnectionManager::disconnect) does not.
//!
//! - **[`SyncHandler`]** receives typed callbacks; the same events are
//!   fanned out on a broadcast channel ([`ConnectionManager::events`]) and
//!   as a `Stream` ([`SyncEventStream`]).
//!
//! - **[`ProgressStreamController`]** runs one onboarding request over the
//!   chunked event stream and falls back to the non-streaming endpoint
//!   when the stream fails transiently.
//!
//! - **[`CacheStore`]** holds collections per tenant + user for a
//!   freshness window. [`DeviceFeed`] and [`NotificationFeed`] read
//!   through it; a device cache bound to the connection manager is patched
//!   by live events.

pub mod backoff;
pub mod channel;
pub mod config;
pub mod connection;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod model;
pub mod onboarding;
pub mod polling;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backoff::Backoff;
pub use channel::{Dialer, LiveChannel, WebSocketDialer};
pub use config::{
    OnboardingConfig, ReconnectPolicy, SyncConfig, TlsVerification, TransportPreference,
};
pub use connection::ConnectionManager;
pub use dispatch::SyncHandler;
pub use error::CoreError;
pub use feed::{DeviceFeed, NotificationFeed};
pub use onboarding::ProgressStreamController;
pub use polling::{DeviceSource, EventSink, PollingChannel, diff_snapshots};
pub use store::{CacheStore, Identified};
pub use stream::{ConnectionStateStream, SyncEventStream};

pub use model::{
    ConnectionState, Device, DeviceStats, DeviceStatus, InboundEvent, Notification,
    NotificationKind, OnboardingResult, OnboardingStage, OwnerKey, PdfSummary, ProgressEvent,
    SessionEnd, SessionIdentity, StepDetails, StepStatus, SubscriptionTopic, SyncEvent,
    TransportTier,
};

// Client-side types consumers need to build a backend handle and
// onboarding calls.
pub use iotsync_api::{
    Anonymous, ApiClient, OnboardingFile, OnboardingRequest, SharedToken, StaticToken,
    TokenSource,
};
