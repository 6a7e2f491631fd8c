// ── Domain model ──
//
// Canonical types the sync layer hands to consumers. Wire shapes live in
// `iotsync_api::models`; `crate::convert` bridges the two.

pub mod device;
pub mod event;
pub mod notification;
pub mod progress;
pub mod session;

pub use device::{Device, DeviceStats, DeviceStatus};
pub use event::{InboundEvent, SessionEnd, SyncEvent};
pub use notification::{Notification, NotificationKind};
pub use progress::{
    OnboardingResult, OnboardingStage, PdfSummary, ProgressEvent, StepDetails, StepStatus,
};
pub use session::{ConnectionState, OwnerKey, SessionIdentity, SubscriptionTopic, TransportTier};
