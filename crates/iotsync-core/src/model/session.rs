// ── Session-scoped identity and connection types ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

/// Lifecycle of the single live session a connection manager owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Which transport currently carries live updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TransportTier {
    Stomp,
    RawSocket,
    Polling,
}

/// Tenant + endpoint, fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Organization id; scopes every subscription topic.
    pub tenant: String,
    /// Live-channel endpoint (`ws://` / `wss://`).
    pub endpoint: Url,
}

impl SessionIdentity {
    pub fn new(tenant: impl Into<String>, endpoint: Url) -> Self {
        Self {
            tenant: tenant.into(),
            endpoint,
        }
    }
}

/// Device topics a session can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTopic {
    Status,
    Created,
    Deleted,
    Stats,
}

impl SubscriptionTopic {
    pub const ALL: [Self; 4] = [Self::Status, Self::Created, Self::Deleted, Self::Stats];

    /// Broker destination for this topic within a tenant.
    pub fn destination(self, tenant: &str) -> String {
        format!("/topic/organization/{tenant}/devices/{self}")
    }
}

/// Cache partition key: one entry per tenant + user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    pub tenant: String,
    pub user: String,
}

impl OwnerKey {
    pub fn new(tenant: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            user: user.into(),
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.tenant, self.user)
    }
}
