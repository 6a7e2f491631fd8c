// ── Runtime sync configuration ──
//
// These types describe *how* to reach the backend and how hard to try.
// They never touch disk: the CLI (via iotsync-config) builds a
// `SyncConfig` and hands it in.

use std::time::Duration;

use strum::{Display, EnumString};
use url::Url;

use crate::model::SubscriptionTopic;

/// Which live transports the connection manager may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TransportPreference {
    /// STOMP, then the raw socket once, then polling.
    #[default]
    Auto,
    /// STOMP only (polling after exhaustion if enabled).
    Stomp,
    /// Raw socket only (polling after exhaustion if enabled).
    Raw,
    /// Never open a socket.
    Polling,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed development backends).
    DangerAcceptInvalid,
}

/// Reconnect schedule: `base_delay × 2^(n-1)` before attempt `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

/// Progress stream + fallback tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingConfig {
    /// Abort the stream if no byte arrives for this long.
    pub stream_timeout: Duration,
    /// Attempts of the non-streaming call after a transient stream failure.
    pub fallback_attempts: u32,
    /// Delay before fallback attempt `n` is `fallback_backoff × n`.
    pub fallback_backoff: Duration,
    /// Whole-request timeout of each non-streaming attempt.
    pub request_timeout: Duration,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            stream_timeout: Duration::from_secs(300),
            fallback_attempts: 3,
            fallback_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Everything the sync layer needs to talk to one backend.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend root, e.g. `https://iot.example.com`.
    pub backend_url: Url,
    pub transport: TransportPreference,
    pub reconnect: ReconnectPolicy,
    /// STOMP heartbeat offered in both directions.
    pub heartbeat: Duration,
    /// Upgrade + CONNECTED deadline.
    pub handshake_timeout: Duration,
    pub poll_interval: Duration,
    /// Fall back to polling once live transports are exhausted.
    pub polling_fallback: bool,
    /// Freshness window of the cache store.
    pub cache_ttl: Duration,
    pub onboarding: OnboardingConfig,
    /// Ordinary REST call timeout.
    pub timeout: Duration,
    pub tls: TlsVerification,
    /// Topics subscribed after every successful open.
    pub topics: Vec<SubscriptionTopic>,
}

impl SyncConfig {
    pub fn new(backend_url: Url) -> Self {
        Self {
            backend_url,
            transport: TransportPreference::Auto,
            reconnect: ReconnectPolicy::default(),
            heartbeat: Duration::from_secs(4),
            handshake_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            polling_fallback: true,
            cache_ttl: Duration::from_secs(300),
            onboarding: OnboardingConfig::default(),
            timeout: Duration::from_secs(30),
            tls: TlsVerification::default(),
            topics: SubscriptionTopic::ALL.to_vec(),
        }
    }

    /// Transport settings for the HTTP client.
    pub fn transport_config(&self) -> iotsync_api::TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => iotsync_api::TlsMode::System,
            TlsVerification::CustomCa(path) => iotsync_api::TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => iotsync_api::TlsMode::DangerAcceptInvalid,
        };
        iotsync_api::TransportConfig {
            tls,
            request_timeout: self.timeout,
            ..iotsync_api::TransportConfig::default()
        }
    }

    /// Options for opening live channels.
    pub fn channel_options(&self) -> iotsync_api::ChannelOptions {
        iotsync_api::ChannelOptions {
            heartbeat: self.heartbeat,
            handshake_timeout: self.handshake_timeout,
        }
    }
}
