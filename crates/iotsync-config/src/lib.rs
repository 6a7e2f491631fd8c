//! Configuration for iotsync tools.
//!
//! TOML profiles, bearer-token resolution (env + keyring + plaintext),
//! and translation to `iotsync_core::SyncConfig`. The CLI layers its
//! flag overrides on top of this.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iotsync_core::{
    OwnerKey, ReconnectPolicy, SubscriptionTopic, SyncConfig, TlsVerification,
    TransportPreference,
};

const KEYRING_SERVICE: &str = "iotsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name and profile selected by `requested`, else the default.
    pub fn profile(&self, requested: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// REST timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile. Durations are in seconds unless noted.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "https://iot.example.com").
    pub backend: String,

    /// Organization id; scopes live topics and cache entries.
    pub organization: String,

    /// User id, for cache partitioning.
    pub user: Option<String>,

    /// Bearer token (plaintext; prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,

    /// "auto", "stomp", "raw", or "polling".
    pub transport: Option<String>,

    /// Subset of "status", "created", "deleted", "stats".
    pub topics: Option<Vec<String>>,

    pub poll_interval: Option<u64>,
    pub polling_fallback: Option<bool>,
    /// Base reconnect delay, in milliseconds.
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_attempts: Option<u32>,
    /// STOMP heartbeat, in milliseconds.
    pub heartbeat_ms: Option<u64>,
    pub handshake_timeout: Option<u64>,
    pub cache_ttl: Option<u64>,
    pub stream_timeout: Option<u64>,
    pub fallback_attempts: Option<u32>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override REST timeout.
    pub timeout: Option<u64>,
}

impl Profile {
    /// Cache partition for this profile.
    pub fn owner_key(&self) -> OwnerKey {
        OwnerKey::new(
            self.organization.clone(),
            self.user.clone().unwrap_or_else(|| "default".into()),
        )
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "iotsync", "iotsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("iotsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + `IOTSYNC_` environment
/// (`IOTSYNC_DEFAULTS__TIMEOUT=60` sets `defaults.timeout`).
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("IOTSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

/// Resolve the bearer token: `token_env` → keyring → plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── SyncConfig translation ──────────────────────────────────────────

fn validation(field: &str, reason: String) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason,
    }
}

/// Build a `SyncConfig` from a profile, without CLI flag overrides.
pub fn profile_to_sync_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let url: url::Url = profile
        .backend
        .parse()
        .map_err(|_| validation("backend", format!("invalid URL: {}", profile.backend)))?;
    if profile.organization.trim().is_empty() {
        return Err(validation("organization", "must not be empty".into()));
    }

    let mut config = SyncConfig::new(url);

    if let Some(ref transport) = profile.transport {
        config.transport = TransportPreference::from_str(transport).map_err(|_| {
            validation(
                "transport",
                format!("expected 'auto', 'stomp', 'raw', or 'polling', got '{transport}'"),
            )
        })?;
    }
    if let Some(ref topics) = profile.topics {
        config.topics = topics
            .iter()
            .map(|t| {
                SubscriptionTopic::from_str(t)
                    .map_err(|_| validation("topics", format!("unknown topic '{t}'")))
            })
            .collect::<Result<_, _>>()?;
    }

    let secs = Duration::from_secs;
    let millis = Duration::from_millis;
    config.reconnect = ReconnectPolicy {
        base_delay: profile
            .reconnect_base_ms
            .map_or(config.reconnect.base_delay, millis),
        max_attempts: profile
            .reconnect_attempts
            .unwrap_or(config.reconnect.max_attempts),
    };
    config.heartbeat = profile.heartbeat_ms.map_or(config.heartbeat, millis);
    config.handshake_timeout = profile
        .handshake_timeout
        .map_or(config.handshake_timeout, secs);
    config.poll_interval = profile.poll_interval.map_or(config.poll_interval, secs);
    config.polling_fallback = profile.polling_fallback.unwrap_or(config.polling_fallback);
    config.cache_ttl = profile.cache_ttl.map_or(config.cache_ttl, secs);
    config.onboarding.stream_timeout = profile
        .stream_timeout
        .map_or(config.onboarding.stream_timeout, secs);
    config.onboarding.fallback_attempts = profile
        .fallback_attempts
        .unwrap_or(config.onboarding.fallback_attempts);
    config.timeout = secs(profile.timeout.unwrap_or(defaults.timeout));

    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    if config.poll_interval.is_zero() {
        return Err(validation("poll_interval", "must be at least 1 second".into()));
    }

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn profile() -> Profile {
        Profile {
            backend: "https://iot.example.com".into(),
            organization: "org-1".into(),
            ..Profile::default()
        }
    }

    #[test]
    fn profile_defaults_match_sync_defaults() {
        let config = profile_to_sync_config(&profile(), &Defaults::default()).unwrap();
        assert_eq!(config.transport, TransportPreference::Auto);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
    }

    #[test]
    fn profile_overrides_apply() {
        let p = Profile {
            transport: Some("raw".into()),
            topics: Some(vec!["status".into(), "Stats".into()]),
            reconnect_base_ms: Some(250),
            insecure: Some(true),
            poll_interval: Some(10),
            ..profile()
        };
        let config = profile_to_sync_config(&p, &Defaults::default()).unwrap();
        assert_eq!(config.transport, TransportPreference::Raw);
        assert_eq!(
            config.topics,
            [SubscriptionTopic::Status, SubscriptionTopic::Stats]
        );
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let bad_transport = Profile {
            transport: Some("carrier-pigeon".into()),
            ..profile()
        };
        assert!(matches!(
            profile_to_sync_config(&bad_transport, &Defaults::default()),
            Err(ConfigError::Validation { ref field, .. }) if field == "transport"
        ));

        let no_org = Profile {
            organization: " ".into(),
            ..profile()
        };
        assert!(profile_to_sync_config(&no_org, &Defaults::default()).is_err());
    }

    #[test]
    fn plaintext_token_is_last_resort() {
        let p = Profile {
            token_env: Some("IOTSYNC_TEST_UNSET_TOKEN_VAR".into()),
            token: Some("from-file".into()),
            ..profile()
        };
        let token = resolve_token(&p, "iotsync-config-test-profile").unwrap();
        assert_eq!(token.expose_secret(), "from-file");

        let none = Profile {
            token: None,
            ..p
        };
        assert!(matches!(
            resolve_token(&none, "iotsync-config-test-profile"),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn loads_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_profile = "plant"

[profiles.plant]
backend = "http://localhost:8080"
organization = "org-7"
user = "u-3"
transport = "stomp"
"#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "plant");
        assert_eq!(profile.owner_key().to_string(), "org-7_u-3");
        assert!(matches!(
            config.profile(Some("missing")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }
}
