//! CLI configuration: thin wrapper around `iotsync_config` shared types.
//!
//! Adds CLI-specific resolution that respects `GlobalOpts` flag overrides
//! (--backend, --organization, --token, etc.).

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use iotsync_core::{ApiClient, OwnerKey, StaticToken, SyncConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use iotsync_config::{
    Config, Profile, config_path, load_config_or_default, profile_to_sync_config, resolve_token,
    save_config, store_token,
};

/// Everything a backend-bound command needs.
pub struct BackendContext {
    pub api: Arc<ApiClient>,
    pub sync: SyncConfig,
    pub owner: OwnerKey,
    pub organization: String,
}

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the backend context from the config file, profile, and CLI
/// overrides. Flags win over profile values.
pub fn resolve_backend(global: &GlobalOpts) -> Result<BackendContext, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let (mut sync, organization, user, token) = match cfg.profiles.get(&profile_name) {
        Some(profile) => {
            let mut sync = profile_to_sync_config(profile, &cfg.defaults)?;
            if let Some(ref backend) = global.backend {
                sync.backend_url = parse_backend(backend)?;
            }
            let organization = global
                .organization
                .clone()
                .unwrap_or_else(|| profile.organization.clone());
            let token = match global.token {
                Some(ref token) => SecretString::from(token.clone()),
                None => resolve_token(profile, &profile_name)?,
            };
            (sync, organization, profile.user.clone(), token)
        }
        None if global.profile.is_some() => {
            return Err(iotsync_config::ConfigError::UnknownProfile {
                profile: profile_name,
            }
            .into());
        }
        None => {
            // No profile: flags / env vars alone
            let backend = global.backend.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            let organization = global.organization.clone().ok_or_else(|| CliError::Validation {
                field: "organization".into(),
                reason: "required when no profile is configured".into(),
            })?;
            let token = global
                .token
                .clone()
                .map(SecretString::from)
                .ok_or(CliError::NoCredentials {
                    profile: profile_name,
                })?;
            let mut sync = SyncConfig::new(parse_backend(backend)?);
            sync.timeout = Duration::from_secs(cfg.defaults.timeout);
            (sync, organization, None, token)
        }
    };

    if global.insecure {
        sync.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        sync.timeout = Duration::from_secs(timeout);
    }

    let api = ApiClient::new(
        sync.backend_url.clone(),
        Arc::new(StaticToken::new(token)),
        &sync.transport_config(),
    )
    .map_err(iotsync_core::CoreError::from)?;

    Ok(BackendContext {
        api: Arc::new(api),
        owner: OwnerKey::new(
            organization.clone(),
            user.unwrap_or_else(|| "default".into()),
        ),
        sync,
        organization,
    })
}

fn parse_backend(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "backend".into(),
        reason: format!("invalid URL: {raw}"),
    })
}
