//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use iotsync_config::ConfigError;
use iotsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach backend: {reason}")]
    #[diagnostic(
        code(iotsync::connection_failed),
        help(
            "Check that the backend is running and accessible.\n\
             Try: iotsync stats --insecure"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("TLS setup failed: {message}")]
    #[diagnostic(
        code(iotsync::tls_error),
        help(
            "Use --insecure (-k) to accept a self-signed certificate, \
             or configure ca_cert in your profile."
        )
    )]
    TlsError { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(iotsync::auth_failed),
        help(
            "Your token may have expired.\n\
             Run: iotsync config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(iotsync::no_credentials),
        help(
            "Store one with: iotsync config set-token\n\
             Or set the IOTSYNC_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(iotsync::not_found),
        help("Run: iotsync {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(iotsync::api_error))]
    ApiError { code: String, message: String },

    // ── Onboarding ───────────────────────────────────────────────────
    #[error("Onboarding failed: {message}")]
    #[diagnostic(
        code(iotsync::onboarding_failed),
        help("The backend rejected the request. Fix the input and try again.")
    )]
    OnboardingFailed { message: String },

    #[error("Onboarding did not complete after {attempts} attempts: {last}")]
    #[diagnostic(
        code(iotsync::onboarding_exhausted),
        help("The backend may still be processing. Check `iotsync devices list` before retrying.")
    )]
    OnboardingExhausted { attempts: u32, last: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(iotsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(iotsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: iotsync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(iotsync::no_config),
        help(
            "Create a profile with: iotsync config init --backend <URL> --organization <ID>\n\
             Or pass --backend and --organization.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(iotsync::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(iotsync::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(iotsync::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("YAML rendering failed: {0}")]
    #[diagnostic(code(iotsync::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { profile } => CliError::ProfileNotFound {
                name: profile,
                available: available_profiles(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

fn available_profiles() -> String {
    let cfg = iotsync_config::load_config_or_default();
    let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
    names.sort();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason, .. } | CoreError::HandshakeFailed { reason } => {
                CliError::ConnectionFailed { reason }
            }

            CoreError::NotConnected => CliError::ConnectionFailed {
                reason: "not connected".into(),
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::StreamIncomplete => CliError::OnboardingFailed {
                message: err.to_string(),
            },

            CoreError::OnboardingRejected { message, .. } => {
                CliError::OnboardingFailed { message }
            }

            CoreError::FallbackExhausted { attempts, last } => CliError::OnboardingExhausted {
                attempts,
                last: last.to_string(),
            },

            CoreError::Api {
                message,
                status: Some(401 | 403),
            } => CliError::AuthFailed { message },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "unknown".into(), |s| s.to_string()),
                message,
            },

            CoreError::InvalidResponse { message } => CliError::ApiError {
                code: "invalid_response".into(),
                message,
            },

            CoreError::Config { message } if message.starts_with("TLS") => {
                CliError::TlsError { message }
            }

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let auth: CliError = CoreError::Api {
            message: "expired".into(),
            status: Some(401),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let timeout: CliError = CoreError::Timeout { timeout_secs: 30 }.into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);

        let conn: CliError = CoreError::HandshakeFailed {
            reason: "404".into(),
        }
        .into();
        assert_eq!(conn.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn exhausted_onboarding_keeps_last_cause() {
        let err: CliError = CoreError::FallbackExhausted {
            attempts: 3,
            last: Box::new(CoreError::Timeout { timeout_secs: 300 }),
        }
        .into();
        let CliError::OnboardingExhausted { attempts, last } = err else {
            panic!("unexpected mapping");
        };
        assert_eq!(attempts, 3);
        assert!(last.contains("300s"));
    }
}
