// ── Core error types ──
//
// User-facing errors from iotsync-core. Consumers never match on HTTP
// statuses or tungstenite failures directly; the `From<iotsync_api::Error>`
// impl translates transport-layer errors into domain variants while
// keeping the retry classification.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach backend: {reason}")]
    ConnectionFailed {
        reason: String,
        /// Worth retrying (network blip, abnormal close, gateway error).
        transient: bool,
    },

    #[error("Transport refused: {reason}")]
    HandshakeFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Not connected")]
    NotConnected,

    // ── Onboarding errors ────────────────────────────────────────────
    /// The progress stream drained without a `complete` or `error` event.
    #[error("Stream completed without data")]
    StreamIncomplete,

    /// The backend reported a terminal failure.
    #[error("Onboarding failed: {message}")]
    OnboardingRejected {
        message: String,
        retryable: Option<bool>,
    },

    /// Streaming and every non-streaming retry failed.
    #[error("All {attempts} fallback attempts failed: {last}")]
    FallbackExhausted { attempts: u32, last: Box<CoreError> },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Unexpected response: {message}")]
    InvalidResponse { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// `true` if a retry (or a lower transport tier) may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { transient, .. } => *transient,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<iotsync_api::Error> for CoreError {
    fn from(err: iotsync_api::Error) -> Self {
        let transient = err.is_transient();
        match err {
            iotsync_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            iotsync_api::Error::Handshake { reason } => CoreError::HandshakeFailed { reason },
            iotsync_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            iotsync_api::Error::Transport(ref e) if e.is_timeout() => {
                CoreError::Timeout { timeout_secs: 0 }
            }
            iotsync_api::Error::Transport(e) => match e.status() {
                Some(status) if !transient => CoreError::Api {
                    message: e.to_string(),
                    status: Some(status.as_u16()),
                },
                _ => CoreError::ConnectionFailed {
                    reason: e.to_string(),
                    transient,
                },
            },
            iotsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            iotsync_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            e @ (iotsync_api::Error::WebSocketConnect(_)
            | iotsync_api::Error::WebSocketClosed { .. }
            | iotsync_api::Error::HeartbeatMissed { .. }
            | iotsync_api::Error::StreamInterrupted(_)
            | iotsync_api::Error::Protocol(_)
            | iotsync_api::Error::Unavailable { .. }) => CoreError::ConnectionFailed {
                reason: e.to_string(),
                transient,
            },
            iotsync_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            iotsync_api::Error::Deserialization { message, body: _ } => {
                CoreError::InvalidResponse { message }
            }
        }
    }
}
