use thiserror::Error;

/// Top-level error type for the `iotsync-api` crate.
///
/// Covers every failure mode across the transport surfaces: REST calls,
/// the STOMP and raw WebSocket channels, and the chunked event stream.
/// `iotsync-core` maps these into user-facing diagnostics and uses the
/// classification helpers ([`is_handshake`](Self::is_handshake),
/// [`is_transient`](Self::is_transient)) to pick fallback or retry.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The backend rejected the bearer token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, body read, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or stream timed out.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// Endpoint refused the channel: upgrade rejected, wrong subprotocol,
    /// STOMP `ERROR` instead of `CONNECTED`, or no `CONNECTED` in time.
    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    /// WebSocket connection failed at the network level.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed with a non-normal close code.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// No inbound traffic inside the negotiated heartbeat window.
    #[error("Heartbeat missed (no traffic for {silent_ms}ms)")]
    HeartbeatMissed { silent_ms: u64 },

    /// Malformed frame on the subprotocol channel.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ── Event stream ────────────────────────────────────────────────
    /// Chunked response body was cut off mid-stream.
    #[error("Event stream interrupted: {0}")]
    StreamInterrupted(String),

    // ── Server-reported ─────────────────────────────────────────────
    /// Structured error returned by the backend (non-2xx with a body).
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Gateway/availability failure without a structured body.
    #[error("Backend unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this failure means the transport tier itself is
    /// unusable (negotiation failure), so the caller should move to the
    /// next tier instead of retrying the same one.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_request() || e.is_decode()
            }
            Self::Timeout { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::HeartbeatMissed { .. }
            | Self::StreamInterrupted(_)
            | Self::Unavailable { .. } => true,
            _ => false,
        }
    }

    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Api { status, .. } | Self::Unavailable { status } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_is_not_transient() {
        let err = Error::Handshake {
            reason: "unsupported subprotocol".into(),
        };
        assert!(err.is_handshake());
        assert!(!err.is_transient());
    }

    #[test]
    fn abnormal_close_and_timeouts_are_transient() {
        assert!(
            Error::WebSocketClosed {
                code: 1006,
                reason: String::new()
            }
            .is_transient()
        );
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(Error::StreamInterrupted("eof".into()).is_transient());
        assert!(Error::HeartbeatMissed { silent_ms: 8000 }.is_transient());
    }

    #[test]
    fn business_errors_are_terminal() {
        let err = Error::Api {
            status: 400,
            message: "device name already taken".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_handshake());
        assert_eq!(err.status(), Some(400));
    }
}
