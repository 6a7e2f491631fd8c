// Bearer-token sources.
//
// The transport layer never refreshes or validates tokens. It asks a
// `TokenSource` for the current value right before each request or
// channel handshake, so callers can swap tokens behind its back.

use std::sync::{Arc, PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};

/// Supplies the bearer token attached to every request and channel.
pub trait TokenSource: Send + Sync {
    /// Current token, or `None` when running unauthenticated.
    fn token(&self) -> Option<SecretString>;
}

/// A token fixed at construction time.
#[derive(Debug, Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self(token.into())
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

/// No token at all (public backends, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl TokenSource for Anonymous {
    fn token(&self) -> Option<SecretString> {
        None
    }
}

/// A token that an outer auth layer can replace at runtime.
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<SecretString>>>,
}

impl SharedToken {
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    /// Replace the token seen by subsequent requests.
    pub fn set(&self, token: Option<SecretString>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

impl TokenSource for SharedToken {
    fn token(&self) -> Option<SecretString> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Format the `Authorization` header value for a token.
pub(crate) fn bearer_header(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_token_swaps_value() {
        let shared = SharedToken::new(None);
        assert!(shared.token().is_none());

        shared.set(Some(SecretString::from("abc".to_string())));
        let token = shared.token().map(|t| bearer_header(&t));
        assert_eq!(token.as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn anonymous_has_no_token() {
        assert!(Anonymous.token().is_none());
    }
}
