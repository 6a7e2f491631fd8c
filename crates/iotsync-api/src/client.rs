// Backend HTTP client
//
// Wraps `reqwest::Client` with URL construction, bearer-token injection,
// and status/error mapping. Endpoint groups live in their own files
// (`devices`, `notifications`, `onboarding`) as inherent methods so this
// module stays focused on transport mechanics.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::{TokenSource, bearer_header};
use crate::error::Error;
use crate::transport::TransportConfig;

/// Structured error body the backend returns on 4xx/5xx.
#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the device-management backend.
///
/// Cheap to share behind an `Arc`; every request reads the current token
/// from the [`TokenSource`] right before it is sent.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
    request_timeout: Duration,
}

impl ApiClient {
    /// Build a client (and its `reqwest::Client`) from a transport config.
    pub fn new(
        base_url: Url,
        tokens: Arc<dyn TokenSource>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(
            http,
            base_url,
            tokens,
            transport.request_timeout,
        ))
    }

    /// Use a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        tokens: Arc<dyn TokenSource>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            tokens,
            request_timeout,
        }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Current bearer token, if any.
    pub fn token(&self) -> Option<SecretString> {
        self.tokens.token()
    }

    /// The token source shared with live channels.
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        Arc::clone(&self.tokens)
    }

    /// Live-channel endpoint: `<backend>/ws` with `http(s)` swapped for
    /// `ws(s)`.
    pub fn websocket_url(&self) -> Result<Url, Error> {
        let mut url = self.join("ws")?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|()| {
            Error::WebSocketConnect(format!("cannot use scheme {scheme} for {url}"))
        })?;
        Ok(url)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        self.join(&format!("api/{path}"))
    }

    fn join(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Attach the bearer token, if there is one.
    pub(crate) fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.token() {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, bearer_header(&token)),
            None => builder,
        }
    }

    /// GET a JSON document with the ordinary request timeout.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let builder = self.authorize(self.http.get(url).timeout(self.request_timeout));
        let resp = builder.send().await.map_err(|e| self.map_send_error(e))?;
        parse_json(check_status(resp).await?).await
    }

    /// PATCH without a body; the response body is discarded.
    pub(crate) async fn patch_empty(&self, url: Url) -> Result<(), Error> {
        debug!("PATCH {}", url);
        let builder = self.authorize(self.http.patch(url).timeout(self.request_timeout));
        let resp = builder.send().await.map_err(|e| self.map_send_error(e))?;
        check_status(resp).await?;
        Ok(())
    }

    /// Convert a reqwest timeout into our own variant so callers can tell
    /// which deadline fired.
    pub(crate) fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.request_timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }
}

/// Map non-2xx responses to typed errors; pass successes through.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "token missing, expired, or rejected".into(),
        });
    }

    let code = status.as_u16();
    let body = resp.text().await.unwrap_or_default();

    if body.trim().is_empty() && matches!(code, 502..=504) {
        return Err(Error::Unavailable { status: code });
    }

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| {
            let preview = &body[..floor_char_boundary(&body, 200)];
            if preview.is_empty() {
                status.to_string()
            } else {
                preview.to_owned()
            }
        });
    Err(Error::Api {
        status: code,
        message,
    })
}

/// Read the body and decode it, keeping the raw text on failure.
pub(crate) async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| {
        let preview = &body[..floor_char_boundary(&body, 200)];
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
