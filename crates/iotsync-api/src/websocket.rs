//! Live WebSocket channels.
//!
//! Two interchangeable ways of receiving push notifications from the
//! backend's `/ws` endpoint:
//!
//! - [`StompChannel`] negotiates the `v12.stomp` subprotocol, performs the
//!   CONNECT/CONNECTED handshake, subscribes per destination, and keeps the
//!   link alive with heartbeats. Silence beyond twice the negotiated
//!   heartbeat is reported as [`Error::HeartbeatMissed`].
//! - [`RawSocketChannel`] exchanges plain JSON messages and subscribes with a
//!   single `{"type":"SUBSCRIBE","topics":[...]}` envelope. No heartbeat.
//!
//! Both yield [`ChannelMessage`]s already tagged with the payload's `type`
//! discriminator. Neither reconnects on its own; that policy belongs to the
//! caller.
//!
//! ```rust,ignore
//! let options = ChannelOptions::default();
//! let mut channel = StompChannel::open(&ws_url, token.as_ref(), &options).await?;
//! channel.subscribe("/topic/organization/org-1/devices/status").await?;
//! while let Some(msg) = channel.next_message().await? {
//!     println!("{} {}", msg.kind, msg.payload);
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::auth::bearer_header;
use crate::error::Error;
use crate::stomp::{Command, Frame, HeartBeat};

/// Subprotocol name offered on the STOMP upgrade request.
pub const STOMP_SUBPROTOCOL: &str = "v12.stomp";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Options ──────────────────────────────────────────────────────────

/// Timing knobs shared by both channel kinds.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Heartbeat interval offered in CONNECT (both directions). Default: 4s.
    pub heartbeat: Duration,
    /// Upper bound on upgrade + CONNECTED. Default: 10s.
    pub handshake_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(4),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

// ── ChannelMessage ───────────────────────────────────────────────────

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// STOMP destination the message arrived on (`None` on the raw channel).
    pub destination: Option<String>,
    /// Value of the payload's `type` field, e.g. `"DEVICE_CREATED"`.
    pub kind: String,
    /// Full JSON payload, discriminator included.
    pub payload: Value,
}

impl ChannelMessage {
    /// Decode a JSON text payload. Returns `None` (and logs) for anything
    /// that is not an object with a string `type` field.
    pub fn from_text(text: &str, destination: Option<String>) -> Option<Self> {
        let payload: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable channel payload");
                return None;
            }
        };
        let Some(kind) = payload.get("type").and_then(Value::as_str) else {
            tracing::warn!(?destination, "dropping channel payload without a type");
            return None;
        };
        Some(Self {
            destination,
            kind: kind.to_owned(),
            payload,
        })
    }
}

// ── StompChannel ─────────────────────────────────────────────────────

/// STOMP-over-WebSocket channel.
pub struct StompChannel {
    ws: WsStream,
    heartbeat: HeartBeat,
    /// Subscription id (`sub-<n>`) → destination.
    subscriptions: HashMap<String, String>,
    next_sub_id: u32,
    last_inbound: Instant,
    next_outbound: Option<Instant>,
}

impl StompChannel {
    /// Upgrade with the STOMP subprotocol and complete CONNECT/CONNECTED.
    ///
    /// Any refusal (HTTP error on upgrade, missing subprotocol, `ERROR`
    /// frame, no `CONNECTED` within the handshake timeout) is returned as
    /// [`Error::Handshake`].
    pub async fn open(
        url: &Url,
        token: Option<&SecretString>,
        options: &ChannelOptions,
    ) -> Result<Self, Error> {
        let mut ws = dial(url, token, Some(STOMP_SUBPROTOCOL), options).await?;

        let offer = duration_ms(options.heartbeat);
        let mut connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", url.host_str().unwrap_or_default())
            .header("heart-beat", format!("{offer},{offer}"));
        if let Some(token) = token {
            connect = connect.header("Authorization", bearer_header(token));
        }
        ws.send(Message::text(connect.encode()))
            .await
            .map_err(stream_error)?;

        let connected = tokio::time::timeout(options.handshake_timeout, await_connected(&mut ws))
            .await
            .map_err(|_| Error::Handshake {
                reason: format!(
                    "no CONNECTED frame within {}s",
                    options.handshake_timeout.as_secs()
                ),
            })??;

        let heartbeat = HeartBeat::negotiate((offer, offer), connected.get("heart-beat"));
        tracing::info!(
            url = %url,
            version = connected.get("version").unwrap_or("?"),
            outgoing_ms = heartbeat.outgoing_ms,
            incoming_ms = heartbeat.incoming_ms,
            "STOMP session established"
        );

        let now = Instant::now();
        Ok(Self {
            ws,
            heartbeat,
            subscriptions: HashMap::new(),
            next_sub_id: 0,
            last_inbound: now,
            next_outbound: outbound_deadline(now, heartbeat),
        })
    }

    /// Send SUBSCRIBE for `destination` and register it in the dispatch
    /// table. Returns the subscription id.
    pub async fn subscribe(&mut self, destination: &str) -> Result<String, Error> {
        let id = format!("sub-{}", self.next_sub_id);
        self.next_sub_id += 1;

        let frame = Frame::new(Command::Subscribe)
            .header("id", id.as_str())
            .header("destination", destination)
            .header("ack", "auto");
        self.send_frame(&frame).await?;
        self.subscriptions.insert(id.clone(), destination.to_owned());

        tracing::debug!(%id, destination, "STOMP subscribed");
        Ok(id)
    }

    /// Destinations currently in the dispatch table.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.values().map(String::as_str)
    }

    /// Wait for the next routed message.
    ///
    /// `Ok(None)` means the server closed with a normal close code. Sends
    /// outgoing heartbeats while waiting.
    pub async fn next_message(&mut self) -> Result<Option<ChannelMessage>, Error> {
        loop {
            let watchdog = self.watchdog_deadline();
            tokio::select! {
                frame = self.ws.next() => {
                    self.last_inbound = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(msg) = self.route(text.as_str())? {
                                return Ok(Some(msg));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => return close_outcome(frame),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(stream_error(e)),
                        None => return Err(ended_without_close()),
                    }
                }
                () = sleep_until(self.next_outbound) => {
                    tracing::trace!("STOMP heartbeat out");
                    self.ws.send(Message::text("\n")).await.map_err(stream_error)?;
                    self.next_outbound = outbound_deadline(Instant::now(), self.heartbeat);
                }
                () = sleep_until(watchdog) => {
                    let silent_ms = duration_ms(self.last_inbound.elapsed());
                    tracing::warn!(silent_ms, "STOMP heartbeat missed");
                    return Err(Error::HeartbeatMissed { silent_ms });
                }
            }
        }
    }

    /// Send DISCONNECT and a normal close frame. Errors are logged only.
    pub async fn close(mut self) {
        if let Err(e) = self.send_frame(&Frame::new(Command::Disconnect)).await {
            tracing::debug!(error = %e, "STOMP DISCONNECT not sent");
        }
        close_normally(&mut self.ws).await;
    }

    fn watchdog_deadline(&self) -> Option<Instant> {
        (self.heartbeat.incoming_ms > 0)
            .then(|| self.last_inbound + Duration::from_millis(self.heartbeat.incoming_ms * 2))
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.ws
            .send(Message::text(frame.encode()))
            .await
            .map_err(stream_error)
    }

    /// Route one text frame through the dispatch table.
    fn route(&self, text: &str) -> Result<Option<ChannelMessage>, Error> {
        let frame = match Frame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::trace!("STOMP heartbeat in");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed STOMP frame");
                return Ok(None);
            }
        };

        match frame.command {
            Command::Message => {
                let destination = frame
                    .get("subscription")
                    .and_then(|id| self.subscriptions.get(id))
                    .cloned()
                    .or_else(|| frame.get("destination").map(str::to_owned));
                let known = destination
                    .as_deref()
                    .is_some_and(|d| self.subscriptions.values().any(|s| s == d));
                if !known {
                    tracing::debug!(?destination, "MESSAGE for unknown subscription");
                    return Ok(None);
                }
                Ok(ChannelMessage::from_text(&frame.body, destination))
            }
            Command::Error => Err(Error::Protocol(
                frame
                    .get("message")
                    .map_or_else(|| frame.body.clone(), str::to_owned),
            )),
            other => {
                tracing::trace!(command = %other, "ignoring STOMP frame");
                Ok(None)
            }
        }
    }
}

/// Read frames until CONNECTED (ok) or ERROR (handshake failure).
async fn await_connected(ws: &mut WsStream) -> Result<Frame, Error> {
    while let Some(msg) = ws.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                return Err(Error::Handshake {
                    reason: frame.map_or_else(
                        || "closed before CONNECTED".into(),
                        |f| format!("closed before CONNECTED ({}): {}", f.code, f.reason),
                    ),
                });
            }
            Ok(_) => continue,
            Err(e) => return Err(stream_error(e)),
        };
        match Frame::decode(text.as_str())? {
            Some(frame) if frame.command == Command::Connected => return Ok(frame),
            Some(frame) if frame.command == Command::Error => {
                return Err(Error::Handshake {
                    reason: frame
                        .get("message")
                        .map_or_else(|| frame.body.clone(), str::to_owned),
                });
            }
            _ => {}
        }
    }
    Err(Error::Handshake {
        reason: "stream ended before CONNECTED".into(),
    })
}

// ── RawSocketChannel ─────────────────────────────────────────────────

/// Plain JSON WebSocket channel.
pub struct RawSocketChannel {
    ws: WsStream,
}

impl RawSocketChannel {
    /// Open the socket without a subprotocol.
    pub async fn open(
        url: &Url,
        token: Option<&SecretString>,
        options: &ChannelOptions,
    ) -> Result<Self, Error> {
        let ws = dial(url, token, None, options).await?;
        tracing::info!(url = %url, "raw socket channel open");
        Ok(Self { ws })
    }

    /// Send the subscribe envelope for all topics at once.
    pub async fn subscribe(&mut self, topics: &[String]) -> Result<(), Error> {
        let envelope = serde_json::json!({ "type": "SUBSCRIBE", "topics": topics });
        self.ws
            .send(Message::text(envelope.to_string()))
            .await
            .map_err(stream_error)?;
        tracing::debug!(count = topics.len(), "raw socket subscribed");
        Ok(())
    }

    /// Wait for the next decodable message. `Ok(None)` on normal close.
    pub async fn next_message(&mut self) -> Result<Option<ChannelMessage>, Error> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(msg) = ChannelMessage::from_text(text.as_str(), None) {
                        return Ok(Some(msg));
                    }
                }
                Some(Ok(Message::Close(frame))) => return close_outcome(frame),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(stream_error(e)),
                None => return Err(ended_without_close()),
            }
        }
    }

    pub async fn close(mut self) {
        close_normally(&mut self.ws).await;
    }
}

// ── Shared plumbing ──────────────────────────────────────────────────

/// Perform the WebSocket upgrade.
async fn dial(
    url: &Url,
    token: Option<&SecretString>,
    subprotocol: Option<&str>,
    options: &ChannelOptions,
) -> Result<WsStream, Error> {
    tracing::debug!(url = %url, ?subprotocol, "dialing WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(token) = token {
        request = request.with_header("Authorization", bearer_header(token));
    }
    if let Some(protocol) = subprotocol {
        request = request.with_sub_protocol(protocol);
    }

    let (ws, _response) =
        tokio::time::timeout(options.handshake_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: options.handshake_timeout.as_secs(),
            })?
            .map_err(upgrade_error)?;
    Ok(ws)
}

/// Upgrade failures: an HTTP answer or protocol violation means the
/// endpoint will not speak this tier at all; I/O errors are transient.
fn upgrade_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => Error::Handshake {
            reason: format!("upgrade rejected with HTTP {}", response.status()),
        },
        tungstenite::Error::Protocol(e) => Error::Handshake {
            reason: e.to_string(),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

fn stream_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            ended_without_close()
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

fn ended_without_close() -> Error {
    Error::WebSocketClosed {
        code: 1006,
        reason: "stream ended without a close frame".into(),
    }
}

fn close_outcome(frame: Option<CloseFrame>) -> Result<Option<ChannelMessage>, Error> {
    match frame {
        None => {
            tracing::info!("WebSocket closed (no close payload)");
            Ok(None)
        }
        Some(cf) if cf.code == CloseCode::Normal => {
            tracing::info!(reason = %cf.reason, "WebSocket closed normally");
            Ok(None)
        }
        Some(cf) => Err(Error::WebSocketClosed {
            code: cf.code.into(),
            reason: cf.reason.to_string(),
        }),
    }
}

async fn close_normally(ws: &mut WsStream) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    if let Err(e) = ws.close(Some(frame)).await {
        tracing::debug!(error = %e, "error while closing WebSocket");
    }
}

fn outbound_deadline(from: Instant, heartbeat: HeartBeat) -> Option<Instant> {
    (heartbeat.outgoing_ms > 0).then(|| from + Duration::from_millis(heartbeat.outgoing_ms))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────
