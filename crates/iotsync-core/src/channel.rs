// ── Live transport seam ──
//
// The connection manager talks to live channels only through these
// traits, so the STOMP and raw-socket implementations are interchangeable
// and tests can script a channel without a network.

use std::sync::Arc;

use async_trait::async_trait;

use iotsync_api::websocket::{ChannelMessage, ChannelOptions, RawSocketChannel, StompChannel};
use iotsync_api::{Error as ApiError, TokenSource};

use crate::model::{SessionIdentity, TransportTier};

/// An open live channel.
#[async_trait]
pub trait LiveChannel: Send {
    /// Subscribe to every destination (called after each successful open).
    async fn subscribe(&mut self, destinations: &[String]) -> Result<(), ApiError>;

    /// Next decoded message; `Ok(None)` on a normal close.
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>, ApiError>;

    /// Close with a normal status code.
    async fn close(self: Box<Self>);
}

/// Opens live channels for a given tier.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(
        &self,
        tier: TransportTier,
        identity: &SessionIdentity,
    ) -> Result<Box<dyn LiveChannel>, ApiError>;
}

/// Real dialer backed by `tokio-tungstenite`.
pub struct WebSocketDialer {
    tokens: Arc<dyn TokenSource>,
    options: ChannelOptions,
}

impl WebSocketDialer {
    pub fn new(tokens: Arc<dyn TokenSource>, options: ChannelOptions) -> Self {
        Self { tokens, options }
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(
        &self,
        tier: TransportTier,
        identity: &SessionIdentity,
    ) -> Result<Box<dyn LiveChannel>, ApiError> {
        let token = self.tokens.token();
        match tier {
            TransportTier::Stomp => {
                let channel =
                    StompChannel::open(&identity.endpoint, token.as_ref(), &self.options).await?;
                Ok(Box::new(channel))
            }
            TransportTier::RawSocket => {
                let channel =
                    RawSocketChannel::open(&identity.endpoint, token.as_ref(), &self.options)
                        .await?;
                Ok(Box::new(channel))
            }
            TransportTier::Polling => Err(ApiError::Handshake {
                reason: "polling is not a live channel".into(),
            }),
        }
    }
}

#[async_trait]
impl LiveChannel for StompChannel {
    async fn subscribe(&mut self, destinations: &[String]) -> Result<(), ApiError> {
        for destination in destinations {
            StompChannel::subscribe(self, destination).await?;
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<ChannelMessage>, ApiError> {
        StompChannel::next_message(self).await
    }

    async fn close(self: Box<Self>) {
        StompChannel::close(*self).await;
    }
}

#[async_trait]
impl LiveChannel for RawSocketChannel {
    async fn subscribe(&mut self, destinations: &[String]) -> Result<(), ApiError> {
        RawSocketChannel::subscribe(self, destinations).await
    }

    async fn next_message(&mut self) -> Result<Option<ChannelMessage>, ApiError> {
        RawSocketChannel::next_message(self).await
    }

    async fn close(self: Box<Self>) {
        RawSocketChannel::close(*self).await;
    }
}
