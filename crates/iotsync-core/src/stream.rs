// ── Session streams ──
//
// `Stream` adapters over the connection manager's watch and broadcast
// channels, for consumers that prefer combinators to callbacks.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use crate::model::{ConnectionState, SyncEvent};

/// Session events as a `Stream`.
///
/// A slow consumer that falls behind the broadcast buffer skips the
/// missed events (logged) instead of ending the stream.
pub struct SyncEventStream {
    inner: BroadcastStream<Arc<SyncEvent>>,
}

impl SyncEventStream {
    pub fn new(receiver: broadcast::Receiver<Arc<SyncEvent>>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for SyncEventStream {
    type Item = Arc<SyncEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Connection state transitions as a `Stream`, starting with the current
/// state.
pub struct ConnectionStateStream {
    inner: WatchStream<ConnectionState>,
}

impl ConnectionStateStream {
    pub fn new(receiver: watch::Receiver<ConnectionState>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
        }
    }
}

impl Stream for ConnectionStateStream {
    type Item = ConnectionState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
