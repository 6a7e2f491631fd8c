// ── Connection manager ──
//
// Owns the single live session for one tenant: dials transport tiers in
// order, subscribes, pumps messages into the dispatcher, reconnects with
// exponential backoff, and degrades to polling once live tiers run out.

use std::sync::{Arc, PoisonError};

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use iotsync_api::{ApiClient, Error as ApiError};

use crate::backoff::Backoff;
use crate::channel::{Dialer, LiveChannel, WebSocketDialer};
use crate::config::{SyncConfig, TransportPreference};
use crate::dispatch::{Dispatcher, SyncHandler};
use crate::model::{
    ConnectionState, Device, OwnerKey, SessionEnd, SessionIdentity, SyncEvent, TransportTier,
};
use crate::polling::{DeviceSource, EventSink, PollingChannel};
use crate::store::CacheStore;
use crate::stream::{ConnectionStateStream, SyncEventStream};

/// How one channel lifetime ended.
#[derive(Debug)]
enum ChannelOutcome {
    /// `disconnect()` was called.
    Cancelled,
    /// Server closed with a normal status; no reconnect.
    Closed,
    /// Upgrade or CONNECT refused; never retried on the same tier.
    Refused(ApiError),
    /// Anything else: abnormal close, missed heartbeat, network error.
    Dropped { error: ApiError, opened: bool },
}

struct Session {
    identity: SessionIdentity,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ManagerInner {
    config: SyncConfig,
    dialer: Arc<dyn Dialer>,
    source: Option<Arc<dyn DeviceSource>>,
    dispatcher: Arc<Dispatcher>,
    state: watch::Sender<ConnectionState>,
    tier: watch::Sender<Option<TransportTier>>,
    subscriptions: std::sync::Mutex<Vec<String>>,
    session: Mutex<Option<Session>>,
}

impl ManagerInner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
        }
    }

    fn set_tier(&self, tier: Option<TransportTier>) {
        let previous = self.tier.send_replace(tier);
        if let Some(tier) = tier.filter(|t| previous != Some(*t)) {
            info!(%tier, "live transport changed");
            self.dispatcher.emit(SyncEvent::TransportChanged { tier });
        }
    }

    /// CLOSED + `connected = false`, after any failure or close.
    fn mark_closed(&self) {
        self.set_state(ConnectionState::Closed);
        self.dispatcher.connection_status(false);
    }

    /// The session stopped without `disconnect()`: no tier carries updates
    /// any more and consumers get one terminal event.
    fn end_session(&self, reason: SessionEnd) {
        self.tier.send_replace(None);
        self.set_state(ConnectionState::Closed);
        info!(%reason, "session ended");
        self.dispatcher.emit(SyncEvent::SessionEnded { reason });
    }
}

/// Live-update session owner.
///
/// Cheaply cloneable. At most one session exists at a time; callbacks and
/// the event stream are shared by every clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Build a manager around an arbitrary dialer. `source` enables the
    /// polling fallback.
    pub fn new(
        config: SyncConfig,
        dialer: Arc<dyn Dialer>,
        source: Option<Arc<dyn DeviceSource>>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (tier, _) = watch::channel(None);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                dialer,
                source,
                dispatcher: Arc::new(Dispatcher::new()),
                state,
                tier,
                subscriptions: std::sync::Mutex::new(Vec::new()),
                session: Mutex::new(None),
            }),
        }
    }

    /// Manager wired to the real backend: WebSocket tiers dial with the
    /// client's token, polling reads `GET /api/devices`.
    pub fn for_backend(config: SyncConfig, api: Arc<ApiClient>) -> Self {
        let dialer = Arc::new(WebSocketDialer::new(
            api.token_source(),
            config.channel_options(),
        ));
        Self::new(config, dialer, Some(api))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start a session for `identity`.
    ///
    /// No-op while a session for the same identity is connecting, open,
    /// waiting to reconnect, or polling. A different identity tears the
    /// current session down first.
    pub async fn connect(&self, identity: SessionIdentity) {
        let mut session = self.inner.session.lock().await;

        if let Some(current) = session.as_ref() {
            if current.identity == identity && !current.task.is_finished() {
                debug!(tenant = %identity.tenant, "session already active");
                return;
            }
        }
        if let Some(previous) = session.take() {
            if previous.identity != identity {
                info!(
                    from = %previous.identity.tenant,
                    to = %identity.tenant,
                    "session identity changed, reconnecting"
                );
            }
            self.teardown(previous).await;
        }

        let destinations: Vec<String> = self
            .inner
            .config
            .topics
            .iter()
            .map(|topic| topic.destination(&identity.tenant))
            .collect();
        *self
            .inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = destinations.clone();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            Arc::clone(&self.inner),
            identity.clone(),
            destinations,
            cancel.clone(),
        ));
        *session = Some(Session {
            identity,
            cancel,
            task,
        });
    }

    /// Close the session with a normal status, cancel any pending
    /// reconnect, and clear subscriptions. Idempotent.
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;
        match session.take() {
            Some(current) => self.teardown(current).await,
            None => debug!("disconnect: no active session"),
        }
    }

    async fn teardown(&self, session: Session) {
        self.inner.set_state(ConnectionState::Closing);
        session.cancel.cancel();
        if let Err(e) = session.task.await {
            warn!(error = %e, "session task ended abnormally");
        }
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.tier.send_replace(None);
        self.inner.mark_closed();
        debug!("disconnected");
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Register typed callbacks, replacing any previous handler.
    pub fn set_handler(&self, handler: Arc<dyn SyncHandler>) {
        self.inner.dispatcher.set_handler(Some(handler));
    }

    /// Keep a device cache consistent with live events for `owner`.
    pub fn bind_device_cache(&self, store: Arc<CacheStore<Device>>, owner: OwnerKey) {
        self.inner.dispatcher.bind_cache(store, owner);
    }

    /// Every session event, in dispatch order.
    pub fn events(&self) -> broadcast::Receiver<Arc<SyncEvent>> {
        self.inner.dispatcher.subscribe()
    }

    /// [`events`](Self::events) as a `Stream`.
    pub fn event_stream(&self) -> SyncEventStream {
        SyncEventStream::new(self.events())
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn state_stream(&self) -> ConnectionStateStream {
        ConnectionStateStream::new(self.connection_state())
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Open
    }

    /// Tier currently carrying updates, `None` when idle.
    pub fn transport_tier(&self) -> Option<TransportTier> {
        *self.inner.tier.borrow()
    }

    /// Destinations re-issued after every open.
    pub fn active_topics(&self) -> Vec<String> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }
}

// ── Session task ─────────────────────────────────────────────────────

fn live_tiers(preference: TransportPreference) -> &'static [TransportTier] {
    match preference {
        TransportPreference::Auto => &[TransportTier::Stomp, TransportTier::RawSocket],
        TransportPreference::Stomp => &[TransportTier::Stomp],
        TransportPreference::Raw => &[TransportTier::RawSocket],
        TransportPreference::Polling => &[],
    }
}

async fn run_session(
    inner: Arc<ManagerInner>,
    identity: SessionIdentity,
    destinations: Vec<String>,
    cancel: CancellationToken,
) {
    let tiers = live_tiers(inner.config.transport);
    let mut backoff = Backoff::new(inner.config.reconnect);
    let mut index = 0;

    while let Some(&tier) = tiers.get(index) {
        inner.set_state(ConnectionState::Connecting);
        debug!(%tier, attempt = backoff.attempts(), "dialing live channel");

        match run_channel(&inner, tier, &identity, &destinations, &mut backoff, &cancel).await {
            ChannelOutcome::Cancelled => return,
            ChannelOutcome::Closed => {
                info!(%tier, "live channel closed by server");
                inner.mark_closed();
                inner.end_session(SessionEnd::ServerClosed);
                return;
            }
            ChannelOutcome::Refused(e) => {
                warn!(%tier, error = %e, "transport refused, trying next tier");
                inner.mark_closed();
                index += 1;
                continue;
            }
            ChannelOutcome::Dropped { error, opened } => {
                warn!(%tier, error = %error, "live channel failed");
                inner.mark_closed();

                // The raw variant gets a single chance in automatic mode.
                if tier == TransportTier::RawSocket
                    && inner.config.transport == TransportPreference::Auto
                    && !opened
                {
                    index = tiers.len();
                    continue;
                }
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                %tier,
                attempts = backoff.attempts(),
                "reconnect attempts exhausted"
            );
            break;
        };
        info!(
            %tier,
            attempt = backoff.attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }

    run_polling(&inner, &identity, &cancel).await;
}

async fn run_channel(
    inner: &ManagerInner,
    tier: TransportTier,
    identity: &SessionIdentity,
    destinations: &[String],
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> ChannelOutcome {
    let dialed = tokio::select! {
        biased;
        () = cancel.cancelled() => return ChannelOutcome::Cancelled,
        dialed = inner.dialer.dial(tier, identity) => dialed,
    };
    let mut channel: Box<dyn LiveChannel> = match dialed {
        Ok(channel) => channel,
        Err(e) if e.is_handshake() => return ChannelOutcome::Refused(e),
        Err(error) => {
            return ChannelOutcome::Dropped {
                error,
                opened: false,
            };
        }
    };

    backoff.reset();
    inner.set_state(ConnectionState::Open);
    inner.set_tier(Some(tier));

    if let Err(error) = channel.subscribe(destinations).await {
        channel.close().await;
        return ChannelOutcome::Dropped {
            error,
            opened: true,
        };
    }
    info!(%tier, topics = destinations.len(), "live channel open");
    inner.dispatcher.connection_status(true);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                channel.close().await;
                return ChannelOutcome::Cancelled;
            }
            message = channel.next_message() => match message {
                Ok(Some(message)) => inner.dispatcher.dispatch_message(&message),
                Ok(None) => return ChannelOutcome::Closed,
                Err(error) => return ChannelOutcome::Dropped { error, opened: true },
            },
        }
    }
}

async fn run_polling(
    inner: &Arc<ManagerInner>,
    identity: &SessionIdentity,
    cancel: &CancellationToken,
) {
    // Polling-only sessions poll regardless of the fallback switch.
    let allowed = inner.config.polling_fallback
        || inner.config.transport == TransportPreference::Polling;
    let source = match (&inner.source, allowed) {
        (Some(source), true) => Arc::clone(source),
        (None, true) => {
            error!("live transports exhausted and no polling source configured");
            inner.end_session(SessionEnd::Exhausted);
            return;
        }
        (_, false) => {
            error!("live transports exhausted, polling fallback disabled");
            inner.end_session(SessionEnd::Exhausted);
            return;
        }
    };

    let dispatcher = Arc::clone(&inner.dispatcher);
    let sink: EventSink = Arc::new(move |event: SyncEvent| dispatcher.emit(event));
    let poller = PollingChannel::new(source, inner.config.poll_interval, sink);

    inner.set_tier(Some(TransportTier::Polling));
    poller.start(identity);
    info!(
        interval_secs = inner.config.poll_interval.as_secs(),
        "degraded to polling"
    );

    cancel.cancelled().await;
    poller.stop().await;
}
