//! Live event watcher: runs a connection manager until Ctrl-C or until the
//! session gives up on its own.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use iotsync_core::{
    CacheStore, ConnectionManager, CoreError, Device, DeviceFeed, InboundEvent, SessionEnd,
    SessionIdentity, SubscriptionTopic, SyncEvent, TransportPreference,
};

use crate::cli::{GlobalOpts, OutputFormat, TopicArg, TransportArg, WatchArgs};
use crate::config::BackendContext;
use crate::error::CliError;
use crate::output;

fn preference(arg: TransportArg) -> TransportPreference {
    match arg {
        TransportArg::Auto => TransportPreference::Auto,
        TransportArg::Stomp => TransportPreference::Stomp,
        TransportArg::Raw => TransportPreference::Raw,
        TransportArg::Polling => TransportPreference::Polling,
    }
}

fn topic(arg: TopicArg) -> SubscriptionTopic {
    match arg {
        TopicArg::Status => SubscriptionTopic::Status,
        TopicArg::Created => SubscriptionTopic::Created,
        TopicArg::Deleted => SubscriptionTopic::Deleted,
        TopicArg::Stats => SubscriptionTopic::Stats,
    }
}

fn session_error(reason: SessionEnd) -> CliError {
    let reason = match reason {
        SessionEnd::ServerClosed => "server closed the live connection",
        SessionEnd::Exhausted => "live transports exhausted and polling unavailable",
    };
    CliError::ConnectionFailed {
        reason: reason.into(),
    }
}

/// One human-readable line per event. `known` is the cached device list,
/// used to name devices the payload leaves anonymous.
fn describe(event: &SyncEvent, known: Option<&[Device]>, color: bool) -> String {
    let name_of = |id: &str| {
        known
            .and_then(|devices| devices.iter().find(|d| d.id == id))
            .map(|d| d.name.clone())
    };
    let tally = known.map_or_else(String::new, |devices| {
        format!(", {} known", devices.len())
    });

    match event {
        SyncEvent::ConnectionStatus { connected: true } => "connected".into(),
        SyncEvent::ConnectionStatus { connected: false } => "disconnected".into(),
        SyncEvent::TransportChanged { tier } => format!("transport: {tier}"),
        SyncEvent::PollFailed { message } => format!("poll failed: {message}"),
        SyncEvent::SessionEnded { reason } => format!("session ended: {reason}"),
        SyncEvent::DevicesRemoved { previous, current } => format!(
            "{} device(s) removed ({previous} -> {current})",
            previous.saturating_sub(*current)
        ),
        SyncEvent::Inbound(inbound) => match inbound {
            InboundEvent::DeviceStatusChanged {
                device_id,
                status,
                device_name,
                ..
            } => format!(
                "{} is now {}",
                device_name
                    .clone()
                    .or_else(|| name_of(device_id.as_str()))
                    .unwrap_or_else(|| device_id.clone()),
                output::status_label(*status, color)
            ),
            InboundEvent::DeviceCreated { device } => {
                format!("device created: {} ({}{tally})", device.name, device.id)
            }
            InboundEvent::DeviceDeleted {
                device_id,
                device_name,
            } => match device_name {
                Some(name) => format!("device deleted: {name} ({device_id}{tally})"),
                None => match known {
                    Some(devices) => {
                        format!("device deleted: {device_id} ({} known)", devices.len())
                    }
                    None => format!("device deleted: {device_id}"),
                },
            },
            InboundEvent::StatsUpdated { stats } => format!(
                "stats: total={} online={} offline={} warning={} error={}",
                stats.total, stats.online, stats.offline, stats.warning, stats.error
            ),
        },
    }
}

fn render(
    event: &SyncEvent,
    known: Option<&[Device]>,
    format: &OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    match format {
        // One document per line so the output can be piped.
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(event),
        OutputFormat::Yaml => Ok(format!("---\n{}", output::render_yaml(event)?.trim_end())),
        OutputFormat::Table | OutputFormat::Plain => Ok(format!(
            "{} {}",
            chrono::Local::now().format("%H:%M:%S"),
            describe(event, known, color)
        )),
    }
}

pub async fn handle(
    ctx: &BackendContext,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut sync = ctx.sync.clone();
    if let Some(transport) = args.transport {
        sync.transport = preference(transport);
    }
    if !args.topics.is_empty() {
        sync.topics = args.topics.iter().copied().map(topic).collect();
    }
    if let Some(secs) = args.poll_interval {
        sync.poll_interval = Duration::from_secs(secs.max(1));
    }
    if args.no_polling {
        sync.polling_fallback = false;
    }

    let cache = Arc::new(CacheStore::new(sync.cache_ttl));
    let feed = DeviceFeed::new(Arc::clone(&ctx.api), Arc::clone(&cache));
    // Without a baseline, live events have nothing to patch.
    if let Err(e) = feed.refresh(&ctx.owner).await {
        tracing::warn!(error = %e, "device list unavailable, names limited to event payloads");
    }
    let manager = ConnectionManager::for_backend(sync, Arc::clone(&ctx.api));
    manager.bind_device_cache(cache, ctx.owner.clone());

    let endpoint = ctx.api.websocket_url().map_err(CoreError::from)?;
    let mut events = manager.event_stream();
    manager
        .connect(SessionIdentity::new(ctx.organization.clone(), endpoint))
        .await;

    let color = output::should_color(&global.color);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ended = None;
    loop {
        tokio::select! {
            biased;
            result = &mut ctrl_c => {
                result?;
                tracing::info!("interrupted, closing session");
                break;
            }
            event = events.next() => {
                let Some(event) = event else { break };
                if matches!(*event, SyncEvent::DevicesRemoved { .. }) {
                    // Polling cannot tell which devices went away.
                    if let Err(e) = feed.refresh(&ctx.owner).await {
                        tracing::warn!(error = %e, "device list refresh failed");
                    }
                }
                let known = feed.cache().get(&ctx.owner);
                let known = known.as_deref().map(Vec::as_slice);
                let line = render(&event, known, &global.output, color)?;
                output::print_output(&line, global.quiet);

                if let SyncEvent::SessionEnded { reason } = *event {
                    ended = Some(reason);
                    break;
                }
            }
        }
    }

    manager.disconnect().await;
    ended.map_or(Ok(()), |reason| Err(session_error(reason)))
}
