//! Notification command handlers.

use std::sync::Arc;

use tabled::Tabled;

use iotsync_core::{CacheStore, Notification, NotificationFeed};

use crate::cli::{GlobalOpts, NotificationsArgs, NotificationsCommand};
use crate::config::BackendContext;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Read")]
    read: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            kind: n.kind.to_string(),
            title: n.title.clone(),
            device: n.device_id.clone().unwrap_or_default(),
            read: if n.read { "yes" } else { "" }.into(),
            created: n
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        }
    }
}

pub async fn handle(
    ctx: &BackendContext,
    args: NotificationsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let feed = NotificationFeed::new(Arc::clone(&ctx.api), CacheStore::new(ctx.sync.cache_ttl));

    match args.command {
        NotificationsCommand::List { unread } => {
            let all = feed.list(&ctx.owner).await?;
            let shown: Vec<Notification> =
                all.iter().filter(|n| !unread || !n.read).cloned().collect();
            let out = output::render_list(
                &global.output,
                &shown,
                |n| NotificationRow::from(n),
                |n| n.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
        }
        NotificationsCommand::MarkRead { id } => {
            feed.mark_read(&ctx.owner, &id).await?;
            tracing::info!(notification = %id, "marked read");
        }
        NotificationsCommand::MarkAllRead => {
            feed.mark_all_read(&ctx.owner).await?;
            tracing::info!("marked all notifications read");
        }
        NotificationsCommand::Unread => {
            let count = feed.unread_count().await?;
            output::print_output(&count.to_string(), global.quiet);
        }
    }
    Ok(())
}
