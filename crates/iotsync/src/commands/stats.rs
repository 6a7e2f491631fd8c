//! Statistics command handler.

use std::sync::Arc;

use iotsync_core::{CacheStore, DeviceFeed, DeviceStats};

use crate::cli::GlobalOpts;
use crate::config::BackendContext;
use crate::error::CliError;
use crate::output;

fn detail(s: &DeviceStats) -> String {
    [
        format!("Total:   {}", s.total),
        format!("Online:  {}", s.online),
        format!("Offline: {}", s.offline),
        format!("Warning: {}", s.warning),
        format!("Error:   {}", s.error),
    ]
    .join("\n")
}

pub async fn handle(ctx: &BackendContext, global: &GlobalOpts) -> Result<(), CliError> {
    // Counters are read uncached; the store is only a constructor argument.
    let feed = DeviceFeed::new(Arc::clone(&ctx.api), Arc::new(CacheStore::new(ctx.sync.cache_ttl)));
    let stats = feed.stats().await?;

    let out = output::render_single(&global.output, &stats, detail, |s| {
        format!("{} {}", s.online, s.total)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
