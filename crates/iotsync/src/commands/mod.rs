//! Command handlers, one module per top-level subcommand.

pub mod config_cmd;
pub mod devices;
pub mod notifications;
pub mod onboard;
pub mod stats;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::BackendContext;
use crate::error::CliError;

/// Route a backend-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    ctx: &BackendContext,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(ctx, args, global).await,
        Command::Devices(args) => devices::handle(ctx, args, global).await,
        Command::Stats => stats::handle(ctx, global).await,
        Command::Notifications(args) => notifications::handle(ctx, args, global).await,
        Command::Onboard(args) => onboard::handle(ctx, args, global).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
