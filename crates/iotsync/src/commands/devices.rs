//! Device command handlers.

use std::sync::Arc;

use tabled::Tabled;

use iotsync_core::{CacheStore, Device, DeviceFeed, DeviceStatus};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config::BackendContext;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

fn row(d: &Device, color: bool) -> DeviceRow {
    DeviceRow {
        id: d.id.clone(),
        name: d.name.clone(),
        status: output::status_label(d.status, color),
        location: d.location.clone().unwrap_or_default(),
        model: d.model.clone().unwrap_or_default(),
        last_seen: d
            .last_seen
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
    }
}

fn detail(d: &Device) -> String {
    let or_dash = |v: Option<&str>| v.unwrap_or("-").to_owned();
    [
        format!("ID:           {}", d.id),
        format!("Name:         {}", d.name),
        format!("Status:       {}", d.status),
        format!("Location:     {}", or_dash(d.location.as_deref())),
        format!("Manufacturer: {}", or_dash(d.manufacturer.as_deref())),
        format!("Model:        {}", or_dash(d.model.as_deref())),
        format!(
            "Last seen:    {}",
            d.last_seen.map_or_else(|| "-".into(), |t| t.to_rfc3339())
        ),
    ]
    .join("\n")
}

pub async fn handle(
    ctx: &BackendContext,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let feed = DeviceFeed::new(
        Arc::clone(&ctx.api),
        Arc::new(CacheStore::new(ctx.sync.cache_ttl)),
    );
    let devices = feed.list(&ctx.owner).await?;

    match args.command {
        DevicesCommand::List { status } => {
            let wanted = status.as_deref().map(DeviceStatus::from_wire);
            let filtered: Vec<Device> = devices
                .iter()
                .filter(|d| wanted.is_none_or(|s| d.status == s))
                .cloned()
                .collect();
            let color = output::should_color(&global.color);
            let out = output::render_list(
                &global.output,
                &filtered,
                |d| row(d, color),
                |d| d.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
        }
        DevicesCommand::Get { id } => {
            let device = devices
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "device".into(),
                    identifier: id.clone(),
                    list_command: "devices list".into(),
                })?;
            let out = output::render_single(&global.output, device, detail, |d| d.id.clone())?;
            output::print_output(&out, global.quiet);
        }
    }
    Ok(())
}
