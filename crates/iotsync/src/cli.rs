//! Clap derive structures for the `iotsync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// iotsync -- live device updates and onboarding from the command line
#[derive(Debug, Parser)]
#[command(
    name = "iotsync",
    version,
    about = "Watch and manage IoT devices from the command line",
    long_about = "Follows live device updates over STOMP or a raw WebSocket, \
        falling back to polling when neither is available,\n\
        and onboards devices with streamed pipeline progress.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "IOTSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 'b', env = "IOTSYNC_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Organization id (overrides profile)
    #[arg(long, env = "IOTSYNC_ORGANIZATION", global = true)]
    pub organization: Option<String>,

    /// Bearer token
    #[arg(long, env = "IOTSYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "IOTSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "IOTSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "IOTSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow live device events until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Show aggregate device counters
    Stats,

    /// List and acknowledge notifications
    #[command(alias = "notif", alias = "n")]
    Notifications(NotificationsArgs),

    /// Onboard a device with streamed progress
    Onboard(OnboardArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TransportArg {
    /// STOMP, then raw socket, then polling
    Auto,
    /// STOMP over WebSocket only
    Stomp,
    /// Raw JSON WebSocket only
    Raw,
    /// Periodic polling only
    Polling,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TopicArg {
    Status,
    Created,
    Deleted,
    Stats,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Transport preference (overrides profile)
    #[arg(long, short = 't')]
    pub transport: Option<TransportArg>,

    /// Topics to subscribe to (repeatable; default: all)
    #[arg(long = "topic", value_delimiter = ',')]
    pub topics: Vec<TopicArg>,

    /// Polling interval in seconds when polling
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Do not fall back to polling once live transports are exhausted
    #[arg(long)]
    pub no_polling: bool,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices of the organization
    #[command(alias = "ls")]
    List {
        /// Only devices with this status (e.g. online, offline)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one device
    Get {
        /// Device id
        id: String,
    },
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NotificationsArgs {
    #[command(subcommand)]
    pub command: NotificationsCommand,
}

#[derive(Debug, Subcommand)]
pub enum NotificationsCommand {
    /// List notifications
    #[command(alias = "ls")]
    List {
        /// Only unread notifications
        #[arg(long, short = 'u')]
        unread: bool,
    },

    /// Mark one notification as read
    MarkRead {
        /// Notification id
        id: String,
    },

    /// Mark every notification as read
    MarkAllRead,

    /// Print the unread count
    Unread,
}

// ── Onboard ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct OnboardArgs {
    /// Device name
    #[arg(long, short = 'n', required_unless_present = "data")]
    pub name: Option<String>,

    /// Full device payload as a JSON file (name/location/etc.)
    #[arg(long, short = 'd')]
    pub data: Option<PathBuf>,

    /// Operating manual (PDF)
    #[arg(long)]
    pub manual: Option<PathBuf>,

    /// Datasheet (PDF)
    #[arg(long)]
    pub datasheet: Option<PathBuf>,

    /// Certificate (PDF)
    #[arg(long)]
    pub certificate: Option<PathBuf>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the configuration (secrets redacted)
    Show,

    /// List profile names
    Profiles,

    /// Create or replace a profile
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Backend URL
        #[arg(long)]
        backend: String,

        /// Organization id
        #[arg(long)]
        organization: String,

        /// User id (cache partition)
        #[arg(long)]
        user: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Set a key on the active profile
    Set {
        /// Config key (e.g., backend, organization, transport, poll_interval)
        key: String,

        /// Value to set
        value: String,
    },

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile name (default: active profile)
        #[arg(long)]
        name: Option<String>,
    },

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
