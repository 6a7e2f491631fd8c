//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "backend = \"{}\"", p.backend);
        let _ = writeln!(out, "organization = \"{}\"", p.organization);
        if let Some(ref u) = p.user {
            let _ = writeln!(out, "user = \"{u}\"");
        }
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref t) = p.transport {
            let _ = writeln!(out, "transport = \"{t}\"");
        }
        if let Some(ref topics) = p.topics {
            let _ = writeln!(out, "topics = {topics:?}");
        }
        if let Some(v) = p.poll_interval {
            let _ = writeln!(out, "poll_interval = {v}");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
    }

    out
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn parse_value<T: std::str::FromStr>(
    key: &str,
    value: &str,
    expected: &str,
) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: key.into(),
        reason: format!("must be {expected}"),
    })
}

fn available(cfg: &Config) -> String {
    let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
    names.sort();
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

/// Apply one `config set` assignment.
fn set_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "backend" => profile.backend = value,
        "organization" => profile.organization = value,
        "user" => profile.user = Some(value),
        "token_env" | "token-env" => profile.token_env = Some(value),
        "transport" => {
            if !matches!(value.as_str(), "auto" | "stomp" | "raw" | "polling") {
                return Err(CliError::Validation {
                    field: "transport".into(),
                    reason: "must be 'auto', 'stomp', 'raw', or 'polling'".into(),
                });
            }
            profile.transport = Some(value);
        }
        "topics" => {
            profile.topics = Some(value.split(',').map(|t| t.trim().to_owned()).collect());
        }
        "poll_interval" | "poll-interval" => {
            profile.poll_interval = Some(parse_value(key, &value, "a number (seconds)")?);
        }
        "polling_fallback" | "polling-fallback" => {
            profile.polling_fallback = Some(parse_value(key, &value, "'true' or 'false'")?);
        }
        "insecure" => {
            profile.insecure = Some(parse_value(key, &value, "'true' or 'false'")?);
        }
        "timeout" => {
            profile.timeout = Some(parse_value(key, &value, "a number (seconds)")?);
        }
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: backend, organization, user, \
                     token_env, transport, topics, poll_interval, polling_fallback, insecure, \
                     timeout, ca_cert"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            for profile in cfg.profiles.values_mut() {
                if profile.token.is_some() {
                    profile.token = Some("****".into());
                }
            }
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: iotsync config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init {
            name,
            backend,
            organization,
            user,
            default,
        } => {
            let mut cfg = config::load_config_or_default();
            let profile = Profile {
                backend,
                organization,
                user,
                ..Profile::default()
            };
            // Reject unusable profiles before they hit disk.
            config::profile_to_sync_config(&profile, &cfg.defaults)?;

            cfg.profiles.insert(name.clone(), profile);
            if default || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }
            config::save_config(&cfg)?;
            eprintln!("✓ Profile '{name}' saved to {}", config::config_path().display());
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();

            set_key(profile, &key, value)?;

            config::save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── SetToken ────────────────────────────────────────────────
        ConfigCommand::SetToken { name } => {
            let cfg = config::load_config_or_default();
            let profile_name = name.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: available(&cfg),
                });
            }

            let token = rpassword::prompt_password("Token: ").map_err(prompt_err)?;
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            config::store_token(&profile_name, token.trim())?;
            eprintln!("✓ Token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }

        // ── Use <name> ──────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: available(&cfg),
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }
    }
}
