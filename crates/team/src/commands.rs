// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand dispatch.

use std::io::Write;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Command, Config, ConfigureArgs};
use crate::credential::device_code::DeviceCodePrompt;
use crate::credential::exchange::TokenClient;
use crate::credential::lifecycle::TokenLifecycle;
use crate::credential::{AuthFlow, AuthToken, RemoteConfig};
use crate::error::AuthError;
use crate::prompt::StdinPrompt;
use crate::store::FileConfigStore;
use crate::update;

pub type Lifecycle<P> = TokenLifecycle<FileConfigStore, P>;

/// Run the parsed command against the on-disk config.
pub async fn run(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let store = FileConfigStore::new(config.config_path()?);
    info!(path = %store.path().display(), "using config file");
    let lc = TokenLifecycle::new(TokenClient::new()?, store, StdinPrompt);

    if let Some(ref url) = config.update_url {
        notify_update(url).await;
    }

    // Unlocked handle: the device-code prompt writes to stdout from another thread.
    execute(&config.command, &lc, &cancel, &mut std::io::stdout()).await
}

/// Execute one subcommand, writing user-facing output to `out`.
pub async fn execute<P: DeviceCodePrompt>(
    command: &Command,
    lc: &Lifecycle<P>,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Configure(args) => configure(args, lc, cancel, out).await,
        Command::Login => {
            let stored = lc.store().load_stored()?;
            let flow = stored.auth_flow();
            let cfg = require_server_config(stored.server_config)?;
            lc.reauthenticate(&cfg, flow, cancel).await?;
            writeln!(out, "Logged in to {}", cfg.oauth_domain)?;
            Ok(())
        }
        Command::Logout => {
            lc.store().update(|s| s.auth_token = None)?;
            writeln!(out, "Logged out")?;
            Ok(())
        }
        Command::Whoami => {
            let token = authenticated(lc, cancel).await?;
            whoami(&token, out)
        }
        Command::Token => {
            let token = authenticated(lc, cancel).await?;
            writeln!(out, "{}", token.access_token)?;
            Ok(())
        }
    }
}

/// Pre-run hook for commands that need a token.
pub async fn authenticated<P: DeviceCodePrompt>(
    lc: &Lifecycle<P>,
    cancel: &CancellationToken,
) -> anyhow::Result<AuthToken> {
    let flow = lc.store().load_stored()?.auth_flow();
    lc.acquire_stored_token(flow, cancel).await
}

async fn configure<P: DeviceCodePrompt>(
    args: &ConfigureArgs,
    lc: &Lifecycle<P>,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let cfg = args.remote_config();
    cfg.validate()?;

    let no_browser = !args.opens_browser();
    let flow = AuthFlow::from_settings(args.device_code, no_browser);
    info!(domain = %cfg.oauth_domain, %flow, "configuring");
    lc.reauthenticate(&cfg, flow, cancel).await?;
    lc.store().update(|s| {
        s.use_device_code = args.device_code;
        s.no_browser = no_browser;
    })?;

    writeln!(out, "Configured {} and logged in", cfg.oauth_domain)?;
    Ok(())
}

fn require_server_config(cfg: Option<RemoteConfig>) -> Result<RemoteConfig, AuthError> {
    let cfg = cfg.ok_or_else(|| AuthError::ConfigInvalid("no server config saved".into()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn whoami(token: &AuthToken, out: &mut impl Write) -> anyhow::Result<()> {
    let expires = format_remaining(token.expires_in_secs(Utc::now()));
    match token.identity_claims() {
        Ok(claims) => {
            let groups = claims.groups();
            writeln!(out, "User ID: {}", claims.user_id)?;
            if groups.is_empty() {
                writeln!(out, "Groups: (none)")?;
            } else {
                writeln!(out, "Groups: {}", groups.join(", "))?;
            }
            writeln!(out, "Email: {}", claims.email_address().unwrap_or("(unknown)"))?;
        }
        Err(e) if e.is_claims_error() => {
            warn!(err = %e, "failed to decode identity claims");
            writeln!(out, "Identity: (unavailable)")?;
        }
        Err(e) => return Err(e.into()),
    }
    writeln!(out, "Token expires in: {expires}")?;
    Ok(())
}

async fn notify_update(url: &str) {
    let current = env!("CARGO_PKG_VERSION");
    match update::check_for_update(url, current).await {
        Ok(Some(tag)) => {
            eprintln!("A newer version of team-cli is available: {tag} (running v{current})");
        }
        Ok(None) => info!("team-cli is up to date"),
        Err(e) => warn!(err = %e, "update check failed"),
    }
}

/// Print a failed command's error chain, with a hint when re-running may help.
pub fn report_failure(err: &anyhow::Error, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "error: {err:#}")?;
    if let Some(auth) = err.downcast_ref::<AuthError>() {
        debug!(code = auth.as_str(), "command failed");
        if auth.is_retryable() {
            writeln!(out, "This may be temporary; run the command again.")?;
        }
    }
    Ok(())
}

/// `1h 5m 3s`, dropping leading zero units.
pub fn format_remaining(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
