// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::credential::{RemoteConfig, RESPONSE_TYPE_CODE};

/// CLI wrapper for requesting temporary elevated access through TEAM.
#[derive(Debug, Parser)]
#[command(name = "team-cli", version, about)]
pub struct Config {
    /// Increase verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log format (json or text).
    #[arg(long, env = "TEAM_CLI_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Path to the config file.
    #[arg(long, env = "TEAM_CLI_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Release metadata URL to check for a newer version.
    #[arg(long, env = "TEAM_CLI_UPDATE_URL", global = true)]
    pub update_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Configure the TEAM server and sign in.
    Configure(ConfigureArgs),
    /// Sign in again, ignoring any cached token.
    Login,
    /// Forget the cached token.
    Logout,
    /// Show the identity of the signed-in user.
    Whoami,
    /// Print a valid access token.
    Token,
}

#[derive(Debug, clap::Args)]
pub struct ConfigureArgs {
    /// OAuth domain of the identity provider (host only).
    #[arg(long)]
    pub oauth_domain: String,

    /// User pool app client id.
    #[arg(long)]
    pub client_id: String,

    /// OAuth response type.
    #[arg(long, default_value = RESPONSE_TYPE_CODE)]
    pub response_type: String,

    /// Requested scope (repeatable, order preserved).
    #[arg(long = "scope", default_values = ["openid", "email", "profile"])]
    pub scopes: Vec<String>,

    /// GraphQL endpoint of the TEAM API.
    #[arg(long, default_value = "")]
    pub graphql_endpoint: String,

    /// Hosted page that displays device codes.
    #[arg(long)]
    pub device_code_page: Option<String>,

    /// Do not open the browser automatically.
    #[arg(short = 'b', long)]
    pub no_browser: bool,

    /// Use the device code flow instead of the local browser callback.
    /// Implies --no-browser.
    #[arg(short, long)]
    pub device_code: bool,
}

impl ConfigureArgs {
    pub fn opens_browser(&self) -> bool {
        !(self.no_browser || self.device_code)
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            oauth_domain: self.oauth_domain.trim().to_owned(),
            user_pool_client_id: self.client_id.trim().to_owned(),
            oauth_response_type: self.response_type.clone(),
            oauth_scopes: self.scopes.clone(),
            graphql_endpoint: self.graphql_endpoint.clone(),
            device_code_page: self.device_code_page.clone(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other} (expected json or text)"),
        }
        if let Command::Configure(ref args) = self.command {
            let has_page = args.device_code_page.as_deref().is_some_and(|p| !p.is_empty());
            if args.device_code && !has_page {
                anyhow::bail!("--device-code requires --device-code-page");
            }
        }
        Ok(())
    }

    /// Default tracing filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    /// Config file location: `--config`, else `$HOME/.config/team-cli/config.json`.
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref path) = self.config {
            return Ok(path.clone());
        }
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("failed to get user dir"))?;
        Ok(PathBuf::from(home).join(".config/team-cli/config.json"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
