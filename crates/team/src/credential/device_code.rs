// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-code flow for headless sessions.
//!
//! The provider redirects the browser to a hosted page that displays a code;
//! the user types that code back into the CLI. No local listener and no PKCE
//! pair are involved.

use std::future::Future;

use tracing::info;

use crate::credential::exchange::TokenClient;
use crate::credential::pkce::{build_auth_url, generate_state};
use crate::credential::{AuthToken, RemoteConfig};
use crate::error::AuthError;

/// Asks the user for the code shown on the device-code page.
pub trait DeviceCodePrompt {
    /// `Ok(None)` means the user cancelled.
    fn prompt_device_code(&self) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;
}

/// Run the device-code flow, printing the authorization URL to stdout.
pub async fn fetch_token<P: DeviceCodePrompt>(
    client: &TokenClient,
    cfg: &RemoteConfig,
    prompt: &P,
) -> anyhow::Result<AuthToken> {
    fetch_token_with(client, cfg, prompt, print_auth_url).await
}

/// Run the device-code flow, handing the authorization URL to `show`.
pub async fn fetch_token_with<P, F>(
    client: &TokenClient,
    cfg: &RemoteConfig,
    prompt: &P,
    show: F,
) -> anyhow::Result<AuthToken>
where
    P: DeviceCodePrompt,
    F: FnOnce(&str),
{
    info!("fetching authentication token via device code");

    let page = cfg.device_code_page.as_deref().filter(|p| !p.is_empty()).ok_or_else(|| {
        AuthError::ConfigInvalid("device code flow needs a device code page".into())
    })?;

    let state = generate_state();
    let auth_url = build_auth_url(&client.endpoints(cfg).authorize_url, cfg, page, &state, None);
    show(&auth_url);

    let code = prompt
        .prompt_device_code()
        .await?
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::PromptCancelled)?;

    Ok(client.exchange_device_code(cfg, &code).await?)
}

fn print_auth_url(url: &str) {
    println!("\nPlease visit the following URL in your browser, then enter the code it shows:");
    println!("{url}");
}

#[cfg(test)]
#[path = "device_code_tests.rs"]
mod tests;
