// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization code + PKCE flow over the loopback listener.

use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::credential::callback::CallbackListener;
use crate::credential::exchange::TokenClient;
use crate::credential::pkce::{build_auth_url, generate_challenge, generate_state};
use crate::credential::{
    AuthToken, RemoteConfig, AUTHORIZATION_WAIT, LOOPBACK_PORT, LOOPBACK_REDIRECT_URI,
    SHUTDOWN_GRACE,
};
use crate::error::AuthError;

/// Where the listener binds and how long it waits.
#[derive(Debug, Clone)]
pub struct LoopbackSettings {
    pub bind_addr: SocketAddr,
    pub wait: Duration,
    pub shutdown_grace: Duration,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], LOOPBACK_PORT)),
            wait: AUTHORIZATION_WAIT,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

/// Run the browser flow, printing the authorization URL to stdout and, when
/// `open_browser` is set, opening it in the default browser.
pub async fn fetch_token(
    client: &TokenClient,
    cfg: &RemoteConfig,
    settings: &LoopbackSettings,
    open_browser: bool,
    cancel: &CancellationToken,
) -> Result<AuthToken, AuthError> {
    fetch_token_with(client, cfg, settings, cancel, |url| {
        present_auth_url(url, open_browser, |url| open::that(url))
    })
    .await
}

/// Run the browser flow, handing the authorization URL to `show`.
///
/// `show` is called exactly once, before waiting, even when the listener
/// fails to bind, so the user can still attempt the URL manually.
pub async fn fetch_token_with<F>(
    client: &TokenClient,
    cfg: &RemoteConfig,
    settings: &LoopbackSettings,
    cancel: &CancellationToken,
    show: F,
) -> Result<AuthToken, AuthError>
where
    F: FnOnce(&str),
{
    info!("fetching authentication token");

    let state = generate_state();
    let pkce = generate_challenge();
    let auth_url = build_auth_url(
        &client.endpoints(cfg).authorize_url,
        cfg,
        LOOPBACK_REDIRECT_URI,
        &state,
        Some(&pkce),
    );

    let bound = CallbackListener::bind(settings.bind_addr).await;
    show(&auth_url);
    let mut listener = bound?;

    let waited = listener.wait_for_code(settings.wait, cancel).await;
    listener.shutdown_within(settings.shutdown_grace).await;
    let code = waited?;

    tokio::select! {
        token = client.exchange_authorization_code(cfg, &code, &pkce.verifier) => token,
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
    }
}

/// Print the URL, then hand it to `opener` unless `open_browser` is off.
/// A failed open leaves the printed URL for the user.
fn present_auth_url<O>(url: &str, open_browser: bool, opener: O)
where
    O: FnOnce(&str) -> std::io::Result<()>,
{
    print_auth_url(url);
    if !open_browser {
        return;
    }
    match opener(url) {
        Ok(()) => info!("opened authorization URL in browser"),
        Err(e) => warn!(err = %e, "failed to open browser, visit the URL manually"),
    }
}

fn print_auth_url(url: &str) {
    println!("\nPlease visit the following URL in your browser to authenticate:");
    println!("{url}");
}

#[cfg(test)]
#[path = "loopback_tests.rs"]
mod tests;
