// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reuse, refresh, or reauthenticate: the policy behind every command that
//! needs a token.

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::credential::device_code::{self, DeviceCodePrompt};
use crate::credential::exchange::TokenClient;
use crate::credential::loopback::{self, LoopbackSettings};
use crate::credential::{AuthFlow, AuthToken, RemoteConfig, EXPIRY_MARGIN};
use crate::error::AuthError;

/// Persistence collaborator for the server config and its token.
pub trait ConfigStore {
    fn load(&self) -> anyhow::Result<(Option<RemoteConfig>, Option<AuthToken>)>;
    fn save(&self, cfg: &RemoteConfig, token: &AuthToken) -> anyhow::Result<()>;
}

/// What the cached token allows without user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Outside the expiry margin; use as-is.
    Valid,
    /// Stale but carries a refresh token.
    Refreshable,
    /// Absent, or stale with nothing to refresh it with.
    ExpiredNoRefresh,
}

impl TokenState {
    pub fn classify(cached: Option<&AuthToken>, now: DateTime<Utc>) -> Self {
        let Some(token) = cached else {
            return Self::ExpiredNoRefresh;
        };
        let margin = TimeDelta::from_std(EXPIRY_MARGIN).unwrap_or_default();
        if token.expires_at - now > margin {
            Self::Valid
        } else if token.has_refresh_token() {
            Self::Refreshable
        } else {
            Self::ExpiredNoRefresh
        }
    }
}

/// Token lifecycle orchestrator.
pub struct TokenLifecycle<S, P> {
    client: TokenClient,
    store: S,
    prompt: P,
    loopback: LoopbackSettings,
}

impl<S: ConfigStore, P: DeviceCodePrompt> TokenLifecycle<S, P> {
    pub fn new(client: TokenClient, store: S, prompt: P) -> Self {
        Self { client, store, prompt, loopback: LoopbackSettings::default() }
    }

    pub fn with_loopback(mut self, loopback: LoopbackSettings) -> Self {
        self.loopback = loopback;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return a token valid for at least the expiry margin.
    ///
    /// At most one refresh and one full reauthentication per call. A failed
    /// refresh falls through to reauthentication; every new token is saved
    /// before it is returned.
    pub async fn acquire_valid_token(
        &self,
        cfg: &RemoteConfig,
        cached: Option<&AuthToken>,
        flow: AuthFlow,
        cancel: &CancellationToken,
    ) -> anyhow::Result<AuthToken> {
        cfg.validate()?;

        match (TokenState::classify(cached, Utc::now()), cached) {
            (TokenState::Valid, Some(token)) => {
                info!("existing auth token is valid");
                return Ok(token.clone());
            }
            (TokenState::Refreshable, Some(token)) => {
                info!("existing auth token has expired, attempting to refresh");
                match self.refresh(cfg, token, cancel).await {
                    Ok(fresh) => {
                        info!("refreshed token");
                        self.persist(cfg, &fresh)?;
                        return Ok(fresh);
                    }
                    Err(AuthError::Cancelled) => return Err(AuthError::Cancelled.into()),
                    Err(e) => warn!(err = %e, "failed to refresh token"),
                }
            }
            _ => {}
        }

        info!("reauthentication required");
        self.reauthenticate(cfg, flow, cancel).await
    }

    /// Load the saved config and token from the store, then
    /// [`acquire_valid_token`](Self::acquire_valid_token).
    pub async fn acquire_stored_token(
        &self,
        flow: AuthFlow,
        cancel: &CancellationToken,
    ) -> anyhow::Result<AuthToken> {
        let (cfg, cached) = self.store.load()?;
        let cfg = cfg.ok_or_else(|| AuthError::ConfigInvalid("no server config saved".into()))?;
        self.acquire_valid_token(&cfg, cached.as_ref(), flow, cancel).await
    }

    /// Run the interactive flow unconditionally and save the result.
    pub async fn reauthenticate(
        &self,
        cfg: &RemoteConfig,
        flow: AuthFlow,
        cancel: &CancellationToken,
    ) -> anyhow::Result<AuthToken> {
        cfg.validate()?;

        let token = match flow {
            AuthFlow::Loopback { open_browser } => {
                loopback::fetch_token(&self.client, cfg, &self.loopback, open_browser, cancel)
                    .await
                    .context("failed to fetch new token")?
            }
            AuthFlow::DeviceCode => tokio::select! {
                token = device_code::fetch_token(&self.client, cfg, &self.prompt) => {
                    token.context("failed to fetch new token via device code")?
                }
                _ = cancel.cancelled() => return Err(AuthError::Cancelled.into()),
            },
        };

        self.persist(cfg, &token)?;
        Ok(token)
    }

    async fn refresh(
        &self,
        cfg: &RemoteConfig,
        token: &AuthToken,
        cancel: &CancellationToken,
    ) -> Result<AuthToken, AuthError> {
        tokio::select! {
            fresh = self.client.exchange_refresh_token(cfg, token) => fresh,
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        }
    }

    fn persist(&self, cfg: &RemoteConfig, token: &AuthToken) -> anyhow::Result<()> {
        self.store.save(cfg, token).context("failed to write new token")
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
