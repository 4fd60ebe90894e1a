// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client for the authorization code, refresh and device-code
//! grants.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;
use tracing::debug;

use crate::credential::oauth::{OAuthEndpoints, TokenResponse, DEVICE_CODE_GRANT};
use crate::credential::{AuthToken, RemoteConfig, LOOPBACK_REDIRECT_URI, TOKEN_REQUEST_TIMEOUT};
use crate::error::AuthError;

/// HTTP client bound to the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl TokenClient {
    pub fn new() -> Result<Self, AuthError> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(TOKEN_REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url: None })
    }

    /// Send requests under `base` instead of `https://{oauth_domain}`.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn endpoints(&self, cfg: &RemoteConfig) -> OAuthEndpoints {
        match self.base_url {
            Some(ref base) => OAuthEndpoints::with_base(base),
            None => OAuthEndpoints::from_config(cfg),
        }
    }

    /// Exchange an authorization code received on the loopback redirect.
    pub async fn exchange_authorization_code(
        &self,
        cfg: &RemoteConfig,
        code: &str,
        code_verifier: &str,
    ) -> Result<AuthToken, AuthError> {
        self.fetch_token(
            cfg,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", cfg.user_pool_client_id.as_str()),
                ("redirect_uri", LOOPBACK_REDIRECT_URI),
                ("code_verifier", code_verifier),
            ],
        )
        .await
    }

    /// Exchange the refresh token of `old` for a fresh token.
    ///
    /// Keeps the previous refresh token when the provider does not reissue one.
    pub async fn exchange_refresh_token(
        &self,
        cfg: &RemoteConfig,
        old: &AuthToken,
    ) -> Result<AuthToken, AuthError> {
        let refresh_token = old
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::ConfigInvalid("cached token has no refresh token".into()))?;

        let mut token = self
            .fetch_token(
                cfg,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", cfg.user_pool_client_id.as_str()),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        if !token.has_refresh_token() {
            token.refresh_token = Some(refresh_token.to_owned());
        }
        Ok(token)
    }

    /// Exchange a code the user copied from the device-code page.
    pub async fn exchange_device_code(
        &self,
        cfg: &RemoteConfig,
        device_code: &str,
    ) -> Result<AuthToken, AuthError> {
        self.fetch_token(
            cfg,
            &[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", cfg.user_pool_client_id.as_str()),
                ("device_code", device_code),
            ],
        )
        .await
    }

    async fn fetch_token(
        &self,
        cfg: &RemoteConfig,
        form: &[(&str, &str)],
    ) -> Result<AuthToken, AuthError> {
        let token_url = self.endpoints(cfg).token_url;
        let grant_type = form.first().map(|(_, v)| *v).unwrap_or_default();
        debug!(grant_type, %token_url, "requesting token");

        // Expiry counts from before the request so validity is never overstated.
        let issued_at = Utc::now();

        let resp = self.http.post(&token_url).timeout(TOKEN_REQUEST_TIMEOUT).form(form).send().await?;

        let status = resp.status();
        let body = resp.text().await?;

        if status != StatusCode::OK {
            return Err(AuthError::TokenExchange { status: status.as_u16(), body });
        }

        let raw: TokenResponse = serde_json::from_str(&body).map_err(AuthError::TokenResponse)?;
        debug!(grant_type, expires_in = raw.expires_in, "token issued");

        Ok(AuthToken {
            id_token: raw.id_token,
            access_token: raw.access_token,
            refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
            expires_at: expiry_after(issued_at, raw.expires_in),
            token_type: raw.token_type,
        })
    }
}

fn expiry_after(issued_at: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[path = "exchange_tests.rs"]
mod tests;
