// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential acquisition: OAuth token lifecycle for the TEAM service.
//!
//! A cached [`AuthToken`] is reused while valid, refreshed when it has a
//! refresh token, and otherwise replaced through a full interactive flow:
//! authorization code + PKCE over a loopback listener, or the device-code
//! variant for headless sessions.

pub mod callback;
pub mod claims;
pub mod device_code;
pub mod exchange;
pub mod lifecycle;
pub mod loopback;
pub mod oauth;
pub mod pkce;

#[cfg(test)]
pub(crate) mod test_support;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Fixed port of the loopback callback listener.
pub const LOOPBACK_PORT: u16 = 43672;

/// Redirect URI registered with the identity provider for the loopback flow.
pub const LOOPBACK_REDIRECT_URI: &str = "http://localhost:43672/";

/// Response type that enables the authorization code + PKCE flow.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Timeout for a single token endpoint request.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the loopback flow waits for the browser redirect.
pub const AUTHORIZATION_WAIT: Duration = Duration::from_secs(5 * 60);

/// Grace period for in-flight connections when the listener shuts down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Tokens expiring within this margin are treated as stale.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Server-side OAuth configuration for a TEAM deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Host of the OAuth authorization server (no scheme).
    #[serde(rename = "OAuthDomain")]
    pub oauth_domain: String,
    /// App client identifier in the user pool.
    #[serde(rename = "UserPoolClientID")]
    pub user_pool_client_id: String,
    /// `"code"` for authorization code + PKCE; anything else skips PKCE.
    #[serde(rename = "OAuthResponseType")]
    pub oauth_response_type: String,
    /// Requested scopes, in order.
    #[serde(rename = "OAuthScopes", default)]
    pub oauth_scopes: Vec<String>,
    #[serde(rename = "GraphQLEndpoint", default)]
    pub graphql_endpoint: String,
    /// Hosted page that displays the code for the device-code flow.
    #[serde(rename = "DeviceCodePage", default, skip_serializing_if = "Option::is_none")]
    pub device_code_page: Option<String>,
}

impl RemoteConfig {
    /// Check the fields authentication cannot proceed without.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.oauth_domain.trim().is_empty() {
            return Err(AuthError::ConfigInvalid("missing OAuth domain".into()));
        }
        if self.user_pool_client_id.trim().is_empty() {
            return Err(AuthError::ConfigInvalid("missing user pool client id".into()));
        }
        Ok(())
    }

    /// Whether the authorization request carries a PKCE challenge.
    pub fn uses_pkce(&self) -> bool {
        self.oauth_response_type == RESPONSE_TYPE_CODE
    }

    pub fn scope(&self) -> String {
        self.oauth_scopes.join(" ")
    }
}

/// Tokens issued by the provider, with an absolute expiry.
///
/// Replaced wholesale on refresh or reauthentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id_token: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry, RFC 3339 on disk.
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub token_type: String,
}

impl AuthToken {
    /// Seconds until expiry (zero once expired).
    pub fn expires_in_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Which interactive flow to run when a full reauthentication is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlow {
    /// Browser redirect to the loopback listener, optionally opening the
    /// browser for the user.
    Loopback { open_browser: bool },
    DeviceCode,
}

impl AuthFlow {
    /// The device-code flow never opens a browser.
    pub fn from_settings(use_device_code: bool, no_browser: bool) -> Self {
        if use_device_code {
            Self::DeviceCode
        } else {
            Self::Loopback { open_browser: !no_browser }
        }
    }
}

impl std::fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loopback { .. } => f.write_str("loopback"),
            Self::DeviceCode => f.write_str("device_code"),
        }
    }
}
