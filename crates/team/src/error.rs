// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failures of the authentication subsystem.
///
/// Lower layers return these directly; the lifecycle and the CLI wrap them in
/// [`anyhow::Error`] with the operation name, so callers can still recover the
/// variant with `downcast_ref::<AuthError>()`.
#[derive(Debug)]
pub enum AuthError {
    /// Remote configuration is missing something authentication needs.
    ConfigInvalid(String),
    /// The user did not finish the browser flow within the wait window.
    AuthorizationTimeout { waited_secs: u64 },
    /// The loopback listener could not bind its port.
    ListenerBind { addr: String, source: std::io::Error },
    /// The loopback listener stopped serving before a code arrived.
    ListenerFailed(String),
    /// The enclosing operation was cancelled.
    Cancelled,
    /// The user declined to enter a device code.
    PromptCancelled,
    /// The token endpoint answered with a non-200 status.
    TokenExchange { status: u16, body: String },
    /// The token endpoint answered 200 with a body that is not a token.
    TokenResponse(serde_json::Error),
    /// Transport-level failure talking to the provider.
    Http(reqwest::Error),
    /// Identity token does not have exactly three segments.
    MalformedToken { segments: usize },
    /// Identity token claims segment is not unpadded base64url.
    Encoding(base64::DecodeError),
    /// Identity token claims segment is not a JSON claim set.
    Decode(serde_json::Error),
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "CONFIG_INVALID",
            Self::AuthorizationTimeout { .. } => "AUTHORIZATION_TIMEOUT",
            Self::ListenerBind { .. } => "LISTENER_BIND",
            Self::ListenerFailed(_) => "LISTENER_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::PromptCancelled => "PROMPT_CANCELLED",
            Self::TokenExchange { .. } => "TOKEN_EXCHANGE",
            Self::TokenResponse(_) => "TOKEN_RESPONSE",
            Self::Http(_) => "HTTP",
            Self::MalformedToken { .. } => "MALFORMED_TOKEN",
            Self::Encoding(_) => "ENCODING",
            Self::Decode(_) => "DECODE",
        }
    }

    /// Whether re-running the command may succeed without reconfiguring.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationTimeout { .. }
                | Self::ListenerFailed(_)
                | Self::Cancelled
                | Self::PromptCancelled
                | Self::Http(_)
        )
    }

    /// Identity-claims decode failures degrade a feature instead of aborting.
    pub fn is_claims_error(&self) -> bool {
        matches!(self, Self::MalformedToken { .. } | Self::Encoding(_) | Self::Decode(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid(msg) => {
                write!(f, "invalid server config: {msg} (run `team-cli configure`)")
            }
            Self::AuthorizationTimeout { waited_secs } => write!(
                f,
                "timed out after {waited_secs}s waiting for the browser to return an \
                 authorization code; re-run the command and finish signing in sooner"
            ),
            Self::ListenerBind { addr, source } => write!(
                f,
                "could not listen on {addr} for the login callback: {source}; \
                 check that no other team-cli login is running and the port is free"
            ),
            Self::ListenerFailed(msg) => write!(f, "login callback listener stopped: {msg}"),
            Self::Cancelled => f.write_str("authentication cancelled"),
            Self::PromptCancelled => f.write_str("no device code entered"),
            Self::TokenExchange { status, body } => {
                write!(f, "unexpected token status code: {status} {body:?}")
            }
            Self::TokenResponse(e) => write!(f, "failed to parse token response: {e}"),
            Self::Http(e) => write!(f, "failed to send token request: {e}"),
            Self::MalformedToken { segments } => {
                write!(f, "identity token has {segments} segments, expected 3")
            }
            Self::Encoding(e) => write!(f, "failed to decode identity token claims: {e}"),
            Self::Decode(e) => write!(f, "failed to unmarshal identity token claims: {e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ListenerBind { source, .. } => Some(source),
            Self::TokenResponse(e) | Self::Decode(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
