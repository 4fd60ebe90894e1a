// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unverified decode of the identity token's claims segment.
//!
//! This is a display/filter convenience. The signature is not checked, so the
//! result must not be treated as a verified identity assertion.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::credential::AuthToken;
use crate::error::AuthError;

/// Claims the TEAM identity token carries about the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    /// Comma-separated group identifiers, as the provider sends them.
    #[serde(rename = "groupIds", default)]
    pub group_ids: String,
    /// Provider-dependent: usually a string, but the shape is not guaranteed.
    #[serde(default)]
    pub email: Option<serde_json::Value>,
}

impl IdentityClaims {
    pub fn groups(&self) -> Vec<&str> {
        self.group_ids.split(',').map(str::trim).filter(|g| !g.is_empty()).collect()
    }

    /// The email when the provider sent it as a plain string.
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_ref().and_then(serde_json::Value::as_str)
    }
}

/// Decode the middle segment of a compact `header.claims.signature` token.
pub fn parse_identity_claims(token: &str) -> Result<IdentityClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::MalformedToken { segments: parts.len() });
    }

    let raw = URL_SAFE_NO_PAD.decode(parts[1]).map_err(AuthError::Encoding)?;
    serde_json::from_slice(&raw).map_err(AuthError::Decode)
}

impl AuthToken {
    pub fn identity_claims(&self) -> Result<IdentityClaims, AuthError> {
        parse_identity_claims(&self.id_token)
    }
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
