// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization request helpers: `state`, PKCE pair, authorize URL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::credential::RemoteConfig;

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Verifier/challenge pair for one authorization attempt. Never logged.
#[derive(Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Draw `len` characters uniformly from `[0-9a-zA-Z]`.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len).map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())])).collect()
}

/// Random `state` parameter for the authorize request.
pub fn generate_state() -> String {
    random_string(32)
}

/// Generate a verifier and its S256 challenge.
///
/// The verifier is the base64url form of 32 random characters, and the
/// challenge hashes that encoded form. The provider configuration expects
/// exactly this encoding.
pub fn generate_challenge() -> PkcePair {
    let verifier = URL_SAFE_NO_PAD.encode(random_string(32));
    let challenge = compute_code_challenge(&verifier);
    PkcePair { verifier, challenge }
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the full authorization URL.
///
/// PKCE parameters are appended only for the `code` response type.
pub fn build_auth_url(
    authorize_url: &str,
    cfg: &RemoteConfig,
    redirect_uri: &str,
    state: &str,
    pkce: Option<&PkcePair>,
) -> String {
    let mut url = format!(
        "{authorize_url}?redirect_uri={redirect_uri}\
         &response_type={response_type}\
         &client_id={client_id}\
         &scope={scope}\
         &state={state}",
        redirect_uri = urlencoding(redirect_uri),
        response_type = urlencoding(&cfg.oauth_response_type),
        client_id = urlencoding(&cfg.user_pool_client_id),
        scope = urlencoding(&cfg.scope()),
        state = urlencoding(state),
    );
    if let Some(pair) = pkce.filter(|_| cfg.uses_pkce()) {
        url.push_str("&code_challenge=");
        url.push_str(&urlencoding(&pair.challenge));
        url.push_str("&code_challenge_method=S256");
    }
    url
}

/// Form-style encoding for URL query parameters (spaces as `+`).
fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
