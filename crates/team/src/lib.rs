// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! team-cli: credential acquisition for temporary elevated access.
//!
//! The [`credential`] module owns the OAuth token lifecycle (authorization
//! code + PKCE over a loopback listener, device code, refresh). The rest of
//! the crate is the CLI shell around it: on-disk config, prompts, commands.

pub mod commands;
pub mod config;
pub mod credential;
pub mod error;
pub mod prompt;
pub mod store;
pub mod update;

use std::sync::Once;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
///
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
