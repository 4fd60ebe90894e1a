// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::TimeDelta;

use super::*;
use crate::credential::oauth::DEVICE_CODE_GRANT;
use crate::credential::test_support::{remote_config, token_body, FixedPrompt, MockTokenServer};

/// In-memory store that records every save.
#[derive(Default)]
struct MemoryStore {
    config: Option<RemoteConfig>,
    saved: Mutex<Vec<AuthToken>>,
    fail: bool,
}

impl MemoryStore {
    fn saved(&self) -> Vec<AuthToken> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> anyhow::Result<(Option<RemoteConfig>, Option<AuthToken>)> {
        Ok((self.config.clone(), self.saved().last().cloned()))
    }

    fn save(&self, _cfg: &RemoteConfig, token: &AuthToken) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("disk full");
        }
        self.saved.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.push(token.clone());
        Ok(())
    }
}

fn secs_from_now(secs: i64) -> DateTime<Utc> {
    Utc::now() + TimeDelta::seconds(secs)
}

fn token_expiring_at(expires_at: DateTime<Utc>, refresh: Option<&str>) -> AuthToken {
    AuthToken {
        id_token: "h.c.s".into(),
        access_token: "cached-access".into(),
        refresh_token: refresh.map(str::to_owned),
        expires_at,
        token_type: "Bearer".into(),
    }
}

fn lifecycle(
    server: &MockTokenServer,
    store: MemoryStore,
    answer: Option<&'static str>,
) -> anyhow::Result<TokenLifecycle<MemoryStore, FixedPrompt>> {
    Ok(TokenLifecycle::new(server.client()?, store, FixedPrompt::new(answer)))
}

#[yare::parameterized(
    absent = { false, None, 0, TokenState::ExpiredNoRefresh },
    fresh = { true, Some("r"), 600, TokenState::Valid },
    fresh_without_refresh = { true, None, 600, TokenState::Valid },
    inside_margin = { true, Some("r"), 299, TokenState::Refreshable },
    at_margin = { true, Some("r"), 300, TokenState::Refreshable },
    expired = { true, Some("r"), -1, TokenState::Refreshable },
    expired_without_refresh = { true, None, -1, TokenState::ExpiredNoRefresh },
    inside_margin_without_refresh = { true, None, 120, TokenState::ExpiredNoRefresh },
    empty_refresh = { true, Some(""), -1, TokenState::ExpiredNoRefresh },
)]
fn classify(present: bool, refresh: Option<&str>, offset: i64, expected: TokenState) {
    let now = Utc::now();
    let token = present.then(|| token_expiring_at(now + TimeDelta::seconds(offset), refresh));
    assert_eq!(TokenState::classify(token.as_ref(), now), expected);
}

async fn acquire(
    lc: &TokenLifecycle<MemoryStore, FixedPrompt>,
    cached: Option<&AuthToken>,
    flow: AuthFlow,
) -> anyhow::Result<AuthToken> {
    lc.acquire_valid_token(&remote_config(), cached, flow, &CancellationToken::new()).await
}

#[tokio::test]
async fn valid_token_is_returned_without_network_calls() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("new", Some("r"), 3600))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("code"))?;
    let cached = token_expiring_at(secs_from_now(600), Some("refresh"));

    let token = acquire(&lc, Some(&cached), AuthFlow::DeviceCode).await?;

    assert_eq!(token, cached);
    assert_eq!(server.call_count(), 0);
    assert_eq!(lc.prompt.call_count(), 0);
    assert!(lc.store().saved().is_empty());
    Ok(())
}

#[tokio::test]
async fn expired_token_is_refreshed_and_saved() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("refreshed", None, 3600))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("code"))?;
    let cached = token_expiring_at(secs_from_now(-1), Some("refresh-1"));

    let token = acquire(&lc, Some(&cached), AuthFlow::DeviceCode).await?;

    assert_eq!(token.access_token, "refreshed");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(server.call_count(), 1);
    assert_eq!(lc.prompt.call_count(), 0);
    assert_eq!(lc.store().saved(), vec![token]);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_falls_back_to_reauthentication_once() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![
        (400, r#"{"error":"invalid_grant"}"#.into()),
        (200, token_body("reauthed", Some("refresh-2"), 3600)),
    ])
    .await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;
    let cached = token_expiring_at(secs_from_now(-1), Some("stale"));

    let token = acquire(&lc, Some(&cached), AuthFlow::DeviceCode).await?;

    assert_eq!(token.access_token, "reauthed");
    assert_eq!(server.call_count(), 2);
    assert_eq!(lc.prompt.call_count(), 1);
    assert_eq!(server.form(0).await.get("grant_type").map(String::as_str), Some("refresh_token"));
    assert_eq!(server.form(1).await.get("device_code").map(String::as_str), Some("DEV-1"));
    assert_eq!(lc.store().saved(), vec![token]);
    Ok(())
}

#[tokio::test]
async fn failed_reauthentication_is_not_retried() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(400, r#"{"error":"invalid_grant"}"#.into())]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;
    let cached = token_expiring_at(secs_from_now(-1), Some("stale"));

    let err = acquire(&lc, Some(&cached), AuthFlow::DeviceCode)
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected failure"))?;

    assert!(matches!(
        err.downcast_ref::<AuthError>(),
        Some(AuthError::TokenExchange { status: 400, .. })
    ));
    assert_eq!(server.call_count(), 2);
    assert_eq!(lc.prompt.call_count(), 1);
    assert!(lc.store().saved().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_token_goes_straight_to_reauthentication() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("first", Some("r"), 3600))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;

    let token = acquire(&lc, None, AuthFlow::DeviceCode).await?;

    assert_eq!(token.access_token, "first");
    assert_eq!(server.call_count(), 1);
    let form = server.form(0).await;
    assert_eq!(form.get("grant_type").map(String::as_str), Some(DEVICE_CODE_GRANT));
    Ok(())
}

#[tokio::test]
async fn stale_token_without_refresh_reauthenticates() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("fresh", None, 3600))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;
    let cached = token_expiring_at(secs_from_now(60), None);

    acquire(&lc, Some(&cached), AuthFlow::DeviceCode).await?;

    assert_eq!(server.call_count(), 1);
    assert_eq!(lc.prompt.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn loopback_timeout_propagates_after_failed_refresh() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(400, r#"{"error":"invalid_grant"}"#.into())]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), None)?.with_loopback(LoopbackSettings {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        wait: Duration::from_millis(50),
        shutdown_grace: Duration::from_secs(1),
    });
    let cached = token_expiring_at(secs_from_now(-1), Some("stale"));

    let err = acquire(&lc, Some(&cached), AuthFlow::Loopback { open_browser: false })
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected timeout"))?;

    assert!(matches!(
        err.downcast_ref::<AuthError>(),
        Some(AuthError::AuthorizationTimeout { .. })
    ));
    assert_eq!(err.to_string(), "failed to fetch new token");
    assert_eq!(server.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn save_failure_is_fatal() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("refreshed", None, 3600))]).await?;
    let store = MemoryStore { fail: true, ..Default::default() };
    let lc = lifecycle(&server, store, Some("DEV-1"))?;
    let cached = token_expiring_at(secs_from_now(-1), Some("refresh"));

    let err = acquire(&lc, Some(&cached), AuthFlow::DeviceCode)
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected save failure"))?;

    assert_eq!(err.to_string(), "failed to write new token");
    assert_eq!(lc.prompt.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn missing_oauth_domain_is_rejected_before_any_request() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("x", None, 60))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;
    let mut cfg = remote_config();
    cfg.oauth_domain = String::new();

    let err = lc
        .acquire_valid_token(&cfg, None, AuthFlow::DeviceCode, &CancellationToken::new())
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected config error"))?;

    assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::ConfigInvalid(_))));
    assert_eq!(server.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn cancellation_aborts_refresh() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("x", None, 60))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;
    let cached = token_expiring_at(secs_from_now(-1), Some("refresh"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = lc
        .acquire_valid_token(&remote_config(), Some(&cached), AuthFlow::DeviceCode, &cancel)
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected cancellation"))?;

    assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::Cancelled)));
    assert_eq!(lc.prompt.call_count(), 0);
    assert!(lc.store().saved().is_empty());
    Ok(())
}

#[tokio::test]
async fn stored_valid_token_is_reused() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("new", None, 3600))]).await?;
    let saved = token_expiring_at(secs_from_now(3600), Some("r"));
    let store = MemoryStore {
        config: Some(remote_config()),
        saved: Mutex::new(vec![saved.clone()]),
        ..Default::default()
    };
    let lc = lifecycle(&server, store, Some("DEV-1"))?;

    let token = lc.acquire_stored_token(AuthFlow::DeviceCode, &CancellationToken::new()).await?;

    assert_eq!(token, saved);
    assert_eq!(server.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn stored_token_needs_a_server_config() -> anyhow::Result<()> {
    let server = MockTokenServer::spawn(vec![(200, token_body("new", None, 3600))]).await?;
    let lc = lifecycle(&server, MemoryStore::default(), Some("DEV-1"))?;

    let err = lc
        .acquire_stored_token(AuthFlow::DeviceCode, &CancellationToken::new())
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected config error"))?;

    assert!(matches!(err.downcast_ref::<AuthError>(), Some(AuthError::ConfigInvalid(_))));
    assert_eq!(lc.prompt.call_count(), 0);
    Ok(())
}
