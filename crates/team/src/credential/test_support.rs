// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for credential tests: a mock OAuth token endpoint and
//! identity tokens.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::routing::post;
use axum::{Form, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::credential::device_code::DeviceCodePrompt;
use crate::credential::exchange::TokenClient;
use crate::credential::RemoteConfig;

/// Mock token endpoint that replays canned `(status, body)` responses.
pub struct MockTokenServer {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicU32>,
    pub forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockTokenServer {
    /// Start serving `/oauth2/token`. The last response repeats once exhausted.
    pub async fn spawn(responses: Vec<(u16, String)>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let forms = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);

        let app = Router::new().route(
            "/oauth2/token",
            post({
                let calls = Arc::clone(&calls);
                let forms = Arc::clone(&forms);
                move |Form(form): Form<HashMap<String, String>>| {
                    let calls = Arc::clone(&calls);
                    let forms = Arc::clone(&forms);
                    let resps = Arc::clone(&responses);
                    async move {
                        forms.lock().await.push(form);
                        let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                        let (status, body) = resps
                            .get(idx)
                            .or_else(|| resps.last())
                            .cloned()
                            .unwrap_or((500, "{}".to_owned()));
                        (
                            axum::http::StatusCode::from_u16(status)
                                .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                            body,
                        )
                    }
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self { addr, calls, forms })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> anyhow::Result<TokenClient> {
        Ok(TokenClient::new()?.with_base_url(self.base_url()))
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn form(&self, idx: usize) -> HashMap<String, String> {
        self.forms.lock().await.get(idx).cloned().unwrap_or_default()
    }
}

pub fn remote_config() -> RemoteConfig {
    RemoteConfig {
        oauth_domain: "auth.example.com".into(),
        user_pool_client_id: "client-123".into(),
        oauth_response_type: "code".into(),
        oauth_scopes: vec!["openid".into(), "email".into()],
        graphql_endpoint: "https://api.example.com/graphql".into(),
        device_code_page: Some("https://team.example.com/device".into()),
    }
}

/// Compact token with the given claims and a dummy signature.
pub fn id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{body}.sig")
}

/// Successful token endpoint body.
pub fn token_body(access: &str, refresh: Option<&str>, expires_in: u64) -> String {
    let mut body = serde_json::json!({
        "id_token": id_token(&serde_json::json!({ "userId": "u-1", "email": "ada@example.com" })),
        "access_token": access,
        "expires_in": expires_in,
        "token_type": "Bearer",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::from(refresh);
    }
    body.to_string()
}

/// Device-code prompt that answers with a fixed value and counts calls.
pub struct FixedPrompt {
    pub answer: Option<&'static str>,
    pub calls: AtomicU32,
}

impl FixedPrompt {
    pub fn new(answer: Option<&'static str>) -> Self {
        Self { answer, calls: AtomicU32::new(0) }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DeviceCodePrompt for FixedPrompt {
    async fn prompt_device_code(&self) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.map(str::to_owned))
    }
}
