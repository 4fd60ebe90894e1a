// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback listener that captures the OAuth redirect from the browser.
//!
//! One listener per authorization attempt. It owns a single-slot handoff:
//! the first request carrying a `code` wins, later ones are dropped. Every
//! request gets a page that closes itself, so stray fetches (favicon,
//! retries) never leave the browser hanging.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::SHUTDOWN_GRACE;
use crate::error::AuthError;

const CLOSE_PAGE: &str = r#"<html>
<head>
</head>
<body>
You can close this window now.

<script>
  setTimeout(function() {
      window.close()
  }, 1000);
</script>
</body>
</html>
"#;

/// Single-slot handoff: taken by the first delivery, empty afterwards.
#[derive(Clone)]
struct CodeSlot {
    tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

/// What became of an offered code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Delivered,
    /// An earlier request already took the slot.
    Duplicate,
    /// Nobody is waiting any more (timed out or cancelled).
    Closed,
}

impl CodeSlot {
    async fn offer(&self, code: String) -> Offer {
        let Some(tx) = self.tx.lock().await.take() else {
            return Offer::Duplicate;
        };
        match tx.send(code) {
            Ok(()) => Offer::Delivered,
            Err(_) => Offer::Closed,
        }
    }
}

/// Router that serves the callback on every path.
fn build_router(slot: CodeSlot) -> Router {
    Router::new().fallback(handle_callback).with_state(slot)
}

async fn handle_callback(
    State(slot): State<CodeSlot>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Html<&'static str> {
    let code = query.ok().and_then(|Query(mut params)| params.remove("code"));
    if let Some(code) = code.filter(|c| !c.is_empty()) {
        match slot.offer(code).await {
            Offer::Delivered => debug!("received authorization code"),
            Offer::Duplicate => warn!("authorization code already received, dropping duplicate"),
            Offer::Closed => warn!("authorization code arrived after the login attempt ended"),
        }
    }
    Html(CLOSE_PAGE)
}

/// A bound loopback listener with its background serving task.
pub struct CallbackListener {
    local_addr: SocketAddr,
    code_rx: Option<oneshot::Receiver<String>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    shutdown: CancellationToken,
}

impl CallbackListener {
    /// Bind `addr` and start serving in the background.
    pub async fn bind(addr: SocketAddr) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::ListenerBind { addr: addr.to_string(), source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AuthError::ListenerBind { addr: addr.to_string(), source })?;

        let (tx, rx) = oneshot::channel();
        let router = build_router(CodeSlot { tx: Arc::new(Mutex::new(Some(tx))) });
        let shutdown = CancellationToken::new();

        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await
            }
        });
        debug!(%local_addr, "callback listener started");

        Ok(Self { local_addr, code_rx: Some(rx), server: Some(server), shutdown })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the first authorization code.
    ///
    /// Resolves with whichever happens first: a code arrives, the serving
    /// task exits, `wait` elapses, or `cancel` fires.
    pub async fn wait_for_code(
        &mut self,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        let Some(code_rx) = self.code_rx.take() else {
            return Err(AuthError::ListenerFailed("authorization code already consumed".into()));
        };
        let Some(server) = self.server.as_mut() else {
            return Err(AuthError::ListenerFailed("listener already shut down".into()));
        };

        let mut server_exited = false;
        let result = tokio::select! {
            code = code_rx => {
                code.map_err(|_| AuthError::ListenerFailed("callback handler dropped".into()))
            }
            exit = server => {
                server_exited = true;
                let msg = match exit {
                    Ok(Ok(())) => "listener exited".to_owned(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                Err(AuthError::ListenerFailed(msg))
            }
            _ = tokio::time::sleep(wait) => {
                info!("timeout waiting for authorization code");
                Err(AuthError::AuthorizationTimeout { waited_secs: wait.as_secs() })
            }
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        };
        if server_exited {
            self.server = None;
        }
        result
    }

    /// Stop serving, giving in-flight connections [`SHUTDOWN_GRACE`].
    ///
    /// Failures are logged; the attempt's result is already decided.
    pub async fn shutdown(self) {
        self.shutdown_within(SHUTDOWN_GRACE).await;
    }

    pub async fn shutdown_within(mut self, grace: Duration) {
        self.shutdown.cancel();
        let Some(mut server) = self.server.take() else {
            return;
        };
        match tokio::time::timeout(grace, &mut server).await {
            Ok(Ok(Ok(()))) => debug!(addr = %self.local_addr, "callback listener stopped"),
            Ok(Ok(Err(e))) => warn!(err = %e, "failed to shutdown callback listener"),
            Ok(Err(e)) => warn!(err = %e, "callback listener task failed"),
            Err(_) => {
                warn!("callback listener did not stop within grace period, aborting");
                server.abort();
            }
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
