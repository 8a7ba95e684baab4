// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scriptable token endpoint and manager builders.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::config::OAuthConfig;
use crate::credential::expiry::ExpiryPolicy;
use crate::credential::issuer::IssuerClient;
use crate::credential::manager::TokenManager;
use crate::credential::store::CredentialStore;
use crate::credential::{now_ms, Credential};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// One scripted reply from [`MockTokenServer`].
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body: body.to_string(), delay: Duration::ZERO }
    }

    /// A successful token response.
    pub fn token(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> Self {
        let mut body = serde_json::json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": expires_in,
            "x_refresh_token_expires_in": 8_726_400,
        });
        if let Some(rt) = refresh_token {
            body["refresh_token"] = serde_json::Value::from(rt);
        }
        Self::new(200, body)
    }

    /// An OAuth error response such as `invalid_grant`.
    pub fn oauth_error(status: u16, error: &str) -> Self {
        Self::new(status, serde_json::json!({ "error": error }))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request received by [`MockTokenServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub form: HashMap<String, String>,
}

/// Local token endpoint that replays scripted responses in order, repeating
/// the last one once the script runs out.
pub struct MockTokenServer {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTokenServer {
    pub async fn start(responses: Vec<MockResponse>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);

        let app = Router::new().route(
            "/token",
            post({
                let calls = Arc::clone(&calls);
                let requests = Arc::clone(&requests);
                move |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| {
                    let calls = Arc::clone(&calls);
                    let requests = Arc::clone(&requests);
                    let responses = Arc::clone(&responses);
                    async move {
                        let idx = calls.fetch_add(1, Ordering::SeqCst) as usize;
                        let authorization = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        requests.lock().push(RecordedRequest { authorization, form });

                        let resp = responses
                            .get(idx)
                            .or_else(|| responses.last())
                            .cloned()
                            .unwrap_or_else(|| MockResponse::new(500, serde_json::json!({})));
                        if !resp.delay.is_zero() {
                            tokio::time::sleep(resp.delay).await;
                        }
                        (
                            StatusCode::from_u16(resp.status)
                                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                            [("content-type", "application/json")],
                            resp.body,
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

        Ok(Self { addr, calls, requests })
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

/// OAuth settings pointing at `token_url` with test client credentials.
pub fn test_oauth(token_url: &str) -> OAuthConfig {
    ensure_crypto();
    OAuthConfig {
        client_id: "test-client".to_owned(),
        client_secret: "test-secret".to_owned(),
        redirect_uri: "http://localhost:3001/api/v1/auth/callback".to_owned(),
        token_url: token_url.to_owned(),
        authorize_url: crate::config::DEFAULT_AUTHORIZE_URL.to_owned(),
        scope: crate::config::DEFAULT_SCOPE.to_owned(),
        timeout: Duration::from_secs(5),
    }
}

/// A complete credential expiring `expires_in_secs` from now (negative for
/// already expired).
pub fn credential_expiring_in(expires_in_secs: i64, refresh_token: Option<&str>) -> Credential {
    Credential {
        access_token: Some("stored-access".to_owned()),
        refresh_token: refresh_token.map(str::to_owned),
        realm_id: Some("9130".to_owned()),
        expires_at: Some(now_ms() + expires_in_secs * 1000),
        token_type: Some("bearer".to_owned()),
        scope: Some(crate::config::DEFAULT_SCOPE.to_owned()),
        last_updated: None,
    }
}

/// Builder for a [`TokenManager`] backed by a store under a temp directory.
pub struct ManagerBuilder {
    oauth: OAuthConfig,
    margin: Duration,
    credential: Option<Credential>,
}

impl ManagerBuilder {
    pub fn new(token_url: &str) -> Self {
        Self { oauth: test_oauth(token_url), margin: ExpiryPolicy::DEFAULT_MARGIN, credential: None }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.oauth.timeout = timeout;
        self
    }

    pub fn margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Build the manager, persisting the seeded credential to `dir/tokens.json`.
    pub async fn build(self, dir: &Path) -> anyhow::Result<Arc<TokenManager>> {
        let store = Arc::new(CredentialStore::load(dir.join("tokens.json")));
        if let Some(credential) = self.credential {
            store.save(credential).await?;
        }
        Ok(TokenManager::new(store, IssuerClient::new(self.oauth), ExpiryPolicy::new(self.margin)))
    }
}
