// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ledger-auth: OAuth2 token lifecycle service for the QuickBooks Online
//! invoice agent.

pub mod accounting;
pub mod config;
pub mod credential;
pub mod error;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::credential::expiry::ExpiryPolicy;
use crate::credential::issuer::IssuerClient;
use crate::credential::manager::TokenManager;
use crate::credential::store::CredentialStore;
use crate::state::AppState;
use crate::transport::build_router;

/// Initialize the global tracing subscriber from `--log-format`/`--log-level`.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // A subscriber installed earlier (e.g. by a test harness) wins.
    let _ = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
}

/// Build the token manager and its store from configuration.
pub fn build_manager(config: &Config) -> anyhow::Result<Arc<TokenManager>> {
    let oauth = config.oauth()?;
    let store = Arc::new(CredentialStore::load(config.token_path()));
    let issuer = IssuerClient::new(oauth);
    Ok(TokenManager::new(store, issuer, ExpiryPolicy::new(config.refresh_margin())))
}

/// Run the token service until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let manager = build_manager(&config)?;
    let status = manager.status();
    tracing::info!(
        path = %manager.store().path().display(),
        connected = status.available,
        realm_id = ?status.realm_id,
        "credential store loaded"
    );

    if let Some(interval) = config.refresh_interval() {
        manager.start_scheduled_refresh(interval);
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let state = Arc::new(AppState::new(config, Arc::clone(&manager)));
    let router = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("ledger-auth listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    manager.stop_scheduled_refresh();
    Ok(())
}
