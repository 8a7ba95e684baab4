// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the token service.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all service routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Authorization code flow
        .route("/api/v1/auth/connect", get(http::auth_connect))
        .route("/api/v1/auth/callback", get(http::auth_callback))
        // Credential lifecycle
        .route("/api/v1/auth/status", get(http::auth_status))
        .route("/api/v1/auth/refresh", post(http::auth_refresh))
        .route("/api/v1/auth/logout", post(http::auth_logout))
        .route("/api/v1/auth/scheduler", post(http::auth_scheduler))
        // Accounting API
        .route("/api/v1/company", get(http::company_info))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
