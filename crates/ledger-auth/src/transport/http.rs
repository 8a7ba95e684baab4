// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the token service.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::{AuthError, ErrorCode};
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "realmId")]
    pub realm_id: Option<String>,
    /// Set by Intuit when the user declines consent.
    #[serde(default)]
    pub error: Option<String>,
}

/// Non-secret view of a freshly obtained or refreshed credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl From<&Credential> for CredentialSummary {
    fn from(c: &Credential) -> Self {
        Self {
            connected: c.is_complete(),
            realm_id: c.realm_id.clone(),
            expires_at: c.expires_at,
            last_updated: c.last_updated.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub disconnected: bool,
}

#[derive(Debug, Deserialize)]
pub struct SchedulerRequest {
    pub interval_minutes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchedulerResponse {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        connected: s.manager.store().current().is_complete(),
    })
}

/// `GET /api/v1/auth/connect` — start the authorization code flow.
pub async fn auth_connect(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.manager.begin_authorization() {
        Ok(request) => Json(request).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/v1/auth/callback` — redirect target after the user grants access.
pub async fn auth_callback(
    State(s): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> impl IntoResponse {
    if let Some(error) = q.error {
        tracing::warn!(%error, "authorization declined");
        return ErrorCode::BadRequest
            .to_http_response(format!("authorization declined: {error}"))
            .into_response();
    }
    let (Some(code), Some(state), Some(realm_id)) = (q.code, q.state, q.realm_id) else {
        return ErrorCode::BadRequest
            .to_http_response("code, state and realmId are required")
            .into_response();
    };

    match s.manager.complete_authorization(&state, &code, &realm_id).await {
        Ok(credential) => Json(CredentialSummary::from(&credential)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/v1/auth/status`
pub async fn auth_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.manager.status())
}

/// `POST /api/v1/auth/refresh` — return once a valid credential is held.
pub async fn auth_refresh(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.manager.get_valid_credential().await {
        Ok(credential) => Json(CredentialSummary::from(&credential)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/auth/logout`
pub async fn auth_logout(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.manager.logout().await {
        Ok(()) => Json(LogoutResponse { disconnected: true }).into_response(),
        Err(e) => error_response(&e),
    }
}

/// `POST /api/v1/auth/scheduler` — start, replace, or (with 0) stop the
/// background refresh driver.
pub async fn auth_scheduler(
    State(s): State<Arc<AppState>>,
    Json(req): Json<SchedulerRequest>,
) -> impl IntoResponse {
    if req.interval_minutes == 0 {
        s.manager.stop_scheduled_refresh();
    } else {
        let Some(secs) = req.interval_minutes.checked_mul(60) else {
            return ErrorCode::BadRequest
                .to_http_response("interval_minutes is too large")
                .into_response();
        };
        s.manager.start_scheduled_refresh(Duration::from_secs(secs));
    }
    Json(SchedulerResponse {
        running: s.manager.status().scheduler_running,
        interval_minutes: s.manager.scheduled_refresh_interval().map(|d| d.as_secs() / 60),
    })
    .into_response()
}

/// `GET /api/v1/company` — connected company's info from the accounting API.
pub async fn company_info(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.accounting.company_info().await {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

fn error_response(e: &AuthError) -> axum::response::Response {
    e.to_http_response().into_response()
}
