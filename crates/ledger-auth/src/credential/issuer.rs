// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the Intuit OAuth2 token endpoint.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::error::AuthError;

/// Successful token endpoint response.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Refresh token lifetime in seconds (Intuit extension).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_refresh_token_expires_in: Option<u64>,
}

impl TokenGrant {
    /// Absolute access token expiry relative to `now_ms`.
    pub fn expires_at(&self, now_ms: i64) -> Option<i64> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        Some(now_ms.saturating_add(secs.saturating_mul(1000)))
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("x_refresh_token_expires_in", &self.x_refresh_token_expires_in)
            .finish()
    }
}

/// Token endpoint failure, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerError {
    /// The issuer rejected the grant (e.g. `invalid_grant`). Retrying the same
    /// token will not succeed.
    Terminal { status: u16, body: String },
    /// Timeout, connection failure, throttling, a server-side error, or any
    /// status that is not a rejection of the grant.
    Recoverable { status: Option<u16>, message: String },
}

impl IssuerError {
    /// Classify a non-success HTTP response.
    ///
    /// Only an explicit rejection of the grant or client (400, 401, 403) is
    /// terminal. Anything else, including a misrouted 404 or a proxy 407,
    /// leaves the stored refresh token untouched.
    pub fn from_response(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Terminal { status: status.as_u16(), body }
            }
            _ => Self::Recoverable { status: Some(status.as_u16()), message: body },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Terminal { status, .. } => Some(*status),
            Self::Recoverable { status, .. } => *status,
        }
    }

    /// The OAuth `error` field of the response body, if it has one.
    pub fn oauth_error(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct Body {
            error: String,
        }
        let body = match self {
            Self::Terminal { body, .. } => body,
            Self::Recoverable { message, .. } => message,
        };
        serde_json::from_str::<Body>(body).ok().map(|b| b.error)
    }

    /// Map to the caller-facing error: terminal means the user must
    /// reauthorize, everything else is transient.
    pub fn into_auth_error(self, context: &str) -> AuthError {
        match self {
            Self::Terminal { .. } => AuthError::ReauthenticationRequired(format!("{context}: {self}")),
            Self::Recoverable { .. } => AuthError::TemporarilyUnavailable(format!("{context}: {self}")),
        }
    }
}

impl std::fmt::Display for IssuerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal { status, .. } => match self.oauth_error() {
                Some(code) => write!(f, "token endpoint rejected grant ({status} {code})"),
                None => write!(f, "token endpoint rejected grant ({status})"),
            },
            Self::Recoverable { status: Some(status), .. } => {
                write!(f, "token endpoint unavailable ({status})")
            }
            Self::Recoverable { status: None, message } => {
                write!(f, "token endpoint unreachable: {message}")
            }
        }
    }
}

impl std::error::Error for IssuerError {}

impl From<reqwest::Error> for IssuerError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() { format!("timed out: {e}") } else { e.to_string() };
        Self::Recoverable { status: e.status().map(|s| s.as_u16()), message }
    }
}

/// Client credentials plus a configured HTTP client for the token endpoint.
#[derive(Clone)]
pub struct IssuerClient {
    http: reqwest::Client,
    oauth: Arc<OAuthConfig>,
}

impl IssuerClient {
    pub fn new(oauth: OAuthConfig) -> Self {
        let http = reqwest::Client::builder().timeout(oauth.timeout).build().unwrap_or_default();
        Self { http, oauth: Arc::new(oauth) }
    }

    /// Build the URL the user visits to grant access.
    pub fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let url = reqwest::Url::parse_with_params(
            &self.oauth.authorize_url,
            &[
                ("client_id", self.oauth.client_id.as_str()),
                ("response_type", "code"),
                ("scope", self.oauth.scope.as_str()),
                ("redirect_uri", self.oauth.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Configuration(format!("invalid authorize URL: {e}")))?;
        Ok(url.into())
    }

    /// Exchange a one-time authorization code for a token pair.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant, IssuerError> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
        ])
        .await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, IssuerError> {
        self.request_token(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, IssuerError> {
        let resp = self
            .http
            .post(&self.oauth.token_url)
            .basic_auth(&self.oauth.client_id, Some(&self.oauth.client_secret))
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IssuerError::from_response(status, body));
        }

        let grant: TokenGrant = resp.json().await?;
        Ok(grant)
    }
}

#[cfg(test)]
#[path = "issuer_tests.rs"]
mod tests;
