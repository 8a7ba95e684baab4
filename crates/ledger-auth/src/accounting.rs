// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal QuickBooks Online accounting API client.
//!
//! Every request asks the [`TokenManager`] for a valid credential first, so
//! callers never handle tokens themselves.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;

use crate::credential::manager::TokenManager;
use crate::error::{AuthError, ErrorCode};

/// Accounting API minor version sent with every request.
pub const MINOR_VERSION: &str = "75";

#[derive(Debug)]
pub enum AccountingError {
    /// No valid credential could be obtained.
    Auth(AuthError),
    /// The API answered with a non-success status.
    Api { status: u16, body: String },
    /// The API could not be reached or returned an unreadable body.
    Transport(String),
}

impl AccountingError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(e) => e.code(),
            Self::Api { .. } | Self::Transport(_) => ErrorCode::UpstreamError,
        }
    }
}

impl std::fmt::Display for AccountingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(e) => write!(f, "{e}"),
            Self::Api { status, body } => write!(f, "accounting API returned {status}: {body}"),
            Self::Transport(msg) => write!(f, "accounting API request failed: {msg}"),
        }
    }
}

impl std::error::Error for AccountingError {}

impl From<AuthError> for AccountingError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<reqwest::Error> for AccountingError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub struct AccountingClient {
    http: reqwest::Client,
    base_url: String,
    manager: Arc<TokenManager>,
}

impl AccountingClient {
    pub fn new(base_url: impl Into<String>, manager: Arc<TokenManager>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, manager }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/v3/company/{realm_id}/{path}?minorversion=..`
    pub fn company_url(&self, realm_id: &str, path: &str) -> Result<reqwest::Url, AccountingError> {
        let raw = format!(
            "{}/v3/company/{}/{}",
            self.base_url,
            realm_id,
            path.trim_start_matches('/')
        );
        let mut url =
            reqwest::Url::parse(&raw).map_err(|e| AccountingError::Transport(e.to_string()))?;
        url.query_pairs_mut().append_pair("minorversion", MINOR_VERSION);
        Ok(url)
    }

    /// GET a company-scoped resource as JSON.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, AccountingError> {
        self.get_with(|_| path.to_owned()).await
    }

    /// Fetch the connected company's `CompanyInfo` record.
    pub async fn company_info(&self) -> Result<serde_json::Value, AccountingError> {
        self.get_with(|realm_id| format!("companyinfo/{realm_id}")).await
    }

    async fn get_with(
        &self,
        path_for: impl FnOnce(&str) -> String,
    ) -> Result<serde_json::Value, AccountingError> {
        let credential = self.manager.get_valid_credential().await?;
        let (Some(token), Some(realm_id)) = (credential.access_token, credential.realm_id) else {
            return Err(AuthError::ReauthenticationRequired("credential is incomplete".into()).into());
        };

        let url = self.company_url(&realm_id, &path_for(&realm_id))?;
        tracing::debug!(%url, "accounting API request");
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "accounting API request failed");
            return Err(AccountingError::Api { status: status.as_u16(), body });
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
#[path = "accounting_tests.rs"]
mod tests;
