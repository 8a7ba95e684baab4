// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth credential lifecycle for the QuickBooks Online connection.
//!
//! A single process-wide [`Credential`] is owned by the [`store::CredentialStore`]
//! and only mutated through it. The [`manager::TokenManager`] hands out valid
//! credentials, refreshing through the [`issuer::IssuerClient`] when the
//! [`expiry::ExpiryPolicy`] says the cached one is stale, and the
//! [`scheduler::RefreshScheduler`] keeps it warm in the background.

pub mod authorize;
pub mod expiry;
pub mod issuer;
pub mod manager;
pub mod scheduler;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::credential::issuer::TokenGrant;

/// The persisted token pair plus metadata for one QuickBooks company.
///
/// Field names match the on-disk JSON record. Absent values serialize as
/// `null` rather than being skipped.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// QuickBooks company ("realm") this credential is scoped to.
    pub realm_id: Option<String>,
    /// Absolute expiry of the access token, epoch milliseconds.
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    /// ISO-8601 time of the last successful write.
    pub last_updated: Option<String>,
}

impl Credential {
    /// Build a complete credential from an authorization code exchange.
    pub fn from_grant(grant: &TokenGrant, realm_id: &str, now_ms: i64) -> Self {
        Self {
            access_token: Some(grant.access_token.clone()),
            refresh_token: grant.refresh_token.clone(),
            realm_id: Some(realm_id.to_owned()),
            expires_at: grant.expires_at(now_ms),
            token_type: grant.token_type.clone(),
            scope: grant.scope.clone(),
            last_updated: Some(iso_timestamp(now_ms)),
        }
    }

    /// Merge a refresh result into this credential.
    ///
    /// The access token and expiry are always replaced. The refresh token is
    /// replaced only when the issuer rotated it. Token type and scope keep
    /// their previous values when the response omits them.
    pub fn merged_with(&self, grant: &TokenGrant, now_ms: i64) -> Self {
        Self {
            access_token: Some(grant.access_token.clone()),
            refresh_token: grant.refresh_token.clone().or_else(|| self.refresh_token.clone()),
            realm_id: self.realm_id.clone(),
            expires_at: grant.expires_at(now_ms),
            token_type: grant.token_type.clone().or_else(|| self.token_type.clone()),
            scope: grant.scope.clone().or_else(|| self.scope.clone()),
            last_updated: Some(iso_timestamp(now_ms)),
        }
    }

    /// No access token at all.
    pub fn is_empty(&self) -> bool {
        self.access_token.as_deref().is_none_or(str::is_empty)
    }

    /// Access token and realm id are both present.
    pub fn is_complete(&self) -> bool {
        !self.is_empty() && self.realm_id.as_deref().is_some_and(|r| !r.is_empty())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|r| !r.is_empty())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credential")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("realm_id", &self.realm_id)
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// Where a credential sits in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// No complete credential.
    Unauthenticated,
    /// Complete and outside the safety margin.
    Valid,
    /// Inside the safety margin (or past expiry) with a refresh token.
    Stale,
    /// Inside the safety margin (or past expiry) with no way to refresh.
    ExpiredNoRefresh,
}

/// Non-secret diagnostic snapshot of the credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// A complete credential is stored.
    pub available: bool,
    pub has_tokens: bool,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    pub state: CredentialState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    /// Past the actual expiry, ignoring the safety margin.
    pub is_expired: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    pub refresh_in_flight: bool,
    pub scheduler_running: bool,
}

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format epoch milliseconds as an RFC 3339 timestamp.
pub fn iso_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
