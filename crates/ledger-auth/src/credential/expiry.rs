// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{Credential, CredentialState};

/// Decides whether a credential can be handed out or must be refreshed first.
///
/// A credential is stale once the current time is within `margin` of its
/// expiry. A credential with no known expiry is never stale by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    margin: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MARGIN)
    }
}

impl ExpiryPolicy {
    pub const DEFAULT_MARGIN: Duration = Duration::from_secs(300);

    pub fn new(margin: Duration) -> Self {
        Self { margin }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Complete and outside the safety margin at `now_ms`.
    pub fn is_valid(&self, credential: &Credential, now_ms: i64) -> bool {
        credential.is_complete() && !self.is_stale(credential, now_ms)
    }

    /// Expiry known and `now_ms` at or past `expires_at - margin`.
    pub fn is_stale(&self, credential: &Credential, now_ms: i64) -> bool {
        match credential.expires_at {
            Some(expires_at) => now_ms >= expires_at.saturating_sub(self.margin_ms()),
            None => false,
        }
    }

    pub fn state(&self, credential: &Credential, now_ms: i64) -> CredentialState {
        if !credential.is_complete() {
            CredentialState::Unauthenticated
        } else if !self.is_stale(credential, now_ms) {
            CredentialState::Valid
        } else if credential.has_refresh_token() {
            CredentialState::Stale
        } else {
            CredentialState::ExpiredNoRefresh
        }
    }

    fn margin_ms(&self) -> i64 {
        i64::try_from(self.margin.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
#[path = "expiry_tests.rs"]
mod tests;
