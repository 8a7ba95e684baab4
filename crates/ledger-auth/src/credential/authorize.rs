// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// How long an issued OAuth `state` stays redeemable.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// An authorization URL together with the `state` it was issued with.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    pub auth_url: String,
    pub state: String,
}

/// Outstanding authorization code flows, keyed by OAuth `state`.
///
/// Each state is single-use and expires after its TTL.
pub struct PendingAuthorizations {
    ttl: Duration,
    pending: Mutex<HashMap<String, Instant>>,
}

impl Default for PendingAuthorizations {
    fn default() -> Self {
        Self::new(STATE_TTL)
    }
}

impl PendingAuthorizations {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, pending: Mutex::new(HashMap::new()) }
    }

    /// Mint and remember a fresh state value.
    pub fn issue(&self) -> String {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let mut pending = self.pending.lock();
        let ttl = self.ttl;
        pending.retain(|_, issued| issued.elapsed() < ttl);
        pending.insert(state.clone(), Instant::now());
        state
    }

    /// Redeem `state`. Returns false if it is unknown, already used, or expired.
    pub fn consume(&self, state: &str) -> bool {
        match self.pending.lock().remove(state) {
            Some(issued) => issued.elapsed() < self.ttl,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "authorize_tests.rs"]
mod tests;
