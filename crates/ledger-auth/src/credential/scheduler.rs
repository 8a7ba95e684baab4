// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background refresh loop that keeps the credential warm.

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::manager::TokenManager;
use crate::error::AuthError;

struct Driver {
    cancel: CancellationToken,
    interval: Duration,
}

/// At most one periodic refresh driver per manager.
///
/// Starting again replaces the running driver. Stopping is idempotent.
#[derive(Default)]
pub struct RefreshScheduler {
    driver: Mutex<Option<Driver>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a driver that calls [`TokenManager::get_valid_credential`] every
    /// `interval`, starting immediately. Any previous driver is cancelled.
    ///
    /// Returns the cancellation token of the new driver.
    pub fn start(&self, manager: Weak<TokenManager>, interval: Duration) -> CancellationToken {
        let interval = interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let previous =
            self.driver.lock().replace(Driver { cancel: cancel.clone(), interval });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            tracing::debug!("replaced running refresh scheduler");
        }

        tracing::info!(interval_secs = interval.as_secs(), "scheduled refresh started");
        tokio::spawn(drive(manager, interval, cancel.clone()));
        cancel
    }

    /// Cancel the running driver, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        match self.driver.lock().take() {
            Some(driver) => {
                driver.cancel.cancel();
                tracing::info!("scheduled refresh stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.driver.lock().as_ref().map(|d| d.interval)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.cancel.cancel();
        }
    }
}

async fn drive(manager: Weak<TokenManager>, interval: Duration, cancel: CancellationToken) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {}
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            r = manager.get_valid_credential() => r,
        };

        match result {
            Ok(credential) => {
                tracing::debug!(expires_at = ?credential.expires_at, "scheduled refresh check ok");
            }
            Err(AuthError::ReauthenticationRequired(ref msg))
                if manager.store().current().is_empty() =>
            {
                tracing::debug!(reason = %msg, "scheduled refresh skipped, not connected");
            }
            Err(e) => {
                tracing::warn!(err = %e, "scheduled refresh failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
