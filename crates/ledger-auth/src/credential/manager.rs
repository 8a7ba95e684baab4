// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token lifecycle manager: the single entry point for obtaining a valid
//! QuickBooks credential.
//!
//! Callers ask [`TokenManager::get_valid_credential`] for a credential. When
//! the cached one is stale, exactly one refresh request goes to the issuer
//! and every concurrent caller awaits that same attempt. A terminal issuer
//! rejection clears the store so the next caller is told to reauthorize
//! instead of replaying a dead refresh token.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::authorize::{AuthorizationRequest, PendingAuthorizations};
use super::expiry::ExpiryPolicy;
use super::issuer::{IssuerClient, IssuerError};
use super::scheduler::RefreshScheduler;
use super::store::{CredentialStore, StoreError};
use super::{now_ms, AuthStatus, Credential, CredentialState};
use crate::error::AuthError;

type RefreshOutcome = Result<Credential, AuthError>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The at-most-one outstanding refresh.
///
/// `generation` lets a finishing refresh clear only its own slot.
#[derive(Default)]
struct InFlight {
    generation: u64,
    refresh: Option<RefreshFuture>,
}

pub struct TokenManager {
    store: Arc<CredentialStore>,
    issuer: IssuerClient,
    policy: ExpiryPolicy,
    inflight: Arc<Mutex<InFlight>>,
    pending: PendingAuthorizations,
    scheduler: RefreshScheduler,
}

impl TokenManager {
    pub fn new(store: Arc<CredentialStore>, issuer: IssuerClient, policy: ExpiryPolicy) -> Arc<Self> {
        Arc::new(Self {
            store,
            issuer,
            policy,
            inflight: Arc::new(Mutex::new(InFlight::default())),
            pending: PendingAuthorizations::default(),
            scheduler: RefreshScheduler::new(),
        })
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Return a credential that is valid right now, refreshing if needed.
    ///
    /// Never contacts the issuer when the cached credential is valid or
    /// when there is nothing to refresh.
    pub async fn get_valid_credential(&self) -> Result<Credential, AuthError> {
        let current = self.store.current();
        if self.policy.is_valid(&current, now_ms()) {
            return Ok(current);
        }

        let refresh = {
            let mut slot = self.inflight.lock();
            let existing = slot.refresh.clone();
            match existing {
                Some(refresh) => refresh,
                None => {
                    // A refresh may have landed between the first read and taking the slot.
                    let current = self.store.current();
                    match self.policy.state(&current, now_ms()) {
                        CredentialState::Valid => return Ok(current),
                        CredentialState::Unauthenticated => {
                            return Err(AuthError::ReauthenticationRequired(
                                "no QuickBooks connection; authorization required".into(),
                            ));
                        }
                        CredentialState::ExpiredNoRefresh => {
                            return Err(AuthError::ReauthenticationRequired(
                                "access token expired and no refresh token is stored".into(),
                            ));
                        }
                        CredentialState::Stale => {}
                    }
                    let Some(refresh_token) = current.refresh_token else {
                        return Err(AuthError::ReauthenticationRequired(
                            "no refresh token is stored".into(),
                        ));
                    };
                    self.start_refresh(&mut slot, refresh_token)
                }
            }
        };

        refresh.await
    }

    /// Spawn the refresh task and publish its shared handle in `slot`.
    ///
    /// The work runs on its own task so it completes even if every waiter
    /// is cancelled.
    fn start_refresh(&self, slot: &mut InFlight, refresh_token: String) -> RefreshFuture {
        slot.generation += 1;
        let generation = slot.generation;
        debug!(generation, "starting token refresh");

        let task = tokio::spawn(run_refresh(
            Arc::clone(&self.store),
            self.issuer.clone(),
            refresh_token,
            Arc::clone(&self.inflight),
            generation,
        ));
        let refresh = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AuthError::TemporarilyUnavailable(format!("refresh task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        slot.refresh = Some(refresh.clone());
        refresh
    }

    /// Begin the authorization code flow.
    pub fn begin_authorization(&self) -> Result<AuthorizationRequest, AuthError> {
        let state = self.pending.issue();
        let auth_url = self.issuer.authorization_url(&state)?;
        info!("authorization flow started");
        Ok(AuthorizationRequest { auth_url, state })
    }

    /// Finish the authorization code flow started by [`Self::begin_authorization`].
    pub async fn complete_authorization(
        &self,
        state: &str,
        code: &str,
        realm_id: &str,
    ) -> Result<Credential, AuthError> {
        if !self.pending.consume(state) {
            return Err(AuthError::BadRequest("unknown or expired authorization state".into()));
        }
        self.authorize(code, realm_id).await
    }

    /// Exchange an authorization code and store the resulting credential.
    pub async fn authorize(&self, code: &str, realm_id: &str) -> Result<Credential, AuthError> {
        if code.is_empty() || realm_id.is_empty() {
            return Err(AuthError::BadRequest("code and realmId are required".into()));
        }
        let grant = self
            .issuer
            .exchange_authorization_code(code)
            .await
            .map_err(|e| e.into_auth_error("authorization code exchange failed"))?;
        let credential = Credential::from_grant(&grant, realm_id, now_ms());
        let credential = self.store.save(credential).await?;
        info!(realm_id, expires_at = ?credential.expires_at, "QuickBooks connected");
        Ok(credential)
    }

    /// Forget the credential. The issuer is not contacted.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.store.clear().await?;
        info!("QuickBooks disconnected");
        Ok(())
    }

    /// Non-secret snapshot for diagnostics.
    pub fn status(&self) -> AuthStatus {
        let current = self.store.current();
        let now = now_ms();
        AuthStatus {
            available: current.is_complete(),
            has_tokens: !current.is_empty(),
            has_refresh_token: current.has_refresh_token(),
            realm_id: current.realm_id.clone(),
            state: self.policy.state(&current, now),
            expires_at: current.expires_at,
            expires_in_secs: current.expires_at.map(|e| e.saturating_sub(now) / 1000),
            is_expired: current.expires_at.is_some_and(|e| now >= e),
            is_valid: self.policy.is_valid(&current, now),
            last_updated: current.last_updated.clone(),
            refresh_in_flight: self.inflight.lock().refresh.is_some(),
            scheduler_running: self.scheduler.is_running(),
        }
    }

    /// Start (or restart) periodic background refresh.
    pub fn start_scheduled_refresh(self: &Arc<Self>, interval: Duration) -> CancellationToken {
        self.scheduler.start(Arc::downgrade(self), interval)
    }

    /// Stop periodic background refresh. Safe to call when not running.
    pub fn stop_scheduled_refresh(&self) -> bool {
        self.scheduler.stop()
    }

    pub fn scheduled_refresh_interval(&self) -> Option<Duration> {
        self.scheduler.interval()
    }
}

async fn run_refresh(
    store: Arc<CredentialStore>,
    issuer: IssuerClient,
    refresh_token: String,
    inflight: Arc<Mutex<InFlight>>,
    generation: u64,
) -> RefreshOutcome {
    let outcome = match issuer.exchange_refresh_token(&refresh_token).await {
        Ok(grant) => match store.update(&grant, &refresh_token).await {
            Ok(credential) => {
                info!(expires_at = ?credential.expires_at, "access token refreshed");
                Ok(credential)
            }
            Err(StoreError::Superseded) => {
                debug!("credential replaced during refresh, discarding result");
                Ok(store.current())
            }
            Err(e) => {
                warn!(err = %e, "failed to store refreshed credential");
                Err(e.into())
            }
        },
        Err(e @ IssuerError::Terminal { .. }) => {
            warn!(status = ?e.status(), oauth_error = ?e.oauth_error(), "refresh token rejected, clearing credential");
            if let Err(clear_err) = store.revoke(&refresh_token).await {
                warn!(err = %clear_err, "failed to clear rejected credential");
            }
            Err(e.into_auth_error("token refresh failed"))
        }
        Err(e) => {
            warn!(status = ?e.status(), err = %e, "token refresh failed, keeping stored credential");
            Err(e.into_auth_error("token refresh failed"))
        }
    };

    let mut slot = inflight.lock();
    if slot.generation == generation {
        slot.refresh = None;
    }
    outcome
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
