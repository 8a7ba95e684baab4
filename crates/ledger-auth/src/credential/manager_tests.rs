// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::test_support::{credential_expiring_in, ManagerBuilder, MockResponse, MockTokenServer};

#[tokio::test]
async fn cold_start_requires_reauth_without_network() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("a", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url()).build(dir.path()).await?;

    let err = manager.get_valid_credential().await.expect_err("should need reauth");
    assert!(err.is_reauthentication_required());
    assert_eq!(server.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn valid_credential_is_returned_without_network() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("a", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(3600, Some("rt")))
        .build(dir.path())
        .await?;

    let cred = manager.get_valid_credential().await?;
    assert_eq!(cred.access_token.as_deref(), Some("stored-access"));
    assert_eq!(server.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn stale_credential_refreshes_and_keeps_refresh_token() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("fresh", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(60, Some("original-rt")))
        .build(dir.path())
        .await?;

    let before = now_ms();
    let cred = manager.get_valid_credential().await?;
    let after = now_ms();
    assert_eq!(cred.access_token.as_deref(), Some("fresh"));
    assert_eq!(cred.refresh_token.as_deref(), Some("original-rt"));
    assert_eq!(cred.realm_id.as_deref(), Some("9130"));
    assert_eq!(server.calls(), 1);

    let expires_at = cred.expires_at.expect("expiry from expires_in");
    assert!(expires_at >= before + 3_600_000);
    assert!(expires_at <= after + 3_600_000);

    // Second call is served from the refreshed credential.
    manager.get_valid_credential().await?;
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn rotated_refresh_token_is_persisted() -> anyhow::Result<()> {
    let server =
        MockTokenServer::start(vec![MockResponse::token("fresh", Some("rotated-rt"), 3600)])
            .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("original-rt")))
        .build(dir.path())
        .await?;

    manager.get_valid_credential().await?;

    let reloaded = CredentialStore::load(dir.path().join("tokens.json"));
    assert_eq!(reloaded.current().refresh_token.as_deref(), Some("rotated-rt"));
    assert_eq!(reloaded.current().access_token.as_deref(), Some("fresh"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_refresh() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::token("fresh", Some("rotated-rt"), 3600).delayed(Duration::from_millis(300))
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("original-rt")))
        .build(dir.path())
        .await?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move { manager.get_valid_credential().await }));
    }

    for handle in handles {
        let cred = handle.await??;
        assert_eq!(cred.access_token.as_deref(), Some("fresh"));
        assert_eq!(cred.refresh_token.as_deref(), Some("rotated-rt"));
    }
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failure() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::oauth_error(400, "invalid_grant").delayed(Duration::from_millis(200))
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("dead-rt")))
        .build(dir.path())
        .await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move { manager.get_valid_credential().await }));
    }

    for handle in handles {
        let err = handle.await?.expect_err("should fail");
        assert!(err.is_reauthentication_required());
    }
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_grant_clears_store() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::oauth_error(400, "invalid_grant")]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("dead-rt")))
        .build(dir.path())
        .await?;

    let err = manager.get_valid_credential().await.expect_err("should fail");
    assert!(err.is_reauthentication_required());
    assert!(!manager.status().available);
    assert!(!dir.path().join("tokens.json").exists());

    // The dead refresh token is not replayed.
    let err = manager.get_valid_credential().await.expect_err("should fail");
    assert!(err.is_reauthentication_required());
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn issuer_timeout_keeps_stale_credential() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::token("late", None, 3600).delayed(Duration::from_secs(5))
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let stale = credential_expiring_in(60, Some("rt"));
    let manager = ManagerBuilder::new(&server.token_url())
        .timeout(Duration::from_millis(200))
        .credential(stale.clone())
        .build(dir.path())
        .await?;

    let err = manager.get_valid_credential().await.expect_err("should time out");
    assert!(err.is_temporarily_unavailable());
    assert_eq!(manager.store().current(), stale);
    assert!(manager.status().has_refresh_token);
    assert!(!manager.status().refresh_in_flight);
    Ok(())
}

#[tokio::test]
async fn server_error_is_retried_on_next_call() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::oauth_error(503, "server_error"),
        MockResponse::token("fresh", None, 3600),
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("rt")))
        .build(dir.path())
        .await?;

    let err = manager.get_valid_credential().await.expect_err("first attempt fails");
    assert!(err.is_temporarily_unavailable());

    let cred = manager.get_valid_credential().await?;
    assert_eq!(cred.access_token.as_deref(), Some("fresh"));
    assert_eq!(server.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn expired_without_refresh_token_requires_reauth() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("a", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, None))
        .build(dir.path())
        .await?;

    let err = manager.get_valid_credential().await.expect_err("should need reauth");
    assert!(err.is_reauthentication_required());
    assert_eq!(manager.status().state, CredentialState::ExpiredNoRefresh);
    assert_eq!(server.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn authorization_flow_stores_credential() -> anyhow::Result<()> {
    let server =
        MockTokenServer::start(vec![MockResponse::token("first", Some("first-rt"), 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url()).build(dir.path()).await?;

    let request = manager.begin_authorization()?;
    assert!(request.auth_url.contains(&request.state));

    let cred = manager.complete_authorization(&request.state, "auth-code", "4620816365").await?;
    assert_eq!(cred.realm_id.as_deref(), Some("4620816365"));
    assert_eq!(cred.refresh_token.as_deref(), Some("first-rt"));
    assert!(manager.status().is_valid);

    // The same state cannot be redeemed twice.
    let err = manager
        .complete_authorization(&request.state, "auth-code", "4620816365")
        .await
        .expect_err("state is single use");
    assert!(matches!(err, AuthError::BadRequest(_)));
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_state_is_rejected_without_network() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("a", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url()).build(dir.path()).await?;

    let err = manager.complete_authorization("forged", "code", "1").await.expect_err("rejected");
    assert!(matches!(err, AuthError::BadRequest(_)));
    assert_eq!(server.calls(), 0);
    Ok(())
}

#[yare::parameterized(
    not_found = { 404 },
    method_not_allowed = { 405 },
    proxy_auth_required = { 407 },
    unsupported_media_type = { 415 },
)]
fn non_rejection_client_error_keeps_credential(status: u16) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    rt.block_on(async {
        let server = MockTokenServer::start(vec![MockResponse::new(
            status,
            serde_json::json!({ "message": "not a token endpoint" }),
        )])
        .await
        .expect("mock server");
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = credential_expiring_in(-10, Some("rt"));
        let manager = ManagerBuilder::new(&server.token_url())
            .credential(stale.clone())
            .build(dir.path())
            .await
            .expect("manager");

        let err = manager.get_valid_credential().await.expect_err("should fail");
        assert!(err.is_temporarily_unavailable());
        assert_eq!(manager.store().current(), stale);
        assert!(manager.status().available);
        assert!(dir.path().join("tokens.json").exists());
    });
}

#[yare::parameterized(
    rejected_code = { 400, true },
    issuer_down = { 503, false },
)]
fn authorization_failure_is_classified(status: u16, reauth: bool) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    rt.block_on(async {
        let server = MockTokenServer::start(vec![MockResponse::oauth_error(status, "invalid_grant")])
            .await
            .expect("mock server");
        let dir = tempfile::tempdir().expect("tempdir");
        let manager =
            ManagerBuilder::new(&server.token_url()).build(dir.path()).await.expect("manager");

        let err = manager.authorize("code", "9130").await.expect_err("should fail");
        assert_eq!(err.is_reauthentication_required(), reauth);
        assert_eq!(err.is_temporarily_unavailable(), !reauth);
        assert!(!manager.status().available);
    });
}

#[tokio::test]
async fn logout_clears_without_network() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("a", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(3600, Some("rt")))
        .build(dir.path())
        .await?;

    manager.logout().await?;
    assert!(!manager.status().available);
    assert!(!dir.path().join("tokens.json").exists());
    assert_eq!(server.calls(), 0);

    // Logging out twice is fine.
    manager.logout().await?;
    Ok(())
}

#[tokio::test]
async fn status_reports_refresh_in_flight() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::token("fresh", None, 3600).delayed(Duration::from_millis(300))
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("rt")))
        .build(dir.path())
        .await?;

    let status = manager.status();
    assert_eq!(status.state, CredentialState::Stale);
    assert!(status.is_expired);
    assert!(!status.is_valid);

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get_valid_credential().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.status().refresh_in_flight);

    waiter.await??;
    let status = manager.status();
    assert!(!status.refresh_in_flight);
    assert!(status.is_valid);
    assert_eq!(status.state, CredentialState::Valid);
    Ok(())
}

#[tokio::test]
async fn refresh_survives_caller_cancellation() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::token("fresh", None, 3600).delayed(Duration::from_millis(200))
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("rt")))
        .build(dir.path())
        .await?;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), manager.get_valid_credential()).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(manager.store().current().access_token.as_deref(), Some("fresh"));
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn reauthorization_during_refresh_is_not_clobbered() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::oauth_error(400, "invalid_grant").delayed(Duration::from_millis(300))
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .credential(credential_expiring_in(-10, Some("dead-rt")))
        .build(dir.path())
        .await?;

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get_valid_credential().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut replacement = credential_expiring_in(3600, Some("new-rt"));
    replacement.access_token = Some("new-access".to_owned());
    manager.store().save(replacement.clone()).await?;

    let _ = waiter.await?;
    assert_eq!(manager.store().current(), replacement);
    Ok(())
}

#[tokio::test]
async fn wider_margin_refreshes_earlier() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![MockResponse::token("fresh", None, 3600)]).await?;
    let dir = tempfile::tempdir()?;
    let manager = ManagerBuilder::new(&server.token_url())
        .margin(Duration::from_secs(900))
        .credential(credential_expiring_in(600, Some("rt")))
        .build(dir.path())
        .await?;

    let cred = manager.get_valid_credential().await?;
    assert_eq!(cred.access_token.as_deref(), Some("fresh"));
    assert_eq!(server.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn repeated_refreshes_keep_original_refresh_token() -> anyhow::Result<()> {
    let server = MockTokenServer::start(vec![
        MockResponse::token("second", None, 3600),
        MockResponse::token("third", None, 3600),
    ])
    .await?;
    let dir = tempfile::tempdir()?;
    // A margin wider than the lifetime makes every credential stale on arrival.
    let manager = ManagerBuilder::new(&server.token_url())
        .margin(Duration::from_secs(7200))
        .credential(credential_expiring_in(-10, Some("original-rt")))
        .build(dir.path())
        .await?;

    let cred = manager.get_valid_credential().await?;
    assert_eq!(cred.access_token.as_deref(), Some("second"));
    assert_eq!(cred.refresh_token.as_deref(), Some("original-rt"));

    let cred = manager.get_valid_credential().await?;
    assert_eq!(cred.access_token.as_deref(), Some("third"));
    assert_eq!(cred.refresh_token.as_deref(), Some("original-rt"));
    assert_eq!(server.calls(), 2);

    let reloaded = CredentialStore::load(dir.path().join("tokens.json"));
    assert_eq!(reloaded.current().refresh_token.as_deref(), Some("original-rt"));
    Ok(())
}

#[yare::parameterized(
    far_past = { i64::MIN },
    far_future = { i64::MAX },
)]
fn status_tolerates_extreme_expiry(expires_at: i64) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    rt.block_on(async {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut credential = credential_expiring_in(0, Some("rt"));
        credential.expires_at = Some(expires_at);
        let manager = ManagerBuilder::new("http://127.0.0.1:9/token")
            .credential(credential)
            .build(dir.path())
            .await
            .expect("manager");

        let status = manager.status();
        assert_eq!(status.expires_at, Some(expires_at));
        let secs = status.expires_in_secs.expect("expires_in_secs");
        assert_eq!(secs < 0, expires_at == i64::MIN);
    });
}
