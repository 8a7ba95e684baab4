// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

use super::*;

fn headers_with(value: &str) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().map_err(|e| anyhow::anyhow!("{e}"))?);
    Ok(headers)
}

#[test]
fn no_token_allows_all() {
    assert!(validate_bearer(&HeaderMap::new(), None).is_ok());
}

#[test]
fn valid_bearer_passes() -> anyhow::Result<()> {
    assert!(validate_bearer(&headers_with("Bearer secret123")?, Some("secret123")).is_ok());
    Ok(())
}

#[yare::parameterized(
    wrong_token = { "Bearer wrong" },
    prefix_of_token = { "Bearer secret12" },
    basic_scheme = { "Basic dXNlcjpwYXNz" },
    lowercase_scheme = { "bearer secret123" },
)]
fn rejects_bad_header(value: &str) {
    let headers = headers_with(value).expect("header");
    assert_eq!(validate_bearer(&headers, Some("secret123")).err(), Some(ErrorCode::Unauthorized));
}

#[test]
fn missing_header_rejects() {
    assert_eq!(
        validate_bearer(&HeaderMap::new(), Some("secret123")).err(),
        Some(ErrorCode::Unauthorized)
    );
}

#[test]
fn constant_time_eq_compares_full_strings() {
    assert!(constant_time_eq("abc", "abc"));
    assert!(!constant_time_eq("abc", "abd"));
    assert!(!constant_time_eq("abc", "abcd"));
}
