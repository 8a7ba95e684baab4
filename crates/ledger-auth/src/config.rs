// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Intuit OAuth2 token endpoint (shared by sandbox and production).
pub const DEFAULT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// Intuit OAuth2 authorization endpoint.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://appcenter.intuit.com/connect/oauth2";

/// Scope granting access to the accounting API.
pub const DEFAULT_SCOPE: &str = "com.intuit.quickbooks.accounting";

/// Which QuickBooks Online API host to talk to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QboEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl QboEnvironment {
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            Self::Production => "https://quickbooks.api.intuit.com",
        }
    }
}

impl std::fmt::Display for QboEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sandbox => f.write_str("sandbox"),
            Self::Production => f.write_str("production"),
        }
    }
}

impl std::str::FromStr for QboEnvironment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" | "development" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => anyhow::bail!("invalid environment: {other}"),
        }
    }
}

/// OAuth token service for the QuickBooks Online invoice agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "ledger-auth", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "LEDGER_AUTH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "LEDGER_AUTH_PORT", default_value_t = 3001)]
    pub port: u16,

    /// Bearer token for the local API. If unset, auth is disabled.
    #[arg(long, env = "LEDGER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// OAuth client ID registered with Intuit.
    #[arg(long, env = "QBO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret registered with Intuit.
    #[arg(long, env = "QBO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Redirect URI registered for the authorization code flow.
    #[arg(long, env = "QBO_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// API environment (sandbox, production).
    #[arg(long, env = "QBO_ENVIRONMENT", default_value = "sandbox")]
    pub environment: String,

    /// OAuth token endpoint.
    #[arg(long, env = "QBO_TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// OAuth authorization endpoint.
    #[arg(long, env = "QBO_AUTHORIZE_URL", default_value = DEFAULT_AUTHORIZE_URL)]
    pub authorize_url: String,

    /// Accounting API base URL. Derived from --environment when unset.
    #[arg(long, env = "QBO_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// OAuth scope requested during authorization.
    #[arg(long, env = "QBO_SCOPE", default_value = DEFAULT_SCOPE)]
    pub scope: String,

    /// Path of the persisted token record.
    #[arg(long, env = "LEDGER_AUTH_TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Seconds before expiry at which a token is treated as stale.
    #[arg(long, env = "LEDGER_AUTH_REFRESH_MARGIN_SECS", default_value_t = 300)]
    pub refresh_safety_margin_seconds: u64,

    /// Background refresh interval in minutes (0 disables the scheduler).
    #[arg(long, env = "LEDGER_AUTH_REFRESH_INTERVAL_MINS", default_value_t = 30)]
    pub scheduled_refresh_interval_minutes: u64,

    /// Timeout for a single token endpoint request, in seconds.
    #[arg(long, env = "LEDGER_AUTH_ISSUER_TIMEOUT_SECS", default_value_t = 30)]
    pub issuer_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "LEDGER_AUTH_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LEDGER_AUTH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Static OAuth client settings handed to the token issuer.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_url: String,
    pub authorize_url: String,
    pub scope: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("authorize_url", &self.authorize_url)
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.oauth()?;
        self.environment_enum()?;

        if self.issuer_timeout_secs == 0 {
            anyhow::bail!("--issuer-timeout-secs must be greater than zero");
        }
        if self.scheduled_refresh_interval_minutes.checked_mul(60).is_none() {
            anyhow::bail!("--scheduled-refresh-interval-minutes is too large");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }

    /// Extract the OAuth client settings, failing when a required value is missing.
    pub fn oauth(&self) -> Result<OAuthConfig, AuthError> {
        let client_id = required(&self.client_id, "client_id")?;
        let client_secret = required(&self.client_secret, "client_secret")?;
        let redirect_uri = required(&self.redirect_uri, "redirect_uri")?;

        Ok(OAuthConfig {
            client_id,
            client_secret,
            redirect_uri,
            token_url: self.token_url.clone(),
            authorize_url: self.authorize_url.clone(),
            scope: self.scope.clone(),
            timeout: self.issuer_timeout(),
        })
    }

    /// Parse the environment string into an enum.
    pub fn environment_enum(&self) -> anyhow::Result<QboEnvironment> {
        self.environment.parse()
    }

    /// Accounting API base URL, explicit override first.
    pub fn api_base_url(&self) -> String {
        match self.api_base_url {
            Some(ref url) => url.trim_end_matches('/').to_owned(),
            None => self.environment_enum().unwrap_or_default().api_base_url().to_owned(),
        }
    }

    /// Resolve the persisted token record path.
    ///
    /// Checks `--token-path`, then `$XDG_STATE_HOME/ledger-auth/tokens.json`,
    /// then `$HOME/.local/state/ledger-auth/tokens.json`.
    pub fn token_path(&self) -> PathBuf {
        if let Some(ref path) = self.token_path {
            return path.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("ledger-auth/tokens.json");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/ledger-auth/tokens.json");
        }
        PathBuf::from(".ledger-auth/tokens.json")
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_safety_margin_seconds)
    }

    /// Background refresh interval, `None` when the scheduler is disabled.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.scheduled_refresh_interval_minutes {
            0 => None,
            mins => Some(Duration::from_secs(mins.saturating_mul(60))),
        }
    }

    pub fn issuer_timeout(&self) -> Duration {
        Duration::from_secs(self.issuer_timeout_secs)
    }

    /// Build a fully populated `Config` for tests.
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            auth_token: None,
            client_id: Some("test-client".into()),
            client_secret: Some("test-secret".into()),
            redirect_uri: Some("http://localhost:3001/api/v1/auth/callback".into()),
            environment: "sandbox".into(),
            token_url: "http://127.0.0.1:9/token".into(),
            authorize_url: DEFAULT_AUTHORIZE_URL.into(),
            api_base_url: None,
            scope: DEFAULT_SCOPE.into(),
            token_path: None,
            refresh_safety_margin_seconds: 300,
            scheduled_refresh_interval_minutes: 0,
            issuer_timeout_secs: 5,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, AuthError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        _ => Err(AuthError::Configuration(format!("missing required OAuth setting: {name}"))),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
