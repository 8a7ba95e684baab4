// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use crate::accounting::AccountingClient;
use crate::config::Config;
use crate::credential::manager::TokenManager;

/// Shared service state.
pub struct AppState {
    pub config: Config,
    pub manager: Arc<TokenManager>,
    pub accounting: AccountingClient,
}

impl AppState {
    pub fn new(config: Config, manager: Arc<TokenManager>) -> Self {
        let accounting = AccountingClient::new(
            config.api_base_url(),
            Arc::clone(&manager),
            config.issuer_timeout(),
        );
        Self { config, manager, accounting }
    }
}
