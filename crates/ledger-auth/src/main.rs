// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use ledger_auth::config::Config;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    ledger_auth::init_tracing(&config);

    // reqwest is built without a bundled provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = ledger_auth::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
