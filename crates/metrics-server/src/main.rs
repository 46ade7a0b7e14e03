// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use metrics_common::{logger, shutdown::shutdown_signal};
use metrics_server::app::Collector;
use metrics_server::config::ServerConfig;
use tracing::{debug, error, info};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = ServerConfig::from_env();
    let log_level = config
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    if let Err(e) = logger::init(&log_level) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating server config: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(
        "Starting metrics server on {}: database {}, store interval {:?}, restore {}, signing {}, decryption {}",
        config.address,
        if config.database_dsn.is_some() { "on" } else { "off" },
        config.store_interval,
        config.restore,
        if config.key.is_some() { "on" } else { "off" },
        if config.crypto_key.is_some() { "on" } else { "off" },
    );

    let collector = match Collector::start(&config).await {
        Ok(collector) => collector,
        Err(e) => {
            error!("Error when starting metrics server: {e}");
            return ExitCode::FAILURE;
        }
    };

    match collector.run(shutdown_signal()).await {
        Ok(()) => {
            info!("Metrics server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Metrics server failed: {e}");
            ExitCode::FAILURE
        }
    }
}
