// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use metrics_agent::agent::Agent;
use metrics_agent::config::AgentConfig;
use metrics_common::{logger, shutdown::shutdown_signal};
use tracing::{debug, error};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = AgentConfig::from_env();
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
            error!("Error creating agent config: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(
        "Starting metrics agent: collector {}, {} workers, signing {}, encryption {}",
        config.address,
        config.concurrency(),
        if config.key.is_some() { "on" } else { "off" },
        if config.crypto_key.is_some() { "on" } else { "off" },
    );

    let agent = match Agent::from_config(&config) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Error when starting metrics agent: {e}");
            return ExitCode::FAILURE;
        }
    };

    agent.run(shutdown_signal()).await;
    ExitCode::SUCCESS
}
