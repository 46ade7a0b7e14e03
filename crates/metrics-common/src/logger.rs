// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Global tracing subscriber for the agent and collector binaries.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Transport crates are silenced; sqlx only reports warnings and above.
const NOISE_FILTER: &str = "h2=off,hyper=off,rustls=off,sqlx=warn";

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("could not parse log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    #[error("setting default subscriber failed: {0}")]
    AlreadyInstalled(String),
}

/// Builds the filter directive for `log_level`, e.g. `info` or `debug,metrics_server=trace`.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, LoggerError> {
    let level = log_level.trim().to_lowercase();
    let level = if level.is_empty() { "info" } else { &level };
    EnvFilter::try_new(format!("{NOISE_FILTER},{level}")).map_err(|e| {
        LoggerError::InvalidLevel {
            level: level.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Installs the process-wide subscriber. Must be called once, before any task is spawned.
pub fn init(log_level: &str) -> Result<(), LoggerError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggerError::AlreadyInstalled(e.to_string()))?;

    debug!("Logging subsystem enabled");
    Ok(())
}
