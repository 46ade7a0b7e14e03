// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use metrics_common::config::{
    env_parse, non_empty, process_env, read_file, validate_log_level, CONFIG_PATH_ENV,
};
use metrics_common::errors::ConfigError;
use serde::Deserialize;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Agent settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Collector base URL, always with a scheme
    pub address: String,
    pub report_interval: Duration,
    pub poll_interval: Duration,
    /// Configured worker count. Zero is accepted and treated as one.
    pub rate_limit: usize,
    /// HMAC signing key
    pub key: Option<String>,
    /// Path to the collector's PEM public key
    pub crypto_key: Option<String>,
    pub shutdown_timeout: Duration,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: normalize_address(DEFAULT_ADDRESS),
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            rate_limit: 0,
            key: None,
            crypto_key: None,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Keys accepted in the JSON config file. Intervals are whole seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    address: Option<String>,
    report_interval: Option<u64>,
    poll_interval: Option<u64>,
    rate_limit: Option<usize>,
    key: Option<String>,
    crypto_key: Option<String>,
    shutdown_timeout: Option<u64>,
    request_timeout: Option<u64>,
    log_level: Option<String>,
}

/// Prepends `http://` when the address has no scheme and strips any trailing slash.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

impl AgentConfig {
    /// Create configuration from the process environment and the optional `CONFIG` file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    /// Layers `lookup` over the config file it names over the defaults, then validates.
    pub fn from_lookup<L>(lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = read_file(lookup(CONFIG_PATH_ENV).as_deref())?;
        let defaults = Self::default();
        let secs = Duration::from_secs;

        let address = non_empty(lookup("ADDRESS"))
            .or(non_empty(file.address))
            .map(|address| normalize_address(&address))
            .unwrap_or(defaults.address);

        let config = Self {
            address,
            report_interval: env_parse(lookup, "REPORT_INTERVAL")?
                .or(file.report_interval)
                .map(secs)
                .unwrap_or(defaults.report_interval),
            poll_interval: env_parse(lookup, "POLL_INTERVAL")?
                .or(file.poll_interval)
                .map(secs)
                .unwrap_or(defaults.poll_interval),
            rate_limit: env_parse(lookup, "RATE_LIMIT")?
                .or(file.rate_limit)
                .unwrap_or(defaults.rate_limit),
            key: non_empty(lookup("KEY").or(file.key)),
            crypto_key: non_empty(lookup("CRYPTO_KEY").or(file.crypto_key)),
            shutdown_timeout: env_parse(lookup, "SHUTDOWN_TIMEOUT")?
                .or(file.shutdown_timeout)
                .map(secs)
                .unwrap_or(defaults.shutdown_timeout),
            request_timeout: env_parse(lookup, "REQUEST_TIMEOUT")?
                .or(file.request_timeout)
                .map(secs)
                .unwrap_or(defaults.request_timeout),
            log_level: non_empty(lookup("LOG_LEVEL").or(file.log_level))
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim_start_matches("http://").is_empty()
            || self.address.trim_start_matches("https://").is_empty()
        {
            return Err(ConfigError::Invalid("ADDRESS cannot be empty".to_string()));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "REPORT_INTERVAL must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "POLL_INTERVAL must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "REQUEST_TIMEOUT must be greater than 0".to_string(),
            ));
        }
        validate_log_level(&self.log_level)
    }

    /// Number of workers actually started.
    pub fn concurrency(&self) -> usize {
        self.rate_limit.max(1)
    }
}
