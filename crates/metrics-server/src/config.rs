// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use metrics_common::config::{
    env_bool, env_parse, non_empty, process_env, read_file, validate_log_level, CONFIG_PATH_ENV,
};
use metrics_common::errors::ConfigError;
use serde::Deserialize;

use crate::security::TrustedSubnet;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_STORE_INTERVAL_SECS: u64 = 300;
const DEFAULT_STORE_FILE: &str = "metrics_data";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Collector settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    pub address: String,
    /// Snapshot flush period. Zero writes the snapshot synchronously on every update.
    pub store_interval: Duration,
    /// Snapshot file. `None` disables persistence of the volatile store.
    pub store_file: Option<PathBuf>,
    /// Load the snapshot file at startup
    pub restore: bool,
    /// PostgreSQL DSN. When set, the relational backend replaces the volatile store.
    pub database_dsn: Option<String>,
    /// HMAC key for request verification and response signing
    pub key: Option<String>,
    /// Path to the PEM private key for request decryption
    pub crypto_key: Option<String>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub shutdown_timeout: Duration,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            store_interval: Duration::from_secs(DEFAULT_STORE_INTERVAL_SECS),
            store_file: Some(PathBuf::from(DEFAULT_STORE_FILE)),
            restore: false,
            database_dsn: None,
            key: None,
            crypto_key: None,
            trusted_subnet: None,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Keys accepted in the JSON config file. Intervals are whole seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    address: Option<String>,
    store_interval: Option<u64>,
    store_file: Option<String>,
    restore: Option<bool>,
    database_dsn: Option<String>,
    key: Option<String>,
    crypto_key: Option<String>,
    trusted_subnet: Option<String>,
    shutdown_timeout: Option<u64>,
    log_level: Option<String>,
}

impl ServerConfig {
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

        // An explicitly empty path disables persistence, so emptiness is checked after layering.
        let store_file = match lookup("FILE_STORAGE_PATH").or(file.store_file) {
            Some(path) => non_empty(Some(path)).map(PathBuf::from),
            None => defaults.store_file,
        };

        let trusted_subnet = non_empty(lookup("TRUSTED_SUBNET").or(file.trusted_subnet))
            .map(|cidr| {
                cidr.parse::<TrustedSubnet>().map_err(|e| ConfigError::InvalidEnv {
                    name: "TRUSTED_SUBNET",
                    value: format!("{cidr} ({e})"),
                })
            })
            .transpose()?;

        let config = Self {
            address: non_empty(lookup("ADDRESS"))
                .or(non_empty(file.address))
                .map(|address| address.trim().to_string())
                .unwrap_or(defaults.address),
            store_interval: env_parse(lookup, "STORE_INTERVAL")?
                .or(file.store_interval)
                .map(Duration::from_secs)
                .unwrap_or(defaults.store_interval),
            store_file,
            restore: env_bool(lookup, "RESTORE")?
                .or(file.restore)
                .unwrap_or(defaults.restore),
            database_dsn: non_empty(lookup("DATABASE_DSN").or(file.database_dsn)),
            key: non_empty(lookup("KEY").or(file.key)),
            crypto_key: non_empty(lookup("CRYPTO_KEY").or(file.crypto_key)),
            trusted_subnet,
            shutdown_timeout: env_parse(lookup, "SHUTDOWN_TIMEOUT")?
                .or(file.shutdown_timeout)
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            log_level: non_empty(lookup("LOG_LEVEL").or(file.log_level))
                .map(|level| level.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid("ADDRESS cannot be empty".to_string()));
        }
        if !self.address.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "ADDRESS '{}' must be in host:port form",
                self.address
            )));
        }
        validate_log_level(&self.log_level)
    }

    /// Whether every update writes the snapshot file before returning.
    pub fn sync_store(&self) -> bool {
        self.store_interval.is_zero()
    }
}
