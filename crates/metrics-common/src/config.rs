// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers for layering settings: environment over JSON file over defaults.
//!
//! Lookups go through a closure rather than `std::env` directly so the layering can be tested
//! without touching process state.

use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::errors::ConfigError;

/// Environment variable naming the optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "CONFIG";

pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads the JSON config file, if any. Fields missing from the file stay at their default.
pub fn read_file<T>(path: Option<&str>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path.filter(|path| !path.trim().is_empty()) else {
        return Ok(T::default());
    };
    let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::File {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::FileFormat {
        path: path.to_string(),
        source,
    })
}

/// A parsed variable. An empty value counts as unset.
pub fn env_parse<T, L>(lookup: &L, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value: raw }),
    }
}

pub fn env_bool<L>(lookup: &L, name: &'static str) -> Result<Option<bool>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { name, value: raw }),
        },
    }
}

/// Collapses empty strings to `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub fn validate_log_level(level: &str) -> Result<(), ConfigError> {
    crate::logger::env_filter(level)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}
