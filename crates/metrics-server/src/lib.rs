// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metrics collector.
//!
//! Agents push gauge and counter records over HTTP. The [`server`] verifies and unframes them,
//! the [`service`] validates them, and a [`storage::Storage`] backend keeps them either in memory
//! (with an optional snapshot file) or in PostgreSQL.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod app;
pub mod config;
pub mod errors;
pub mod http_utils;
pub mod security;
pub mod server;
pub mod service;
pub mod storage;
