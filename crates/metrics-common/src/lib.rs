// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Building blocks shared by the metrics agent and the metrics collector.
//!
//! - [`metric`]: the wire record exchanged between agent and collector, and its validation rules.
//! - [`retry`]: the fixed-schedule retry engine used by both the agent sender and the relational
//!   storage backend.
//! - [`codec`] and [`crypto`]: payload framing (gzip, HMAC-SHA256 signature, RSA envelope).
//! - [`config`]: environment and JSON file layering for the binaries' settings.
//! - [`logger`] and [`shutdown`]: tracing subscriber bootstrap and termination signals for the
//!   binaries.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod codec;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod errors;
pub mod logger;
pub mod metric;
pub mod retry;
pub mod shutdown;
