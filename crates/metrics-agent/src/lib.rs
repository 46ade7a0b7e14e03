// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Push-based metrics agent.
//!
//! Collectors write into a [`snapshot::SnapshotStore`]. On every report tick the
//! [`assembler::BatchAssembler`] copies the store into a batch and places it on the bounded
//! dispatch queue, where a [`worker::WorkerPool`] hands batches to the [`sender::MetricsSender`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod assembler;
pub mod collector;
pub mod config;
pub mod errors;
pub mod queue;
pub mod sender;
pub mod snapshot;
pub mod worker;
