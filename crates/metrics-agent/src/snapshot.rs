// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Latest readings shared between collectors and the batch assembler.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A consistent copy of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub gauges: BTreeMap<String, f64>,
    pub poll_count: i64,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.poll_count == 0
    }
}

/// Gauge values with latest-value semantics plus a monotonic poll counter, behind one lock.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: Mutex<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the given gauges and, for primary collectors, counts one poll.
    ///
    /// Non-finite readings are dropped and the previous value is kept.
    pub fn record<I>(&self, readings: I, count_poll: bool)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut inner = self.lock();
        inner
            .gauges
            .extend(readings.into_iter().filter(|(_, value)| value.is_finite()));
        if count_poll {
            inner.poll_count += 1;
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }
}
