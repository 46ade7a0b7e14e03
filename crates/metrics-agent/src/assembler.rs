// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use metrics_common::constants::POLL_COUNT_METRIC;
use metrics_common::metric::Metric;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::{BatchProducer, Enqueue};
use crate::snapshot::{Snapshot, SnapshotStore};

/// One delivery unit: every gauge of a snapshot followed by the `PollCount` counter.
pub type Batch = Vec<Metric>;

fn gauge_records(snapshot: &Snapshot) -> Batch {
    snapshot
        .gauges
        .iter()
        .map(|(name, value)| Metric::gauge(name.clone(), *value))
        .collect()
}

/// Builds the periodic batch. `PollCount` is always present and carries the cumulative count.
pub fn assemble_batch(snapshot: &Snapshot) -> Batch {
    let mut batch = gauge_records(snapshot);
    batch.push(Metric::counter(POLL_COUNT_METRIC, snapshot.poll_count));
    batch
}

/// Builds the shutdown batch, or `None` when there is nothing worth sending.
///
/// `PollCount` is only included when at least one poll happened.
pub fn assemble_final(snapshot: &Snapshot) -> Option<Batch> {
    if snapshot.is_empty() {
        return None;
    }
    let mut batch = gauge_records(snapshot);
    if snapshot.poll_count > 0 {
        batch.push(Metric::counter(POLL_COUNT_METRIC, snapshot.poll_count));
    }
    Some(batch)
}

pub struct BatchAssembler {
    store: Arc<SnapshotStore>,
    producer: BatchProducer,
    interval: Duration,
}

impl BatchAssembler {
    pub fn new(store: Arc<SnapshotStore>, producer: BatchProducer, interval: Duration) -> Self {
        Self {
            store,
            producer,
            interval,
        }
    }

    /// Assembles and enqueues one batch per report interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // The store lock is released before the enqueue may block.
            let batch = assemble_batch(&self.store.snapshot());
            let size = batch.len();
            match self.producer.enqueue(batch, &cancel).await {
                Enqueue::Queued => debug!("Queued batch of {size} metrics"),
                Enqueue::Cancelled => {
                    debug!("Shutdown while waiting for queue room, dropping assembled batch");
                    break;
                }
                Enqueue::Closed => {
                    warn!("Dispatch queue closed, stopping batch assembler");
                    break;
                }
            }
        }
        debug!("Batch assembler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::dispatch_queue;
    use std::collections::BTreeMap;

    #[test]
    fn test_concrete_batch_shape() {
        let snapshot = Snapshot {
            gauges: BTreeMap::from([("Alloc".to_string(), 123.0)]),
            poll_count: 1,
        };
        assert_eq!(
            assemble_batch(&snapshot),
            vec![Metric::gauge("Alloc", 123.0), Metric::counter("PollCount", 1)]
        );
    }

    #[test]
    fn test_periodic_batch_always_carries_poll_count() {
        assert_eq!(
            assemble_batch(&Snapshot::default()),
            vec![Metric::counter("PollCount", 0)]
        );
    }

    #[test]
    fn test_final_batch() {
        assert_eq!(assemble_final(&Snapshot::default()), None);

        let gauges_only = Snapshot {
            gauges: BTreeMap::from([("FreeMemory".to_string(), 10.0)]),
            poll_count: 0,
        };
        assert_eq!(
            assemble_final(&gauges_only),
            Some(vec![Metric::gauge("FreeMemory", 10.0)])
        );

        let polled = Snapshot {
            gauges: BTreeMap::new(),
            poll_count: 5,
        };
        assert_eq!(
            assemble_final(&polled),
            Some(vec![Metric::counter("PollCount", 5)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_assembler_enqueues_each_interval() {
        let store = Arc::new(SnapshotStore::new());
        store.record([("Alloc".to_string(), 123.0)], true);
        let (producer, consumer) = dispatch_queue(2);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            BatchAssembler::new(Arc::clone(&store), producer, Duration::from_secs(10))
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        task.await.unwrap();

        let expected = vec![Metric::gauge("Alloc", 123.0), Metric::counter("PollCount", 1)];
        assert_eq!(consumer.try_next().await, Some(expected.clone()));
        assert_eq!(consumer.try_next().await, Some(expected));
        assert_eq!(consumer.try_next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assembler_exits_when_blocked_on_full_queue() {
        let store = Arc::new(SnapshotStore::new());
        let (producer, _consumer) = dispatch_queue(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            BatchAssembler::new(store, producer, Duration::from_secs(1)).run(cancel.clone()),
        );

        // Two batches fill the queue, the third enqueue blocks.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!task.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("assembler should exit after cancellation")
            .unwrap();
    }
}
