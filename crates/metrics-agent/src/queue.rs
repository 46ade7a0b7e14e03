// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded hand-off between the batch assembler and the worker pool.
//!
//! Capacity is `2 × concurrency`: one batch in flight per worker plus one buffered ahead. A full
//! queue blocks the producer, which is the pipeline's only backpressure point.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::assembler::Batch;

/// Outcome of [`BatchProducer::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Shutdown began while waiting for room; the batch was abandoned.
    Cancelled,
    /// Every consumer is gone.
    Closed,
}

pub fn dispatch_queue(concurrency: usize) -> (BatchProducer, BatchConsumer) {
    let capacity = 2 * concurrency.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        BatchProducer { tx },
        BatchConsumer {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Debug, Clone)]
pub struct BatchProducer {
    tx: mpsc::Sender<Batch>,
}

impl BatchProducer {
    /// Waits for room in the queue unless `cancel` fires first.
    pub async fn enqueue(&self, batch: Batch, cancel: &CancellationToken) -> Enqueue {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Enqueue::Cancelled,
            sent = self.tx.send(batch) => match sent {
                Ok(()) => Enqueue::Queued,
                Err(_) => Enqueue::Closed,
            },
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Shared receiving end. Workers race for items.
#[derive(Debug, Clone)]
pub struct BatchConsumer {
    rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
}

impl BatchConsumer {
    /// Waits for the next batch. Returns `None` once `cancel` fires or the queue is closed and
    /// empty.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<Batch> {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            batch = rx.recv() => batch,
        }
    }

    /// Takes a batch only if one is already queued.
    pub async fn try_next(&self) -> Option<Batch> {
        self.rx.lock().await.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_common::metric::Metric;
    use std::time::Duration;

    fn batch(n: i64) -> Batch {
        vec![Metric::counter("PollCount", n)]
    }

    #[tokio::test]
    async fn test_capacity_is_twice_concurrency() {
        assert_eq!(dispatch_queue(3).0.capacity(), 6);
        assert_eq!(dispatch_queue(0).0.capacity(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer_until_drained() {
        let (producer, consumer) = dispatch_queue(2);
        let cancel = CancellationToken::new();
        for n in 0..4 {
            assert_eq!(producer.enqueue(batch(n), &cancel).await, Enqueue::Queued);
        }

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), producer.enqueue(batch(4), &cancel))
                .await;
        assert!(blocked.is_err(), "fifth enqueue should block");

        assert_eq!(consumer.next(&cancel).await, Some(batch(0)));
        let unblocked =
            tokio::time::timeout(Duration::from_millis(50), producer.enqueue(batch(4), &cancel))
                .await;
        assert_eq!(unblocked, Ok(Enqueue::Queued));
    }

    #[tokio::test]
    async fn test_cancel_releases_blocked_producer() {
        let (producer, _consumer) = dispatch_queue(1);
        let cancel = CancellationToken::new();
        producer.enqueue(batch(0), &cancel).await;
        producer.enqueue(batch(1), &cancel).await;

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert_eq!(
            producer.enqueue(batch(2), &cancel).await,
            Enqueue::Cancelled
        );
    }

    #[tokio::test]
    async fn test_try_next_drains_without_waiting() {
        let (producer, consumer) = dispatch_queue(1);
        let cancel = CancellationToken::new();
        producer.enqueue(batch(1), &cancel).await;
        cancel.cancel();

        assert_eq!(consumer.next(&cancel).await, None);
        assert_eq!(consumer.try_next().await, Some(batch(1)));
        assert_eq!(consumer.try_next().await, None);
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (producer, consumer) = dispatch_queue(1);
        drop(consumer);
        assert_eq!(
            producer.enqueue(batch(1), &CancellationToken::new()).await,
            Enqueue::Closed
        );
    }
}
