// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::assembler::Batch;
use crate::queue::BatchConsumer;
use crate::sender::MetricsSender;

/// Fixed set of workers pulling batches from the dispatch queue.
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawns `size` workers (at least one), all subscribed to `consumer` before returning.
    pub fn start(
        size: usize,
        consumer: BatchConsumer,
        sender: Arc<dyn MetricsSender>,
        cancel: CancellationToken,
    ) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..size.max(1) {
            workers.spawn(run_worker(
                id,
                consumer.clone(),
                Arc::clone(&sender),
                cancel.clone(),
            ));
        }
        debug!("Started {} delivery workers", workers.len());
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to finish its drain.
    pub async fn join(&mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("Delivery worker failed: {e}");
            }
        }
    }

    pub fn abort(&mut self) {
        self.workers.abort_all();
    }
}

async fn deliver(id: usize, sender: &dyn MetricsSender, batch: Batch) {
    if let Err(e) = sender.send_batch(&batch).await {
        error!("Worker {id} failed to deliver batch of {} metrics: {e}", batch.len());
    }
}

async fn run_worker(
    id: usize,
    consumer: BatchConsumer,
    sender: Arc<dyn MetricsSender>,
    cancel: CancellationToken,
) {
    while let Some(batch) = consumer.next(&cancel).await {
        deliver(id, sender.as_ref(), batch).await;
    }

    let mut drained = 0;
    while let Some(batch) = consumer.try_next().await {
        deliver(id, sender.as_ref(), batch).await;
        drained += 1;
    }
    debug!("Worker {id} stopped after draining {drained} queued batches");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{dispatch_queue, Enqueue};
    use crate::sender::SendError;
    use async_trait::async_trait;
    use metrics_common::metric::Metric;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every batch and answers with a fixed outcome after `delay`.
    #[derive(Default)]
    struct RecordingSender {
        delay: Duration,
        fail: bool,
        batches: Mutex<Vec<Batch>>,
    }

    #[async_trait]
    impl MetricsSender for RecordingSender {
        async fn send_batch(&self, batch: &[Metric]) -> Result<(), SendError> {
            tokio::time::sleep(self.delay).await;
            self.batches.lock().unwrap().push(batch.to_vec());
            if self.fail {
                Err(SendError::EmptyBatch)
            } else {
                Ok(())
            }
        }

        async fn send_metric(&self, metric: &Metric) -> Result<(), SendError> {
            self.send_batch(std::slice::from_ref(metric)).await
        }
    }

    fn batch(n: i64) -> Batch {
        vec![Metric::counter("PollCount", n)]
    }

    #[tokio::test]
    async fn test_zero_size_pool_still_has_one_worker() {
        let (_, consumer) = dispatch_queue(0);
        let mut pool = WorkerPool::start(
            0,
            consumer,
            Arc::new(RecordingSender::default()),
            CancellationToken::new(),
        );
        assert_eq!(pool.len(), 1);
        pool.abort();
    }

    #[tokio::test]
    async fn test_workers_deliver_and_swallow_errors() {
        let (producer, consumer) = dispatch_queue(2);
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::start(2, consumer, sender.clone(), cancel.clone());

        for n in 0..3 {
            assert_eq!(producer.enqueue(batch(n), &cancel).await, Enqueue::Queued);
        }
        while sender.batches.lock().unwrap().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        pool.join().await;

        assert_eq!(sender.batches.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_batches_are_drained_on_shutdown() {
        let (producer, consumer) = dispatch_queue(2);
        let sender = Arc::new(RecordingSender {
            delay: Duration::from_secs(1),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let enqueue_token = CancellationToken::new();

        // Fill the queue before any worker exists, then cancel right after the pool starts.
        for n in 0..4 {
            producer.enqueue(batch(n), &enqueue_token).await;
        }
        let mut pool = WorkerPool::start(2, consumer, sender.clone(), cancel.clone());
        cancel.cancel();
        pool.join().await;

        let mut delivered: Vec<i64> = sender
            .batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| b[0].delta.unwrap())
            .collect();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![0, 1, 2, 3]);
    }
}
