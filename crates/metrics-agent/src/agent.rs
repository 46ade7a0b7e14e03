// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires collectors, the assembler, the dispatch queue and the worker pool together, and owns the
//! shutdown sequence.
//!
//! Shutdown order:
//! 1. the cancellation token fires; collectors and the assembler stop, workers drain the queue
//! 2. the orchestrator waits for all of them, bounded by the shutdown timeout
//! 3. one final batch is built from the snapshot store and sent directly

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics_common::codec::PayloadEncoder;
use metrics_common::crypto::Encryptor;
use metrics_common::retry::RetryPolicy;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assembler::{assemble_final, BatchAssembler};
use crate::collector::{run_collector, Collector, HostCollector, RuntimeCollector};
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::queue::dispatch_queue;
use crate::sender::{HttpSender, HttpSenderConfig, MetricsSender};
use crate::snapshot::SnapshotStore;
use crate::worker::WorkerPool;

pub struct Agent {
    concurrency: usize,
    report_interval: Duration,
    shutdown_timeout: Duration,
    store: Arc<SnapshotStore>,
    sender: Arc<dyn MetricsSender>,
    collectors: Vec<(Box<dyn Collector>, Duration)>,
}

impl Agent {
    /// An agent with the HTTP sender and the runtime and host collectors, both on the poll
    /// interval.
    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        let encryptor = Encryptor::from_optional_file(config.crypto_key.as_deref())?;
        let sender = HttpSender::new(HttpSenderConfig {
            base_url: config.address.clone(),
            encoder: PayloadEncoder::new(config.key.clone(), encryptor),
            timeout: config.request_timeout,
            retry_policy: RetryPolicy::default(),
        })?;

        Ok(Self::new(config, Arc::new(sender))
            .with_collector(Box::new(RuntimeCollector::new()), config.poll_interval)
            .with_collector(Box::new(HostCollector::new()), config.poll_interval))
    }

    /// An agent without collectors.
    pub fn new(config: &AgentConfig, sender: Arc<dyn MetricsSender>) -> Self {
        Self {
            concurrency: config.concurrency(),
            report_interval: config.report_interval,
            shutdown_timeout: config.shutdown_timeout,
            store: Arc::new(SnapshotStore::new()),
            sender,
            collectors: Vec::new(),
        }
    }

    pub fn with_collector(mut self, collector: Box<dyn Collector>, interval: Duration) -> Self {
        self.collectors.push((collector, interval));
        self
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Runs the pipeline until `shutdown` resolves, then shuts it down.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let (producer, consumer) = dispatch_queue(self.concurrency);

        // Workers subscribe before anything produces.
        let mut pool = WorkerPool::start(
            self.concurrency,
            consumer,
            Arc::clone(&self.sender),
            cancel.clone(),
        );

        let mut tasks = JoinSet::new();
        for (collector, interval) in self.collectors {
            tasks.spawn(run_collector(
                collector,
                interval,
                Arc::clone(&self.store),
                cancel.clone(),
            ));
        }
        tasks.spawn(
            BatchAssembler::new(Arc::clone(&self.store), producer, self.report_interval)
                .run(cancel.clone()),
        );
        info!(
            "Agent started with {} workers, reporting every {:?}",
            pool.len(),
            self.report_interval
        );

        shutdown.await;
        info!("Starting graceful shutdown");
        cancel.cancel();

        let stopped = tokio::time::timeout(self.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
            pool.join().await;
        })
        .await;
        match stopped {
            Ok(()) => debug!("All agent tasks stopped"),
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for agent tasks, aborting them",
                    self.shutdown_timeout
                );
                tasks.abort_all();
                pool.abort();
            }
        }

        flush_final(&self.store, self.sender.as_ref()).await;
        info!("Agent stopped");
    }
}

/// Best-effort delivery of whatever the store holds at shutdown.
pub async fn flush_final(store: &SnapshotStore, sender: &dyn MetricsSender) {
    let Some(batch) = assemble_final(&store.snapshot()) else {
        info!("No metrics to send at shutdown");
        return;
    };
    match sender.send_batch(&batch).await {
        Ok(()) => info!("Final metrics sent successfully ({} metrics)", batch.len()),
        Err(e) => error!("Failed to send final metrics: {e}"),
    }
}
