// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage backends for the collector.
//!
//! Two interchangeable implementations sit behind [`Storage`]: a volatile in-memory store with an
//! optional JSON snapshot file, and a PostgreSQL store. [`open`] picks one from the configuration.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use metrics_common::errors::ValidationError;
use metrics_common::metric::{Metric, MetricKind, MetricValue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use memory::MemoryStorage;
use postgres::PgStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot file {path}: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot file {path}: {source}")]
    SnapshotFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StorageError {
    /// Connection-class failures that a fresh attempt may get past.
    pub fn is_retriable(&self) -> bool {
        match self {
            StorageError::Database(e) => postgres::is_retriable_db_error(e),
            _ => false,
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Replaces the gauge value.
    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StorageError>;

    /// Adds `delta` to the counter and returns the new total.
    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64, StorageError>;

    async fn get_gauge(&self, name: &str) -> Result<Option<f64>, StorageError>;

    async fn get_counter(&self, name: &str) -> Result<Option<i64>, StorageError>;

    /// Gauge names in ascending order.
    async fn list_gauge_names(&self) -> Result<Vec<String>, StorageError>;

    /// Counter names in ascending order.
    async fn list_counter_names(&self) -> Result<Vec<String>, StorageError>;

    /// Applies every record or none of them.
    async fn batch_update(&self, metrics: &[Metric]) -> Result<(), StorageError>;
}

/// Rejects gauge values that have no JSON representation.
pub fn check_gauge(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            kind: "gauge",
            raw: value.to_string(),
        })
    }
}

/// Validates a batch up front and returns the updates to apply, in order.
///
/// Records of an unknown kind are skipped with a warning. Any other invalid record rejects the
/// whole batch.
pub fn plan_batch(metrics: &[Metric]) -> Result<Vec<(&str, MetricValue)>, ValidationError> {
    let mut updates = Vec::with_capacity(metrics.len());
    for metric in metrics {
        if let MetricKind::Unknown(kind) = &metric.kind {
            warn!("Skipping metric '{}' of unknown type '{kind}'", metric.id);
            continue;
        }
        updates.push((metric.id.as_str(), metric.validate()?));
    }
    Ok(updates)
}

enum Backend {
    Memory {
        storage: Arc<MemoryStorage>,
        flusher: Option<JoinHandle<()>>,
        cancel: CancellationToken,
    },
    Postgres(Arc<PgStorage>),
}

/// The selected backend plus whatever background work it owns.
pub struct StorageHandle {
    storage: Arc<dyn Storage>,
    backend: Backend,
}

impl StorageHandle {
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    /// Stops the periodic flusher after its final flush, or closes the connection pool.
    pub async fn shutdown(self) {
        match self.backend {
            Backend::Memory {
                storage,
                flusher,
                cancel,
            } => {
                cancel.cancel();
                match flusher {
                    Some(flusher) => {
                        if let Err(e) = flusher.await {
                            error!("Snapshot flusher failed: {e}");
                        }
                    }
                    None if storage.is_persistent() => {
                        if let Err(e) = storage.save().await {
                            error!("Failed to write final snapshot: {e}");
                        }
                    }
                    None => {}
                }
            }
            Backend::Postgres(storage) => storage.close().await,
        }
        debug!("Storage closed");
    }
}

/// Opens the backend the configuration selects: PostgreSQL when a DSN is set, else memory.
pub async fn open(config: &ServerConfig) -> Result<StorageHandle, StorageError> {
    if let Some(dsn) = &config.database_dsn {
        let storage = Arc::new(PgStorage::connect(dsn).await?);
        info!("Using PostgreSQL storage");
        return Ok(StorageHandle {
            storage: storage.clone(),
            backend: Backend::Postgres(storage),
        });
    }

    let storage = Arc::new(match &config.store_file {
        Some(path) => MemoryStorage::with_file(path, config.sync_store()),
        None => MemoryStorage::new(),
    });
    if config.restore {
        storage.load().await?;
    }

    let cancel = CancellationToken::new();
    let flusher = match &config.store_file {
        Some(path) if !config.sync_store() => {
            info!(
                "Using memory storage, flushing to {} every {:?}",
                path.display(),
                config.store_interval
            );
            Some(tokio::spawn(memory::run_flusher(
                Arc::clone(&storage),
                config.store_interval,
                cancel.clone(),
            )))
        }
        Some(path) => {
            info!(
                "Using memory storage, writing {} on every update",
                path.display()
            );
            None
        }
        None => {
            info!("Using memory storage without persistence");
            None
        }
    };

    Ok(StorageHandle {
        storage: storage.clone(),
        backend: Backend::Memory {
            storage,
            flusher,
            cancel,
        },
    })
}
