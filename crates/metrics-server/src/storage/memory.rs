// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use metrics_common::errors::ValidationError;
use metrics_common::metric::{Metric, MetricValue};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{check_gauge, plan_batch, Storage, StorageError};

/// On-disk snapshot layout: `{"gauge": {...}, "counter": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub gauge: BTreeMap<String, f64>,
    pub counter: BTreeMap<String, i64>,
}

impl MetricsSnapshot {
    /// Applies one update. On error the snapshot is left untouched.
    fn apply(&mut self, name: &str, value: MetricValue) -> Result<MetricValue, ValidationError> {
        match value {
            MetricValue::Gauge(value) => {
                check_gauge(value)?;
                self.gauge.insert(name.to_string(), value);
                Ok(MetricValue::Gauge(value))
            }
            MetricValue::Counter(delta) => {
                let current = self.counter.get(name).copied().unwrap_or(0);
                let total =
                    current
                        .checked_add(delta)
                        .ok_or_else(|| ValidationError::CounterOverflow {
                            name: name.to_string(),
                        })?;
                self.counter.insert(name.to_string(), total);
                Ok(MetricValue::Counter(total))
            }
        }
    }
}

struct SnapshotFile {
    path: PathBuf,
    sync: bool,
    // Serializes writers so a slow flush never renames over a newer one.
    write_lock: tokio::sync::Mutex<()>,
}

/// Volatile store, optionally mirrored to a snapshot file.
pub struct MemoryStorage {
    state: RwLock<MetricsSnapshot>,
    file: Option<SnapshotFile>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MetricsSnapshot::default()),
            file: None,
        }
    }

    /// A store mirrored to `path`. With `sync` set every update rewrites the file before it
    /// returns.
    pub fn with_file(path: impl AsRef<Path>, sync: bool) -> Self {
        Self {
            state: RwLock::new(MetricsSnapshot::default()),
            file: Some(SnapshotFile {
                path: path.as_ref().to_path_buf(),
                sync,
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.file.is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, MetricsSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MetricsSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.read().clone()
    }

    /// Replaces the in-memory state with the snapshot file.
    ///
    /// Returns `false` when there is no file to restore from. A malformed file is an error.
    pub async fn load(&self) -> Result<bool, StorageError> {
        let Some(file) = &self.file else {
            return Ok(false);
        };
        let path = file.path.display().to_string();
        let bytes = match tokio::fs::read(&file.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {path}, starting empty");
                return Ok(false);
            }
            Err(source) => return Err(StorageError::Snapshot { path, source }),
        };
        let snapshot: MetricsSnapshot = serde_json::from_slice(&bytes)
            .map_err(|source| StorageError::SnapshotFormat {
                path: path.clone(),
                source,
            })?;
        info!(
            "Restored {} gauges and {} counters from {path}",
            snapshot.gauge.len(),
            snapshot.counter.len()
        );
        *self.write() = snapshot;
        Ok(true)
    }

    /// Writes the current state to the snapshot file through a temporary sibling and a rename.
    pub async fn save(&self) -> Result<(), StorageError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let _guard = file.write_lock.lock().await;
        let snapshot = self.snapshot();
        let path = file.path.display().to_string();
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|source| {
            StorageError::SnapshotFormat {
                path: path.clone(),
                source,
            }
        })?;

        let mut tmp = file.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let write = async {
            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, &file.path).await
        };
        write
            .await
            .map_err(|source| StorageError::Snapshot { path, source })?;
        debug!(
            "Wrote snapshot of {} gauges and {} counters",
            snapshot.gauge.len(),
            snapshot.counter.len()
        );
        Ok(())
    }

    async fn after_update(&self) {
        if self.file.as_ref().is_some_and(|file| file.sync) {
            if let Err(e) = self.save().await {
                error!("Failed to write snapshot: {e}");
            }
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StorageError> {
        self.write().apply(name, MetricValue::Gauge(value))?;
        self.after_update().await;
        Ok(())
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64, StorageError> {
        let total = match self.write().apply(name, MetricValue::Counter(delta))? {
            MetricValue::Counter(total) => total,
            MetricValue::Gauge(_) => delta,
        };
        self.after_update().await;
        Ok(total)
    }

    async fn get_gauge(&self, name: &str) -> Result<Option<f64>, StorageError> {
        Ok(self.read().gauge.get(name).copied())
    }

    async fn get_counter(&self, name: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.read().counter.get(name).copied())
    }

    async fn list_gauge_names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read().gauge.keys().cloned().collect())
    }

    async fn list_counter_names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read().counter.keys().cloned().collect())
    }

    async fn batch_update(&self, metrics: &[Metric]) -> Result<(), StorageError> {
        let updates = plan_batch(metrics)?;
        {
            let mut state = self.write();
            let mut next = state.clone();
            for (name, value) in updates {
                next.apply(name, value)?;
            }
            *state = next;
        }
        self.after_update().await;
        Ok(())
    }
}

/// Writes the snapshot every `interval` and once more when `cancel` fires.
pub async fn run_flusher(storage: Arc<MemoryStorage>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = storage.save().await {
                    error!("Failed to write snapshot: {e}");
                }
            }
        }
    }

    match storage.save().await {
        Ok(()) => info!("Final snapshot written"),
        Err(e) => error!("Failed to write final snapshot: {e}"),
    }
}
