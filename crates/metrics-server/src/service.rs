// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric semantics on top of a [`Storage`] backend: validation, read-back and listing.

use std::sync::Arc;

use metrics_common::errors::ValidationError;
use metrics_common::metric::{Metric, MetricKind, MetricValue};

use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{kind} metric '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(e) => ServiceError::Validation(e),
            other => ServiceError::Storage(other),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService {
    storage: Arc<dyn Storage>,
}

impl MetricsService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        Ok(self.storage.ping().await?)
    }

    /// Applies one record and returns the stored state: the gauge value or the counter total.
    pub async fn update(&self, metric: &Metric) -> Result<Metric, ServiceError> {
        let stored = match metric.validate()? {
            MetricValue::Gauge(value) => {
                self.storage.update_gauge(&metric.id, value).await?;
                MetricValue::Gauge(value)
            }
            MetricValue::Counter(delta) => {
                MetricValue::Counter(self.storage.update_counter(&metric.id, delta).await?)
            }
        };
        Ok(Metric::from_value(metric.id.clone(), stored))
    }

    /// Applies a non-empty batch atomically.
    pub async fn update_batch(&self, metrics: &[Metric]) -> Result<(), ServiceError> {
        if metrics.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        Ok(self.storage.batch_update(metrics).await?)
    }

    /// Looks up the metric named by `query`, which only needs `id` and `type`.
    pub async fn value(&self, query: &Metric) -> Result<Metric, ServiceError> {
        query.validate_query()?;
        let not_found = || ServiceError::NotFound {
            kind: query.kind.to_string(),
            name: query.id.clone(),
        };
        let value = match query.kind {
            MetricKind::Gauge => self
                .storage
                .get_gauge(&query.id)
                .await?
                .map(MetricValue::Gauge),
            MetricKind::Counter => self
                .storage
                .get_counter(&query.id)
                .await?
                .map(MetricValue::Counter),
            MetricKind::Unknown(ref kind) => {
                return Err(ValidationError::UnknownKind(kind.clone()).into())
            }
        };
        value
            .map(|value| Metric::from_value(query.id.clone(), value))
            .ok_or_else(not_found)
    }

    /// Every stored metric, gauges first, each kind in name order.
    pub async fn list(&self) -> Result<Vec<(String, MetricValue)>, ServiceError> {
        let mut all = Vec::new();
        for name in self.storage.list_gauge_names().await? {
            if let Some(value) = self.storage.get_gauge(&name).await? {
                all.push((name, MetricValue::Gauge(value)));
            }
        }
        for name in self.storage.list_counter_names().await? {
            if let Some(total) = self.storage.get_counter(&name).await? {
                all.push((name, MetricValue::Counter(total)));
            }
        }
        Ok(all)
    }
}
