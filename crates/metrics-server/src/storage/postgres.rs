// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use metrics_common::errors::ValidationError;
use metrics_common::metric::{Metric, MetricValue};
use metrics_common::retry::{with_retry, RetryPolicy};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{check_gauge, plan_batch, Storage, StorageError};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection exceptions (class 08) and `transaction_resolution_unknown`.
const RETRIABLE_SQLSTATES: [&str; 6] = ["08000", "08003", "08006", "08001", "08004", "08007"];

/// `numeric_value_out_of_range`, raised when a counter total leaves the BIGINT range.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

const CREATE_GAUGES: &str = r#"
    CREATE TABLE IF NOT EXISTS gauges (
        id TEXT PRIMARY KEY,
        value DOUBLE PRECISION NOT NULL
    )
"#;

const CREATE_COUNTERS: &str = r#"
    CREATE TABLE IF NOT EXISTS counters (
        id TEXT PRIMARY KEY,
        delta BIGINT NOT NULL
    )
"#;

const UPSERT_GAUGE: &str = r#"
    INSERT INTO gauges (id, value) VALUES ($1, $2)
    ON CONFLICT (id) DO UPDATE SET value = EXCLUDED.value
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO counters (id, delta) VALUES ($1, $2)
    ON CONFLICT (id) DO UPDATE SET delta = counters.delta + EXCLUDED.delta
    RETURNING delta
"#;

pub fn is_retriable_sqlstate(code: &str) -> bool {
    RETRIABLE_SQLSTATES.contains(&code)
}

pub fn is_retriable_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(Cow::into_owned)
            .is_some_and(|code| is_retriable_sqlstate(&code)),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Maps an out-of-range counter upsert to the same error the volatile store reports.
fn counter_error(name: &str, err: sqlx::Error) -> StorageError {
    let overflow = matches!(
        &err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE)
    );
    if overflow {
        ValidationError::CounterOverflow {
            name: name.to_string(),
        }
        .into()
    } else {
        err.into()
    }
}

/// PostgreSQL store. Every call is retried under the default policy on connection failures.
pub struct PgStorage {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgStorage {
    /// Connects and creates the tables when they do not exist.
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let retry = RetryPolicy::default();
        let pool = with_retry(
            "connect to database",
            &retry,
            StorageError::is_retriable,
            || async move {
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(dsn)
                    .await
                    .map_err(StorageError::from)
            },
        )
        .await?;

        let storage = Self { pool, retry };
        storage.migrate().await?;
        info!("Database pool initialized, {MAX_CONNECTIONS} max connections");
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        self.retrying("create tables", || async move {
            sqlx::query(CREATE_GAUGES).execute(&self.pool).await?;
            sqlx::query(CREATE_COUNTERS).execute(&self.pool).await?;
            Ok::<_, StorageError>(())
        })
        .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Database pool closed");
    }

    async fn retrying<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        with_retry(label, &self.retry, StorageError::is_retriable, operation).await
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn ping(&self) -> Result<(), StorageError> {
        self.retrying("ping", || async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn update_gauge(&self, name: &str, value: f64) -> Result<(), StorageError> {
        check_gauge(value)?;
        self.retrying("update gauge", || async move {
            sqlx::query(UPSERT_GAUGE)
                .bind(name)
                .bind(value)
                .execute(&self.pool)
                .await?;
            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<i64, StorageError> {
        self.retrying("update counter", || async move {
            let total = sqlx::query_scalar::<_, i64>(UPSERT_COUNTER)
                .bind(name)
                .bind(delta)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| counter_error(name, e))?;
            Ok::<_, StorageError>(total)
        })
        .await
    }

    async fn get_gauge(&self, name: &str) -> Result<Option<f64>, StorageError> {
        self.retrying("get gauge", || async move {
            let value = sqlx::query_scalar::<_, f64>("SELECT value FROM gauges WHERE id = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, StorageError>(value)
        })
        .await
    }

    async fn get_counter(&self, name: &str) -> Result<Option<i64>, StorageError> {
        self.retrying("get counter", || async move {
            let delta = sqlx::query_scalar::<_, i64>("SELECT delta FROM counters WHERE id = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, StorageError>(delta)
        })
        .await
    }

    async fn list_gauge_names(&self) -> Result<Vec<String>, StorageError> {
        self.retrying("list gauges", || async move {
            let names = sqlx::query_scalar::<_, String>("SELECT id FROM gauges ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            Ok::<_, StorageError>(names)
        })
        .await
    }

    async fn list_counter_names(&self) -> Result<Vec<String>, StorageError> {
        self.retrying("list counters", || async move {
            let names = sqlx::query_scalar::<_, String>("SELECT id FROM counters ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            Ok::<_, StorageError>(names)
        })
        .await
    }

    async fn batch_update(&self, metrics: &[Metric]) -> Result<(), StorageError> {
        let updates = plan_batch(metrics)?;
        let updates = &updates;
        self.retrying("batch update", || async move {
            let mut tx = self.pool.begin().await?;
            for (name, value) in updates {
                match value {
                    MetricValue::Gauge(value) => {
                        sqlx::query(UPSERT_GAUGE)
                            .bind(*name)
                            .bind(*value)
                            .execute(&mut *tx)
                            .await?;
                    }
                    MetricValue::Counter(delta) => {
                        sqlx::query(UPSERT_COUNTER)
                            .bind(*name)
                            .bind(*delta)
                            .execute(&mut *tx)
                            .await
                            .map_err(|e| counter_error(name, e))?;
                    }
                }
            }
            tx.commit().await?;
            Ok::<_, StorageError>(())
        })
        .await?;
        debug!("Applied batch of {} metrics", updates.len());
        Ok(())
    }
}
