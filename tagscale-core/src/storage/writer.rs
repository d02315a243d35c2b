//! Batched sample writes

use super::{SchemaCapabilities, StorageConfig};
use crate::ratelimit::RateLimitedLog;
use crate::schema::TIME_SERIES_TABLE;
use crate::tags::TagStore;
use crate::{Metric, Result, Sample};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Persists one batch of samples atomically
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write_batch(&self, batch: &[Sample]) -> Result<()>;
}

/// Writes batches to PostgreSQL, points and tag facts in one transaction
pub struct PgBatchSink {
    pool: PgPool,
    capabilities: SchemaCapabilities,
}

impl PgBatchSink {
    pub fn new(pool: PgPool, capabilities: SchemaCapabilities) -> Self {
        Self { pool, capabilities }
    }

    /// One metric per key, sorted by key; the first occurrence wins
    fn distinct_metrics(batch: &[Sample]) -> Vec<&Metric> {
        let mut metrics = BTreeMap::new();
        for sample in batch {
            metrics
                .entry(sample.metric.key())
                .or_insert_with(|| sample.metric.as_ref());
        }
        metrics.into_values().collect()
    }

    fn points_query(batch: &[Sample]) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("INSERT INTO {}(time, key, value) ", TIME_SERIES_TABLE));
        qb.push_values(batch, |mut row, sample| {
            row.push_bind(sample.time)
                .push_bind(sample.metric.key().to_string())
                .push_bind(sample.value);
        });
        qb
    }
}

#[async_trait]
impl BatchSink for PgBatchSink {
    async fn write_batch(&self, batch: &[Sample]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        Self::points_query(batch).build().execute(&mut *tx).await?;

        // Concurrent batches lock tag rows in the same order, so they never deadlock
        for metric in Self::distinct_metrics(batch) {
            for class in metric.tag_classes() {
                if !self.capabilities.supports(class) {
                    continue;
                }
                TagStore::upsert_tags(&mut *tx, metric.key(), class, metric.tags(class)).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Splits writes into bounded batches and reports failures
pub struct SampleWriter<S> {
    sink: S,
    max_batch_size: usize,
    error_log: RateLimitedLog,
}

impl<S: BatchSink> SampleWriter<S> {
    pub fn new(sink: S, config: &StorageConfig) -> Self {
        Self {
            sink,
            max_batch_size: config.max_batch_size.max(1),
            error_log: RateLimitedLog::new(config.error_log_interval()),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Write `samples` in order, one batch at a time.
    ///
    /// Stops at the first failing batch. Earlier batches stay committed.
    pub async fn store(&self, samples: &[Sample]) -> Result<()> {
        for batch in samples.chunks(self.max_batch_size) {
            debug!("Inserting {} samples", batch.len());

            if let Err(e) = self.sink.write_batch(batch).await {
                self.error_log.error(
                    &e,
                    "An error occurred while inserting samples. Some samples may be lost.",
                );
                return Err(e);
            }

            if tracing::enabled!(tracing::Level::DEBUG) {
                let keys: BTreeSet<&str> = batch.iter().map(|s| s.metric.key()).collect();
                debug!("Successfully inserted samples for metrics: {:?}", keys);
            }
        }
        Ok(())
    }
}
