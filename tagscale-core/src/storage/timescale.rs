//! TimescaleDB-backed storage

use super::{
    MetricResolver, PgBatchSink, PoolConfig, SampleReader, SampleWriter, StorageConfig,
    TimeSeriesStorage,
};
use crate::schema::{DatabaseInitializer, InitOutcome, TAG_TABLE, TIME_SERIES_TABLE};
use crate::{Aggregation, FetchRequest, Metric, Result, Sample, TagMatcher};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

/// Tag-indexed time-series storage on a TimescaleDB hypertable
///
/// Cheap to share behind an `Arc`; all state is fixed after construction.
pub struct TimescaleStorage {
    pool: PgPool,
    config: StorageConfig,
    writer: SampleWriter<PgBatchSink>,
}

impl TimescaleStorage {
    /// Open a connection pool and wrap it
    pub async fn connect(pool_config: &PoolConfig, config: StorageConfig) -> Result<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .acquire_timeout(Duration::from_secs(pool_config.acquire_timeout_secs))
            .connect(&pool_config.url)
            .await?;

        info!(
            "Connected to TimescaleDB (max {} connections)",
            pool_config.max_connections
        );
        Self::new(pool, config)
    }

    /// Wrap an existing pool
    pub fn new(pool: PgPool, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let sink = PgBatchSink::new(pool.clone(), config.capabilities);
        let writer = SampleWriter::new(sink, &config);
        Ok(Self {
            pool,
            config,
            writer,
        })
    }

    /// Create the schema if the extension is present and tables are missing
    pub async fn init(&self) -> Result<InitOutcome> {
        DatabaseInitializer::new(&self.pool).initialize_if_needed().await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[async_trait]
impl TimeSeriesStorage for TimescaleStorage {
    async fn store(&self, samples: &[Sample]) -> Result<()> {
        self.writer.store(samples).await
    }

    async fn find_metrics(&self, matchers: &[TagMatcher]) -> Result<Vec<Metric>> {
        let mut conn = self.pool.acquire().await?;
        MetricResolver::find_metrics(&mut conn, matchers, self.config.capabilities).await
    }

    async fn get_timeseries(&self, request: &FetchRequest) -> Result<Vec<Sample>> {
        let mut conn = self.pool.acquire().await?;
        SampleReader::fetch(&mut conn, request, self.config.capabilities).await
    }

    async fn delete(&self, metric: &Metric) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        let points = sqlx::query(&format!("DELETE FROM {} WHERE key = $1", TIME_SERIES_TABLE))
            .bind(metric.key())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let tags = sqlx::query(&format!(
            "DELETE FROM {} WHERE fk_timescale_metric = $1",
            TAG_TABLE
        ))
        .bind(metric.key())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        debug!(
            "Deleted metric {}: {} points, {} tag facts",
            metric.key(),
            points,
            tags
        );
        Ok(())
    }

    fn supports_aggregation(&self, aggregation: Aggregation) -> bool {
        SampleReader::supports_aggregation(aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_storage_is_shareable() {
        assert_send_sync::<TimescaleStorage>();
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/tagscale")
            .unwrap();
        let config = StorageConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(TimescaleStorage::new(pool, config).is_err());
    }

    #[tokio::test]
    async fn test_delegates_aggregation_support() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/tagscale")
            .unwrap();
        let storage = TimescaleStorage::new(pool, StorageConfig::default()).unwrap();
        assert!(storage.supports_aggregation(Aggregation::Average));
        assert!(!storage.supports_aggregation(Aggregation::None));
        assert_eq!(storage.config().max_batch_size, 100);
    }
}
