//! Storage adapter - coordinates tag index, writes and reads

mod reader;
mod resolver;
mod timescale;
mod writer;

pub use reader::SampleReader;
pub use resolver::MetricResolver;
pub use timescale::TimescaleStorage;
pub use writer::{BatchSink, PgBatchSink, SampleWriter};

use crate::{Aggregation, FetchRequest, Metric, Result, Sample, StorageError, TagMatcher};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Pluggable time-series backend used by the monitoring platform
#[async_trait]
pub trait TimeSeriesStorage: Send + Sync {
    /// Persist samples in bounded batches. On error, batches written before
    /// the failing one stay persisted.
    async fn store(&self, samples: &[Sample]) -> Result<()>;

    /// All metrics whose tags satisfy every matcher
    async fn find_metrics(&self, matchers: &[TagMatcher]) -> Result<Vec<Metric>>;

    /// Samples for one metric; empty if the metric is unknown
    async fn get_timeseries(&self, request: &FetchRequest) -> Result<Vec<Sample>>;

    /// Remove all samples and tag facts of a metric
    async fn delete(&self, metric: &Metric) -> Result<()>;

    fn supports_aggregation(&self, aggregation: Aggregation) -> bool;
}

/// Which tag classes the schema persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchemaCapabilities {
    /// Persist and reload external tags
    pub external_tags: bool,
}

impl Default for SchemaCapabilities {
    fn default() -> Self {
        Self {
            external_tags: true,
        }
    }
}

impl SchemaCapabilities {
    pub fn supports(&self, class: crate::TagClass) -> bool {
        match class {
            crate::TagClass::External => self.external_tags,
            _ => true,
        }
    }
}

/// Storage adapter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximum samples per write batch
    pub max_batch_size: usize,
    /// Tag classes the schema supports
    pub capabilities: SchemaCapabilities,
    /// Minimum seconds between write-failure log lines
    pub error_log_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_batch_size: crate::config::MAX_BATCH_SIZE,
            capabilities: SchemaCapabilities::default(),
            error_log_interval_secs: crate::config::ERROR_LOG_INTERVAL_SECS,
        }
    }
}

impl StorageConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("{}: {}", path.display(), e)))?;
        let config: StorageConfig = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(StorageError::Config("max_batch_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_secs(self.error_log_interval_secs)
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// PostgreSQL URL; may carry credentials, never log it
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    crate::config::MAX_CONNECTIONS
}

fn default_acquire_timeout_secs() -> u64 {
    crate::config::ACQUIRE_TIMEOUT_SECS
}
