//! Tagscale Core - Tag-Indexed Time-Series Storage on TimescaleDB
//!
//! A storage adapter that persists samples into a time-partitioned
//! PostgreSQL/TimescaleDB schema and resolves them back into metrics through
//! an auxiliary tag index.
//!
//! # Architecture
//!
//! - **TagStore**: deduplicated (metric, tag, class) facts
//! - **MetricResolver**: conjunctive tag matching and metric reconstruction
//! - **SampleWriter**: bounded batches, one transaction per batch
//! - **QueryBuilder**: bound-parameter SQL for matchers and bucketed fetches
//! - **SampleReader**: raw or gap-filled aggregated reads for one metric
//! - **Deleter**: removes all points and tag facts for a metric key

pub mod query;
pub mod ratelimit;
pub mod schema;
pub mod storage;
pub mod tags;

mod error;
mod types;

pub use error::{Result, StorageError};
pub use types::*;

/// Tagscale version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Maximum samples per write batch
    pub const MAX_BATCH_SIZE: usize = 100;

    /// Minimum seconds between two write-failure log lines
    pub const ERROR_LOG_INTERVAL_SECS: u64 = 60;

    /// Pool size
    pub const MAX_CONNECTIONS: u32 = 10;

    /// Seconds to wait for a pooled connection
    pub const ACQUIRE_TIMEOUT_SECS: u64 = 30;
}
