//! Schema for the points and tag tables
//!
//! The adapter shares the monitoring platform's database and only needs
//! three extra tables. [`DatabaseInitializer`] checks for the TimescaleDB
//! extension and creates whatever is missing.

mod initializer;

pub use initializer::{DatabaseInitializer, InitOutcome};

/// Time-partitioned points table (hypertable on `time`)
pub const TIME_SERIES_TABLE: &str = "timescale_time_series";

/// One row per metric key.
///
/// Kept only so the schema stays compatible with existing deployments.
/// Nothing reads or writes it, and delete leaves it alone.
pub const METRIC_TABLE: &str = "timescale_metric";

/// Tag facts, unique on (metric, key, value, type)
pub const TAG_TABLE: &str = "timescale_tag";

/// Extension that provides hypertables and `time_bucket_gapfill`
pub const TIMESCALE_EXTENSION: &str = "timescaledb";

/// Ordered DDL; every statement is safe to re-run
pub const CREATE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS timescale_time_series(key TEXT NOT NULL, time TIMESTAMPTZ NOT NULL, value DOUBLE PRECISION NULL)",
    "SELECT create_hypertable('timescale_time_series', 'time', if_not_exists => TRUE)",
    "CREATE INDEX IF NOT EXISTS timescale_time_series_key_time_idx ON timescale_time_series (key, time DESC)",
    "CREATE TABLE IF NOT EXISTS timescale_metric(key TEXT NOT NULL PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS timescale_tag(fk_timescale_metric TEXT NOT NULL, key TEXT NOT NULL, value TEXT NOT NULL, type TEXT NOT NULL, UNIQUE (fk_timescale_metric, key, value, type))",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for stmt in CREATE_STATEMENTS {
            assert!(
                stmt.contains("IF NOT EXISTS") || stmt.contains("if_not_exists => TRUE"),
                "not re-runnable: {}",
                stmt
            );
        }
    }

    #[test]
    fn test_statements_cover_all_tables() {
        for table in [TIME_SERIES_TABLE, METRIC_TABLE, TAG_TABLE] {
            let create = format!("CREATE TABLE IF NOT EXISTS {}(", table);
            assert!(CREATE_STATEMENTS.iter().any(|s| s.starts_with(&create)));
        }
        // Hypertable conversion must follow the table it converts
        let table_idx = CREATE_STATEMENTS
            .iter()
            .position(|s| s.contains("TABLE IF NOT EXISTS timescale_time_series"))
            .unwrap();
        let hyper_idx = CREATE_STATEMENTS
            .iter()
            .position(|s| s.contains("create_hypertable"))
            .unwrap();
        assert!(table_idx < hyper_idx);
    }
}
