//! Raw and bucketed point reads

use crate::schema::TIME_SERIES_TABLE;
use crate::Aggregation;
use chrono::{DateTime, Utc};
use sqlx::postgres::types::PgInterval;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::time::Duration;

/// One row of a series read: a raw point or a (possibly empty) bucket
#[derive(Debug, Clone, FromRow)]
pub struct BucketRow {
    pub step: DateTime<Utc>,
    pub aggregation: Option<f64>,
}

/// Build the read for one metric key over `(start, end)`.
///
/// `Aggregation::None` returns raw points. Every other aggregation buckets
/// by `step` through `time_bucket_gapfill`, so empty buckets come back as
/// rows with a NULL aggregate.
pub fn series_query(
    metric_key: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
    aggregation: Aggregation,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = match aggregation.sql_function() {
        None => QueryBuilder::new("SELECT time AS step, value AS aggregation"),
        Some(func) => {
            let mut qb = QueryBuilder::new("SELECT time_bucket_gapfill(");
            qb.push_bind(to_interval(step));
            qb.push(", time, ");
            qb.push_bind(start);
            qb.push(", ");
            qb.push_bind(end);
            qb.push(format!(") AS step, {}(value) AS aggregation", func));
            qb
        }
    };

    qb.push(format!(" FROM {} WHERE key = ", TIME_SERIES_TABLE));
    qb.push_bind(metric_key.to_string());
    qb.push(" AND time > ");
    qb.push_bind(start);
    qb.push(" AND time < ");
    qb.push_bind(end);

    if aggregation.sql_function().is_some() {
        qb.push(" GROUP BY step");
    }
    qb.push(" ORDER BY step ASC");
    qb
}

fn to_interval(step: Duration) -> PgInterval {
    PgInterval {
        months: 0,
        days: 0,
        microseconds: (step.as_secs() as i64).saturating_mul(1_000_000),
    }
}
