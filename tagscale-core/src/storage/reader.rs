//! Sample reads, raw or bucketed

use super::{MetricResolver, SchemaCapabilities};
use crate::query::{series_query, BucketRow};
use crate::{Aggregation, FetchRequest, Metric, Result, Sample, StorageError};
use sqlx::PgConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct SampleReader;

impl SampleReader {
    /// Fetch samples of one metric over the open interval `(start, end)`.
    ///
    /// An unknown metric or an empty window yields an empty result. Empty
    /// buckets of an aggregated read carry `f64::NAN`.
    pub async fn fetch(
        conn: &mut PgConnection,
        request: &FetchRequest,
        capabilities: SchemaCapabilities,
    ) -> Result<Vec<Sample>> {
        let Some(step) = Self::validate(request)? else {
            return Ok(Vec::new());
        };

        let key = request.metric.key();
        let Some(metric) = MetricResolver::load_metrics(conn, &[key.to_string()], capabilities)
            .await?
            .into_iter()
            .next()
        else {
            debug!("No metric found for key {}", key);
            return Ok(Vec::new());
        };

        let rows: Vec<BucketRow> =
            series_query(key, request.start, request.end, step, request.aggregation)
                .build_query_as()
                .fetch_all(&mut *conn)
                .await?;

        Ok(Self::to_samples(Arc::new(metric), rows))
    }

    /// Attach every row to one shared metric; NULL becomes `NaN`
    fn to_samples(metric: Arc<Metric>, rows: Vec<BucketRow>) -> Vec<Sample> {
        rows.into_iter()
            .map(|row| Sample::new(metric.clone(), row.step, row.aggregation.unwrap_or(f64::NAN)))
            .collect()
    }

    pub fn supports_aggregation(aggregation: Aggregation) -> bool {
        aggregation.sql_function().is_some()
    }

    /// Check bounds and return the step truncated to whole seconds.
    ///
    /// `None` means the window `(t, t)` is empty and there is nothing to read.
    fn validate(request: &FetchRequest) -> Result<Option<Duration>> {
        if request.start == request.end {
            return Ok(None);
        }
        if request.start > request.end {
            return Err(StorageError::invalid(format!(
                "start ({}) must be before end ({})",
                request.start, request.end
            )));
        }

        let step = Duration::from_secs(request.step.as_secs());
        if request.aggregation != Aggregation::None && step.is_zero() {
            return Err(StorageError::invalid(
                "aggregated fetch needs a step of at least one second",
            ));
        }
        Ok(Some(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn request(start: i64, end: i64, step: Duration, aggregation: Aggregation) -> FetchRequest {
        let metric = Metric::builder().intrinsic_tag("name", "cpu").build().unwrap();
        FetchRequest::new(metric, at(start), at(end), step, aggregation)
    }

    #[test]
    fn test_supported_aggregations() {
        assert!(SampleReader::supports_aggregation(Aggregation::Average));
        assert!(SampleReader::supports_aggregation(Aggregation::Max));
        assert!(SampleReader::supports_aggregation(Aggregation::Min));
        assert!(!SampleReader::supports_aggregation(Aggregation::None));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let req = request(200, 100, Duration::from_secs(60), Aggregation::None);
        assert!(matches!(
            SampleReader::validate(&req),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_window_reads_nothing() {
        let req = request(100, 100, Duration::from_secs(60), Aggregation::Average);
        assert_eq!(SampleReader::validate(&req).unwrap(), None);
    }

    #[test]
    fn test_sub_second_step() {
        let aggregated = request(0, 100, Duration::from_millis(500), Aggregation::Max);
        assert!(SampleReader::validate(&aggregated).is_err());

        // Raw reads ignore the step
        let raw = request(0, 100, Duration::from_millis(500), Aggregation::None);
        assert_eq!(SampleReader::validate(&raw).unwrap(), Some(Duration::ZERO));
    }

    #[test]
    fn test_step_truncated_to_seconds() {
        let req = request(0, 100, Duration::from_millis(2_750), Aggregation::Average);
        assert_eq!(
            SampleReader::validate(&req).unwrap(),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_samples_share_one_metric() {
        let metric = Arc::new(Metric::builder().intrinsic_tag("name", "cpu").build().unwrap());
        let rows = vec![
            BucketRow { step: at(60), aggregation: Some(1.5) },
            BucketRow { step: at(120), aggregation: None },
            BucketRow { step: at(180), aggregation: Some(-2.0) },
        ];

        let samples = SampleReader::to_samples(metric.clone(), rows);
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| Arc::ptr_eq(&s.metric, &metric)));
        assert_eq!(samples[0].value, 1.5);
        assert!(samples[1].value.is_nan());
        assert_eq!(samples[2].time, at(180));
    }
}
