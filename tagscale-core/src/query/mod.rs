//! SQL construction for Tagscale
//!
//! Builds parameterized statements with `sqlx::QueryBuilder`:
//! - Conjunctive tag-matcher lookups (one self-join per extra matcher)
//! - Raw point reads with exclusive time bounds
//! - Time-bucketed, gap-filled aggregation reads
//!
//! Tag keys, tag values, metric keys and timestamps are always bound.
//! Only alias indices and enum-derived fragments are written into the text.

mod matchers;
mod series;

pub use matchers::metric_keys_query;
pub use series::{series_query, BucketRow};
