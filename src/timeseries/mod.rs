//! Time-series projections
//!
//! Read-only views over the vitals history used for trend plotting:
//! - Per-metric chronological series
//! - Lenient ISO-8601 timestamp parsing

pub mod series;

pub use series::{metric_series, parse_timestamp, SeriesPoint, CHART_METRICS};
