use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Serialize, Deserialize};
use crate::clinical::VitalReading;

/// Metrics plotted by default on the trend panel
pub const CHART_METRICS: [&str; 4] = ["heart_rate", "spo2", "bp_systolic", "respiratory_rate"];

/// A single plotted point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: String,
    pub recorded_at: Option<DateTime<Utc>>, // None when the timestamp does not parse
    pub value: f64,
}

/// Points of one metric, oldest first, from a newest-first history
pub fn metric_series<'a, I>(history: I, metric: &str) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a VitalReading>,
    I::IntoIter: DoubleEndedIterator,
{
    history
        .into_iter()
        .rev()
        .filter(|reading| reading.metric == metric)
        .map(|reading| SeriesPoint {
            timestamp: reading.timestamp.clone(),
            recorded_at: parse_timestamp(&reading.timestamp),
            value: reading.value,
        })
        .collect()
}

/// Parse an ISO-8601 timestamp. Naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
