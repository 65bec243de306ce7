//! Clinical data model
//!
//! Types exchanged with the monitoring back end, either as REST snapshots
//! or as push-stream payloads. Stream payloads are sparser than snapshot
//! rows, so every field the stream omits carries a serde default.

pub mod status;

pub use status::derive_patient_status;

use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;

/// A monitored patient as returned by the patient list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub sex: String,
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(default)]
    pub diagnoses: Vec<String>,
    pub risk_profile: String,
    #[serde(default)]
    pub assigned_clinician: Option<String>,
    #[serde(default = "default_monitoring_status")]
    pub monitoring_status: String,
    #[serde(default)]
    pub baseline_profile: serde_json::Map<String, serde_json::Value>,
}

fn default_monitoring_status() -> String {
    "active".to_string()
}

/// Status label shared by vital readings and the derived patient status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClinicalStatus {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for ClinicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClinicalStatus::Normal => write!(f, "normal"),
            ClinicalStatus::Warning => write!(f, "warning"),
            ClinicalStatus::Critical => write!(f, "critical"),
        }
    }
}

/// A single vital sign measurement. Readings are never mutated once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub patient_id: String,
    pub metric: String,           // e.g. "heart_rate", "spo2"
    pub value: f64,
    pub unit: String,
    pub timestamp: String,        // ISO-8601, compared lexicographically
    pub status: ClinicalStatus,
    #[serde(default)]
    pub normal_low: Option<f64>,
    #[serde(default)]
    pub normal_high: Option<f64>,
    #[serde(default)]
    pub source: String,           // empty for stream payloads
}

/// Alert severity as assigned by the back end rules engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl From<Severity> for ClinicalStatus {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => ClinicalStatus::Warning,
            Severity::Critical => ClinicalStatus::Critical,
        }
    }
}

/// A rule-triggered alert. Identity is `id`; only the server flips the
/// acknowledgment fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub patient_id: String,
    pub metric: String,
    pub severity: Severity,
    #[serde(default)]
    pub trigger_rule: String,
    pub timestamp: String,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub clinician_notes: Option<String>,
    #[serde(default)]
    pub acknowledged_at: Option<String>,
}

/// avg/min/max of one metric over the analytics window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Server-computed risk summary. Opaque to the client: always replaced
/// wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub patient_id: String,
    pub risk_score: f64,
    pub trend: String,
    #[serde(default)]
    pub metrics: HashMap<String, MetricSummary>,
    #[serde(default)]
    pub anomaly_score: Option<f64>,
}

/// Credential returned by the login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub role: String,
}
