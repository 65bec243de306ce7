//! External collaborators
//!
//! The monitoring back end as seen by the engine:
//! - `ClinicalApi`: snapshot and command endpoints (REST)
//! - `Session`: the credential context shared by REST and stream
//! - `stream`: push-event decoding and the reconnecting subscription

pub mod auth;
pub mod rest;
pub mod stream;

pub use auth::Session;
pub use rest::RestClient;

use async_trait::async_trait;
use crate::clinical::{Alert, AnalyticsSummary, AuthToken, Patient, VitalReading};
use crate::error::ClientError;

/// REST endpoints consumed by the engine
#[async_trait]
pub trait ClinicalApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<AuthToken, ClientError>;

    async fn get_patients(&self) -> Result<Vec<Patient>, ClientError>;

    async fn get_patient(&self, patient_id: &str) -> Result<Patient, ClientError>;

    /// Newest first. `metric` narrows to a single metric.
    async fn get_vitals(
        &self,
        patient_id: &str,
        metric: Option<&str>,
    ) -> Result<Vec<VitalReading>, ClientError>;

    /// Newest first. Without `patient_id` alerts for all patients are returned.
    async fn get_alerts(&self, patient_id: Option<&str>) -> Result<Vec<Alert>, ClientError>;

    async fn acknowledge_alert(&self, alert_id: &str, note: &str) -> Result<Alert, ClientError>;

    async fn get_analytics_summary(&self, patient_id: &str) -> Result<AnalyticsSummary, ClientError>;
}
