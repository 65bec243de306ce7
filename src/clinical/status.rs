use super::{Alert, ClinicalStatus};

/// Derive a patient's badge status from the active alert list.
///
/// Critical wins over warning; a patient without active alerts is normal.
/// Acknowledged alerts are ignored even if the caller passes them in.
pub fn derive_patient_status(patient_id: &str, alerts: &[Alert]) -> ClinicalStatus {
    alerts
        .iter()
        .filter(|alert| alert.patient_id == patient_id && !alert.acknowledged)
        .map(|alert| ClinicalStatus::from(alert.severity))
        .max()
        .unwrap_or(ClinicalStatus::Normal)
}
