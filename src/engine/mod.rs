//! Reconciliation engine
//!
//! Merges three uncoordinated sources into one consistent view:
//! - REST snapshots issued on bootstrap and on selection
//! - Periodic analytics refreshes
//! - The push stream of vitals and alerts
//!
//! `ReconciliationEngine` is the synchronous state owner; every input is a
//! handler call that runs to completion. `session` wraps it in a tokio
//! task that serializes those calls.

pub mod refresh;
pub mod selection;
pub mod session;

pub use refresh::PeriodicRefresher;
pub use selection::{FetchTag, SelectionController, SelectionState};
pub use session::{MonitorSession, SessionHandle, SessionSettings};

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};
use crate::api::stream::StreamEvent;
use crate::clinical::{
    derive_patient_status, Alert, AnalyticsSummary, ClinicalStatus, Patient, VitalReading,
};
use crate::error::ClientError;
use crate::storage::{AlertChange, AlertSet, VitalsBuffer};
use crate::timeseries::{metric_series, SeriesPoint};

/// Which fetch produced a surfaced failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Patients,
    Alerts,
    Vitals,
    Analytics,
    Acknowledge,
}

/// Content of the single user-visible error slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfacedError {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for SurfacedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What a tagged fetch result did on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    Stale,
}

/// Whether an analytics result came from a selection or the refresher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsOrigin {
    Selection,
    Refresh,
}

/// How an acknowledgment round trip failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcknowledgeFailure {
    /// The acknowledge call itself failed
    Rejected(ClientError),
    /// Acknowledged, but re-fetching the alert list failed
    Resync(ClientError),
}

/// Result of routing one push-stream message
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    VitalIngested,
    VitalDropped,
    Alert(AlertChange),
    Ignored { kind: String },
    /// Shape validation failed; the raw message goes to the fallback path
    Unrecognized(String),
}

/// Owned snapshot handed to the presentation layer
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    pub patients: Vec<Patient>,
    pub patient_status: BTreeMap<String, ClinicalStatus>,
    pub selection: SelectionState,
    pub latest_vitals: Vec<VitalReading>,
    pub vitals_history: Vec<VitalReading>,
    pub alerts: Vec<Alert>,
    pub analytics: Option<AnalyticsSummary>,
    pub last_error: Option<SurfacedError>,
}

impl DashboardView {
    pub fn selected_patient(&self) -> Option<&Patient> {
        let patient_id = self.selection.patient_id()?;
        self.patients.iter().find(|patient| patient.id == patient_id)
    }
}

/// Sole owner of vitals, alerts and selection for one client session
#[derive(Debug)]
pub struct ReconciliationEngine {
    patients: Vec<Patient>,
    selection: SelectionController,
    vitals: VitalsBuffer,
    alerts: AlertSet,
    analytics: Option<AnalyticsSummary>,
    last_error: Option<SurfacedError>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::with_capacity(crate::storage::VITALS_CAPACITY)
    }

    pub fn with_capacity(vitals_capacity: usize) -> Self {
        ReconciliationEngine {
            patients: Vec::new(),
            selection: SelectionController::new(),
            vitals: VitalsBuffer::with_capacity(vitals_capacity),
            alerts: AlertSet::new(),
            analytics: None,
            last_error: None,
        }
    }

    /// Switch the view to `patient_id`.
    ///
    /// Earlier selection fetches become stale. The caller issues vitals and
    /// analytics fetches carrying the returned tag.
    pub fn select(&mut self, patient_id: &str) -> FetchTag {
        let tag = self.selection.select(patient_id);
        self.vitals.retarget(patient_id);
        self.analytics = None;
        info!(patient_id, generation = tag.generation, "patient selected");
        tag
    }

    pub fn is_current(&self, tag: &FetchTag) -> bool {
        self.selection.is_current(tag)
    }

    /// Store the patient list and auto-select the first patient when
    /// nothing is selected yet. Returns the tag of that selection.
    pub fn apply_patients(&mut self, result: Result<Vec<Patient>, ClientError>) -> Option<FetchTag> {
        let patients = match result {
            Ok(patients) => patients,
            Err(err) => {
                self.surface(FailureKind::Patients, err);
                return None;
            }
        };

        debug!(count = patients.len(), "patient list loaded");
        self.patients = patients;

        if self.selection.state() != &SelectionState::Unselected {
            return None;
        }
        let first = self.patients.first()?.id.clone();
        Some(self.select(&first))
    }

    /// Seed the alert set from a snapshot
    pub fn apply_alert_snapshot(&mut self, result: Result<Vec<Alert>, ClientError>) {
        match result {
            Ok(alerts) => {
                self.alerts.reset(alerts);
                debug!(active = self.alerts.len(), "alert snapshot applied");
            }
            Err(err) => self.surface(FailureKind::Alerts, err),
        }
    }

    pub fn apply_vitals(
        &mut self,
        tag: &FetchTag,
        result: Result<Vec<VitalReading>, ClientError>,
    ) -> Disposition {
        if !self.is_current(tag) {
            debug!(patient_id = %tag.patient_id, generation = tag.generation, "discarding stale vitals");
            return Disposition::Stale;
        }

        match result {
            Ok(readings) => self.vitals.reset(&tag.patient_id, readings),
            Err(err) => self.surface(FailureKind::Vitals, err),
        }
        Disposition::Applied
    }

    /// Replace the analytics summary wholesale.
    ///
    /// Refresh failures are logged and swallowed; the previous summary stays.
    pub fn apply_analytics(
        &mut self,
        tag: &FetchTag,
        origin: AnalyticsOrigin,
        result: Result<AnalyticsSummary, ClientError>,
    ) -> Disposition {
        if !self.is_current(tag) {
            debug!(patient_id = %tag.patient_id, generation = tag.generation, "discarding stale analytics");
            return Disposition::Stale;
        }

        match (result, origin) {
            (Ok(summary), _) => self.analytics = Some(summary),
            (Err(err), AnalyticsOrigin::Selection) => self.surface(FailureKind::Analytics, err),
            (Err(err), AnalyticsOrigin::Refresh) => {
                warn!(patient_id = %tag.patient_id, error = %err, "analytics refresh failed, keeping previous summary");
            }
        }
        Disposition::Applied
    }

    /// Finish an acknowledgment. Only a confirmed and re-fetched list
    /// changes the set; there is no optimistic removal.
    pub fn apply_acknowledgement(
        &mut self,
        alert_id: &str,
        result: Result<Vec<Alert>, AcknowledgeFailure>,
    ) {
        match result {
            Ok(alerts) => {
                info!(alert_id, "alert acknowledged");
                self.alerts.reset(alerts);
            }
            Err(AcknowledgeFailure::Rejected(err)) => self.surface(FailureKind::Acknowledge, err),
            Err(AcknowledgeFailure::Resync(err)) => self.surface(FailureKind::Alerts, err),
        }
    }

    /// Decode and route one raw push-stream message
    pub fn apply_stream_message(&mut self, raw: &str) -> StreamOutcome {
        match StreamEvent::decode(raw) {
            StreamEvent::Vital(reading) => {
                if self.vitals.ingest(reading) {
                    StreamOutcome::VitalIngested
                } else {
                    StreamOutcome::VitalDropped
                }
            }
            StreamEvent::Alert(alert) => StreamOutcome::Alert(self.alerts.apply_stream_event(alert)),
            StreamEvent::Unknown { kind } => {
                debug!(%kind, "ignoring stream event");
                StreamOutcome::Ignored { kind }
            }
            StreamEvent::Unrecognized(raw) => StreamOutcome::Unrecognized(raw),
        }
    }

    fn surface(&mut self, kind: FailureKind, err: ClientError) {
        warn!(?kind, error = %err, "fetch failed");
        self.last_error = Some(SurfacedError { kind, message: err.to_string() });
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn vitals(&self) -> &VitalsBuffer {
        &self.vitals
    }

    pub fn latest_by_metric(&self) -> BTreeMap<String, VitalReading> {
        self.vitals.latest_by_metric()
    }

    /// Chronological points of one metric for trend plotting
    pub fn series(&self, metric: &str) -> Vec<SeriesPoint> {
        metric_series(self.vitals.readings(), metric)
    }

    pub fn alerts(&self) -> &AlertSet {
        &self.alerts
    }

    pub fn analytics(&self) -> Option<&AnalyticsSummary> {
        self.analytics.as_ref()
    }

    pub fn last_error(&self) -> Option<&SurfacedError> {
        self.last_error.as_ref()
    }

    pub fn patient_status(&self, patient_id: &str) -> ClinicalStatus {
        derive_patient_status(patient_id, self.alerts.alerts())
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            patients: self.patients.clone(),
            patient_status: self.patients
                .iter()
                .map(|patient| (patient.id.clone(), self.patient_status(&patient.id)))
                .collect(),
            selection: self.selection.state().clone(),
            latest_vitals: self.latest_by_metric().into_values().collect(),
            vitals_history: self.vitals.to_vec(),
            alerts: self.alerts.alerts().to_vec(),
            analytics: self.analytics.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::Severity;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn patient(id: &str) -> Patient {
        Patient {
            id: id.to_string(),
            name: format!("Patient {}", id),
            age: 60,
            sex: "F".to_string(),
            height_cm: 170.0,
            weight_kg: 70.0,
            diagnoses: vec!["CHF".to_string()],
            risk_profile: "medium".to_string(),
            assigned_clinician: None,
            monitoring_status: "active".to_string(),
            baseline_profile: Default::default(),
        }
    }

    fn reading(patient_id: &str, metric: &str, timestamp: &str, value: f64) -> VitalReading {
        VitalReading {
            id: None,
            patient_id: patient_id.to_string(),
            metric: metric.to_string(),
            value,
            unit: "bpm".to_string(),
            timestamp: timestamp.to_string(),
            status: ClinicalStatus::Normal,
            normal_low: None,
            normal_high: None,
            source: "snapshot".to_string(),
        }
    }

    fn alert(id: &str, patient_id: &str, severity: Severity) -> Alert {
        Alert {
            id: id.to_string(),
            patient_id: patient_id.to_string(),
            metric: "heart_rate".to_string(),
            severity,
            trigger_rule: "Tachycardia".to_string(),
            timestamp: "2024-05-01T10:00:00".to_string(),
            acknowledged: false,
            clinician_notes: None,
            acknowledged_at: None,
        }
    }

    fn summary(patient_id: &str, risk_score: f64) -> AnalyticsSummary {
        AnalyticsSummary {
            patient_id: patient_id.to_string(),
            risk_score,
            trend: "stable".to_string(),
            metrics: HashMap::new(),
            anomaly_score: None,
        }
    }

    fn history_patients(engine: &ReconciliationEngine) -> Vec<String> {
        engine.vitals().readings().map(|r| r.patient_id.clone()).collect()
    }

    #[test]
    fn test_patients_auto_select_first() {
        let mut engine = ReconciliationEngine::new();
        let tag = engine.apply_patients(Ok(vec![patient("P1"), patient("P2")]));

        assert_eq!(tag.map(|t| t.patient_id), Some("P1".to_string()));
        assert_eq!(engine.selection(), &SelectionState::Selected("P1".to_string()));
    }

    #[test]
    fn test_empty_patient_list_stays_unselected() {
        let mut engine = ReconciliationEngine::new();
        assert_eq!(engine.apply_patients(Ok(vec![])), None);
        assert_eq!(engine.selection(), &SelectionState::Unselected);
    }

    #[test]
    fn test_patient_list_does_not_override_user_selection() {
        let mut engine = ReconciliationEngine::new();
        engine.select("P2");
        assert_eq!(engine.apply_patients(Ok(vec![patient("P1"), patient("P2")])), None);
        assert_eq!(engine.selection().patient_id(), Some("P2"));
    }

    #[test]
    fn test_stale_vitals_are_discarded() {
        let mut engine = ReconciliationEngine::new();
        let p1 = engine.select("P1");
        let p2 = engine.select("P2");

        let applied = engine.apply_vitals(&p2, Ok(vec![reading("P2", "spo2", "2024-05-01T10:00:00", 97.0)]));
        let stale = engine.apply_vitals(&p1, Ok(vec![reading("P1", "spo2", "2024-05-01T10:05:00", 91.0)]));

        assert_eq!(applied, Disposition::Applied);
        assert_eq!(stale, Disposition::Stale);
        assert_eq!(engine.selection().patient_id(), Some("P2"));
        assert_eq!(history_patients(&engine), vec!["P2".to_string()]);
    }

    #[test]
    fn test_stale_failure_does_not_surface() {
        let mut engine = ReconciliationEngine::new();
        let p1 = engine.select("P1");
        engine.select("P2");

        engine.apply_vitals(&p1, Err(ClientError::Transport("timeout".to_string())));
        engine.apply_analytics(&p1, AnalyticsOrigin::Selection, Err(ClientError::Transport("timeout".to_string())));

        assert_eq!(engine.last_error(), None);
    }

    #[test]
    fn test_stale_analytics_are_discarded() {
        let mut engine = ReconciliationEngine::new();
        let p1 = engine.select("P1");
        let p2 = engine.select("P2");

        engine.apply_analytics(&p2, AnalyticsOrigin::Selection, Ok(summary("P2", 0.4)));
        engine.apply_analytics(&p1, AnalyticsOrigin::Selection, Ok(summary("P1", 0.9)));

        assert_eq!(engine.analytics().map(|a| a.patient_id.as_str()), Some("P2"));
    }

    #[test]
    fn test_selection_failure_keeps_selection_and_surfaces() {
        let mut engine = ReconciliationEngine::new();
        let tag = engine.select("P1");

        engine.apply_vitals(&tag, Err(ClientError::status(500, "database unavailable".to_string())));

        assert_eq!(engine.selection().patient_id(), Some("P1"));
        assert_eq!(
            engine.last_error(),
            Some(&SurfacedError { kind: FailureKind::Vitals, message: "database unavailable".to_string() })
        );
    }

    #[test]
    fn test_refresh_failure_keeps_previous_summary_silently() {
        let mut engine = ReconciliationEngine::new();
        let tag = engine.select("P1");
        engine.apply_analytics(&tag, AnalyticsOrigin::Selection, Ok(summary("P1", 0.3)));

        engine.apply_analytics(&tag, AnalyticsOrigin::Refresh, Err(ClientError::Transport("reset".to_string())));

        assert_eq!(engine.analytics().map(|a| a.risk_score), Some(0.3));
        assert_eq!(engine.last_error(), None);

        engine.apply_analytics(&tag, AnalyticsOrigin::Refresh, Ok(summary("P1", 0.7)));
        assert_eq!(engine.analytics().map(|a| a.risk_score), Some(0.7));
    }

    #[test]
    fn test_selection_clears_previous_patient_data() {
        let mut engine = ReconciliationEngine::new();
        let p1 = engine.select("P1");
        engine.apply_vitals(&p1, Ok(vec![reading("P1", "spo2", "2024-05-01T10:00:00", 97.0)]));
        engine.apply_analytics(&p1, AnalyticsOrigin::Selection, Ok(summary("P1", 0.3)));

        engine.select("P2");

        assert!(engine.vitals().is_empty());
        assert!(engine.analytics().is_none());
    }

    #[test]
    fn test_stream_vital_routing() {
        let mut engine = ReconciliationEngine::new();
        let tag = engine.select("P1");
        engine.apply_vitals(&tag, Ok(vec![reading("P1", "heart_rate", "2024-05-01T10:00:00", 80.0)]));

        let own = r#"{"type":"vital","payload":{"patient_id":"P1","metric":"heart_rate","value":131.0,"unit":"bpm","timestamp":"2024-05-01T10:01:00","status":"critical"}}"#;
        let other = r#"{"type":"vital","payload":{"patient_id":"P7","metric":"heart_rate","value":60.0,"unit":"bpm","timestamp":"2024-05-01T10:02:00","status":"normal"}}"#;

        assert_eq!(engine.apply_stream_message(own), StreamOutcome::VitalIngested);
        assert_eq!(engine.apply_stream_message(other), StreamOutcome::VitalDropped);

        assert_eq!(engine.vitals().len(), 2);
        assert_eq!(engine.latest_by_metric()["heart_rate"].value, 131.0);
    }

    #[test]
    fn test_stream_alert_routing_and_status() {
        let mut engine = ReconciliationEngine::new();
        engine.apply_patients(Ok(vec![patient("P1"), patient("P2")]));
        engine.apply_alert_snapshot(Ok(vec![alert("a1", "P1", Severity::Critical), alert("a2", "P2", Severity::Warning)]));
        assert_eq!(engine.patient_status("P1"), ClinicalStatus::Critical);

        let ack = r#"{"type":"alert","payload":{"id":"a1","patient_id":"P1","severity":"critical","metric":"heart_rate","timestamp":"2024-05-01T10:00:00","acknowledged":true}}"#;
        assert_eq!(engine.apply_stream_message(ack), StreamOutcome::Alert(AlertChange::Removed));

        let ids: Vec<&str> = engine.alerts().alerts().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2"]);
        assert_eq!(engine.patient_status("P1"), ClinicalStatus::Normal);
        assert_eq!(engine.view().patient_status["P2"], ClinicalStatus::Warning);
    }

    #[test]
    fn test_unknown_and_malformed_stream_messages() {
        let mut engine = ReconciliationEngine::new();
        engine.select("P1");

        assert_eq!(
            engine.apply_stream_message(r#"{"type":"census","payload":{}}"#),
            StreamOutcome::Ignored { kind: "census".to_string() }
        );
        assert_eq!(
            engine.apply_stream_message("{broken"),
            StreamOutcome::Unrecognized("{broken".to_string())
        );
        assert!(engine.vitals().is_empty());
        assert!(engine.alerts().is_empty());
    }

    #[test]
    fn test_failed_acknowledgement_leaves_alerts() {
        let mut engine = ReconciliationEngine::new();
        engine.apply_alert_snapshot(Ok(vec![alert("a1", "P1", Severity::Critical)]));

        engine.apply_acknowledgement(
            "a1",
            Err(AcknowledgeFailure::Rejected(ClientError::Transport("connection refused".to_string()))),
        );

        assert!(engine.alerts().contains("a1"));
        let error = engine.last_error().unwrap();
        assert_eq!(error.kind, FailureKind::Acknowledge);
        assert!(!error.message.is_empty());
    }

    #[test]
    fn test_failed_resync_leaves_alerts() {
        let mut engine = ReconciliationEngine::new();
        engine.apply_alert_snapshot(Ok(vec![alert("a1", "P1", Severity::Critical), alert("a2", "P2", Severity::Warning)]));

        engine.apply_acknowledgement(
            "a1",
            Err(AcknowledgeFailure::Resync(ClientError::Transport("timeout".to_string()))),
        );

        let ids: Vec<&str> = engine.alerts().alerts().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(engine.last_error().unwrap().kind, FailureKind::Alerts);
    }

    #[test]
    fn test_successful_acknowledgement_resets_from_server_list() {
        let mut engine = ReconciliationEngine::new();
        engine.apply_alert_snapshot(Ok(vec![alert("a1", "P1", Severity::Critical), alert("a2", "P1", Severity::Warning)]));

        let mut acknowledged = alert("a1", "P1", Severity::Critical);
        acknowledged.acknowledged = true;
        engine.apply_acknowledgement("a1", Ok(vec![acknowledged, alert("a2", "P1", Severity::Warning)]));

        let ids: Vec<&str> = engine.alerts().alerts().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2"]);
    }

    #[test]
    fn test_last_error_is_last_write_wins() {
        let mut engine = ReconciliationEngine::new();
        engine.apply_patients(Err(ClientError::status(401, "Could not validate credentials".to_string())));
        engine.apply_alert_snapshot(Err(ClientError::Transport("dns".to_string())));

        assert_eq!(engine.last_error().map(|e| e.kind), Some(FailureKind::Alerts));
    }

    #[test]
    fn test_view_exposes_series_and_selected_patient() {
        let mut engine = ReconciliationEngine::new();
        let tag = engine.apply_patients(Ok(vec![patient("P1")])).unwrap();
        engine.apply_vitals(
            &tag,
            Ok(vec![
                reading("P1", "heart_rate", "2024-05-01T10:02:00", 92.0),
                reading("P1", "spo2", "2024-05-01T10:01:00", 96.0),
                reading("P1", "heart_rate", "2024-05-01T10:00:00", 88.0),
            ]),
        );

        let view = engine.view();
        assert_eq!(view.selected_patient().map(|p| p.id.as_str()), Some("P1"));
        let metrics: Vec<&str> = view.latest_vitals.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["heart_rate", "spo2"]);
        assert_eq!(view.vitals_history.len(), 3);

        let series: Vec<f64> = engine.series("heart_rate").iter().map(|p| p.value).collect();
        assert_eq!(series, vec![88.0, 92.0]);
    }
}
