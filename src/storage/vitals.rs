use crate::clinical::VitalReading;
use std::collections::{vec_deque, BTreeMap, VecDeque};
use tracing::debug;

/// Number of readings kept for the selected patient
pub const VITALS_CAPACITY: usize = 200;

/// Bounded, newest-first store of readings for a single patient.
///
/// Index 0 is always the most recently ingested reading. The buffer is
/// bound to one patient at a time; readings for anyone else are dropped.
#[derive(Debug, Clone)]
pub struct VitalsBuffer {
    patient_id: Option<String>,
    readings: VecDeque<VitalReading>,
    capacity: usize,
}

impl VitalsBuffer {
    pub fn new() -> Self {
        Self::with_capacity(VITALS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        VitalsBuffer {
            patient_id: None,
            readings: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Bind the buffer to `patient_id` and drop everything held so far
    pub fn retarget(&mut self, patient_id: &str) {
        self.patient_id = Some(patient_id.to_string());
        self.readings.clear();
    }

    /// Replace the buffer wholesale with a snapshot for `patient_id`.
    ///
    /// The snapshot keeps its given order (the server sends newest first).
    /// Rows for other patients are skipped and the result is cut to capacity.
    pub fn reset(&mut self, patient_id: &str, readings: Vec<VitalReading>) {
        self.retarget(patient_id);

        let total = readings.len();
        self.readings.extend(
            readings
                .into_iter()
                .filter(|reading| reading.patient_id == patient_id)
                .take(self.capacity),
        );

        if self.readings.len() != total {
            debug!(patient_id, kept = self.readings.len(), total, "vitals snapshot trimmed");
        }
    }

    /// Prepend a streamed reading and evict the oldest beyond capacity.
    ///
    /// Returns false when the reading belongs to a patient other than the
    /// one the buffer is bound to; the buffer is left untouched.
    pub fn ingest(&mut self, reading: VitalReading) -> bool {
        if self.patient_id.as_deref() != Some(reading.patient_id.as_str()) {
            return false;
        }

        self.readings.push_front(reading);
        self.readings.truncate(self.capacity);
        true
    }

    /// Latest reading per metric by timestamp.
    ///
    /// Equal timestamps resolve to the most recently ingested reading.
    pub fn latest_by_metric(&self) -> BTreeMap<String, VitalReading> {
        let mut latest: BTreeMap<String, &VitalReading> = BTreeMap::new();

        // Oldest first, so on a tie the later arrival overwrites
        for reading in self.readings.iter().rev() {
            let newer = latest
                .get(&reading.metric)
                .map_or(true, |current| reading.timestamp >= current.timestamp);
            if newer {
                latest.insert(reading.metric.clone(), reading);
            }
        }

        latest.into_iter()
            .map(|(metric, reading)| (metric, reading.clone()))
            .collect()
    }

    /// Readings newest first
    pub fn readings(&self) -> vec_deque::Iter<'_, VitalReading> {
        self.readings.iter()
    }

    pub fn to_vec(&self) -> Vec<VitalReading> {
        self.readings.iter().cloned().collect()
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl Default for VitalsBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::ClinicalStatus;
    use pretty_assertions::assert_eq;

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
            source: "test".to_string(),
        }
    }

    fn minute(i: usize) -> String {
        format!("2024-05-01T{:02}:{:02}:00", i / 60, i % 60)
    }

    #[test]
    fn test_ingest_prepends_and_evicts_oldest() {
        let mut buffer = VitalsBuffer::new();
        // Snapshot arrives newest first
        let snapshot: Vec<_> = (0..200)
            .rev()
            .map(|i| reading("P1", "heart_rate", &minute(i), i as f64))
            .collect();
        buffer.reset("P1", snapshot);
        assert_eq!(buffer.len(), 200);

        assert!(buffer.ingest(reading("P1", "heart_rate", &minute(200), 200.0)));

        assert_eq!(buffer.len(), 200);
        let values: Vec<f64> = buffer.readings().map(|r| r.value).collect();
        assert_eq!(values[0], 200.0);
        assert_eq!(values[199], 1.0);
        assert!(!values.contains(&0.0));
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut buffer = VitalsBuffer::with_capacity(5);
        buffer.retarget("P1");

        for i in 0..12 {
            buffer.ingest(reading("P1", "spo2", &minute(i), i as f64));
            assert!(buffer.len() <= 5);
        }

        // Arrival order, newest first
        let values: Vec<f64> = buffer.readings().map(|r| r.value).collect();
        assert_eq!(values, vec![11.0, 10.0, 9.0, 8.0, 7.0]);
    }

    #[test]
    fn test_foreign_patient_reading_is_dropped() {
        let mut buffer = VitalsBuffer::new();
        buffer.reset("P1", vec![reading("P1", "spo2", &minute(1), 97.0)]);
        let before = buffer.to_vec();

        assert!(!buffer.ingest(reading("P2", "spo2", &minute(2), 90.0)));
        assert_eq!(buffer.to_vec(), before);
    }

    #[test]
    fn test_unbound_buffer_drops_everything() {
        let mut buffer = VitalsBuffer::new();
        assert!(!buffer.ingest(reading("P1", "spo2", &minute(1), 97.0)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reset_filters_other_patients_and_truncates() {
        let mut buffer = VitalsBuffer::with_capacity(2);
        buffer.reset(
            "P1",
            vec![
                reading("P1", "spo2", &minute(3), 3.0),
                reading("P9", "spo2", &minute(2), 2.0),
                reading("P1", "spo2", &minute(1), 1.0),
                reading("P1", "spo2", &minute(0), 0.0),
            ],
        );

        let values: Vec<f64> = buffer.readings().map(|r| r.value).collect();
        assert_eq!(values, vec![3.0, 1.0]);
        assert_eq!(buffer.patient_id(), Some("P1"));
    }

    #[test]
    fn test_latest_by_metric_picks_max_timestamp() {
        let mut buffer = VitalsBuffer::new();
        buffer.retarget("P1");
        buffer.ingest(reading("P1", "heart_rate", &minute(5), 80.0));
        // Late arrival with an older timestamp must not win
        buffer.ingest(reading("P1", "heart_rate", &minute(3), 70.0));
        buffer.ingest(reading("P1", "spo2", &minute(1), 95.0));
        buffer.ingest(reading("P1", "spo2", &minute(2), 96.0));

        let latest = buffer.latest_by_metric();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["heart_rate"].value, 80.0);
        assert_eq!(latest["spo2"].value, 96.0);
    }

    #[test]
    fn test_latest_by_metric_tie_goes_to_latest_arrival() {
        let mut buffer = VitalsBuffer::new();
        buffer.retarget("P1");
        buffer.ingest(reading("P1", "temperature", &minute(7), 37.0));
        buffer.ingest(reading("P1", "temperature", &minute(7), 38.2));

        assert_eq!(buffer.latest_by_metric()["temperature"].value, 38.2);
    }

    #[test]
    fn test_latest_by_metric_over_snapshot_ties() {
        let mut buffer = VitalsBuffer::new();
        // In a snapshot the first row is the newest arrival
        buffer.reset(
            "P1",
            vec![
                reading("P1", "temperature", &minute(7), 38.5),
                reading("P1", "temperature", &minute(7), 37.1),
            ],
        );

        assert_eq!(buffer.latest_by_metric()["temperature"].value, 38.5);
    }
}
