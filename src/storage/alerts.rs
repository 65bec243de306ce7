use crate::clinical::Alert;
use std::collections::HashSet;

/// Effect of a streamed alert on the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertChange {
    Inserted,
    Removed,
    Unchanged,
}

/// Active (unacknowledged) alerts, newest first, at most one entry per id.
#[derive(Debug, Clone, Default)]
pub struct AlertSet {
    alerts: Vec<Alert>,
}

impl AlertSet {
    pub fn new() -> Self {
        AlertSet { alerts: Vec::new() }
    }

    /// Replace the set with the unacknowledged alerts of a snapshot.
    ///
    /// Snapshot order is kept. A repeated id keeps its first occurrence.
    pub fn reset(&mut self, alerts: Vec<Alert>) {
        let mut seen = HashSet::new();
        self.alerts = alerts
            .into_iter()
            .filter(|alert| !alert.acknowledged)
            .filter(|alert| seen.insert(alert.id.clone()))
            .collect();
    }

    /// Fold a streamed alert into the set.
    ///
    /// An acknowledged alert removes its id; a new unacknowledged one is
    /// prepended; a known id is left as is.
    pub fn apply_stream_event(&mut self, alert: Alert) -> AlertChange {
        let position = self.alerts.iter().position(|existing| existing.id == alert.id);

        match (alert.acknowledged, position) {
            (true, Some(index)) => {
                self.alerts.remove(index);
                AlertChange::Removed
            }
            (false, None) => {
                self.alerts.insert(0, alert);
                AlertChange::Inserted
            }
            _ => AlertChange::Unchanged,
        }
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|alert| alert.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
