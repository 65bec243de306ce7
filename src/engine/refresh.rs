use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;
use crate::api::ClinicalApi;
use crate::clinical::AnalyticsSummary;
use crate::engine::FetchTag;
use crate::error::ClientError;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Result of one timer-driven analytics fetch
#[derive(Debug, Clone)]
pub struct AnalyticsRefresh {
    pub tag: FetchTag,
    pub result: Result<AnalyticsSummary, ClientError>,
}

/// Timer bound to one selection.
///
/// Fires every `interval`, starting one interval after creation. Dropping
/// the refresher cancels the timer; a new selection gets a new refresher.
#[derive(Debug)]
pub struct PeriodicRefresher {
    task: JoinHandle<()>,
}

impl PeriodicRefresher {
    pub fn start(
        api: Arc<dyn ClinicalApi>,
        tag: FetchTag,
        interval: Duration,
        sink: mpsc::UnboundedSender<AnalyticsRefresh>,
    ) -> Self {
        PeriodicRefresher {
            task: tokio::spawn(run(api, tag, interval, sink)),
        }
    }
}

impl Drop for PeriodicRefresher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    api: Arc<dyn ClinicalApi>,
    tag: FetchTag,
    period: Duration,
    sink: mpsc::UnboundedSender<AnalyticsRefresh>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        debug!(patient_id = %tag.patient_id, "refreshing analytics");

        let result = api.get_analytics_summary(&tag.patient_id).await;
        if sink.send(AnalyticsRefresh { tag: tag.clone(), result }).is_err() {
            return;
        }
    }
}
