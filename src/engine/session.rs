//! Async driver for the reconciliation engine
//!
//! One tokio task owns the `ReconciliationEngine`. Everything that can
//! change state arrives at that task as a message and is handled to
//! completion before the next one:
//! - commands from `SessionHandle` (select, acknowledge, shutdown)
//! - completions of spawned REST fetches
//! - analytics refresh results
//! - raw push-stream messages
//!
//! After every handled message a fresh `DashboardView` is published on a
//! watch channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use crate::api::stream::{PushChannel, ReconnectPolicy, StreamIngestor};
use crate::api::{ClinicalApi, Session};
use crate::clinical::{Alert, AnalyticsSummary, Patient, VitalReading};
use crate::config::Config;
use crate::engine::refresh::{AnalyticsRefresh, PeriodicRefresher, DEFAULT_REFRESH_INTERVAL};
use crate::engine::{
    AcknowledgeFailure, AnalyticsOrigin, DashboardView, FetchTag, ReconciliationEngine, StreamOutcome,
};
use crate::error::{ClientError, ConfigError, EmberError};
use crate::storage::VITALS_CAPACITY;

/// Receives push-stream messages that failed shape validation
pub type FallbackHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub refresh_interval: Duration,
    pub vitals_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            vitals_capacity: VITALS_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionSettings {
    /// Reject timings that would spin or panic the timers
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid("refresh interval must be positive".to_string()));
        }
        if self.reconnect.initial_backoff.is_zero() {
            return Err(ConfigError::Invalid("initial reconnect backoff must be positive".to_string()));
        }
        if self.reconnect.initial_backoff > self.reconnect.max_backoff {
            return Err(ConfigError::Invalid(
                "initial reconnect backoff exceeds the maximum".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        SessionSettings {
            refresh_interval: config.refresh.interval(),
            vitals_capacity: config.vitals.capacity,
            reconnect: ReconnectPolicy::from(&config.stream),
        }
    }
}

/// A monitoring session waiting to be started
pub struct MonitorSession {
    api: Arc<dyn ClinicalApi>,
    session: Session,
    settings: SessionSettings,
    channel: Option<Arc<dyn PushChannel>>,
    fallback: FallbackHandler,
}

impl fmt::Debug for MonitorSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorSession")
            .field("settings", &self.settings)
            .field("push_channel", &self.channel.is_some())
            .finish()
    }
}

impl MonitorSession {
    pub fn new(api: Arc<dyn ClinicalApi>, session: Session, settings: SessionSettings) -> Self {
        MonitorSession {
            api,
            session,
            settings,
            channel: None,
            fallback: Arc::new(|raw: &str| warn!(%raw, "unrecognized stream payload")),
        }
    }

    /// Subscribe to this push channel once started
    pub fn with_push_channel(mut self, channel: Arc<dyn PushChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn on_unrecognized(mut self, handler: FallbackHandler) -> Self {
        self.fallback = handler;
        self
    }

    /// Spawn the session task, the stream subscription and the bootstrap
    /// fetches. Must be called inside a tokio runtime.
    ///
    /// Fails without issuing any request when the session holds no token.
    pub fn start(self) -> Result<SessionHandle, EmberError> {
        self.settings.validate()?;
        if self.session.token().is_none() {
            return Err(EmberError::MissingCredential);
        }

        let engine = ReconciliationEngine::with_capacity(self.settings.vitals_capacity);
        let (view_tx, view_rx) = watch::channel(engine.view());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();

        let stream_task = match self.channel {
            Some(channel) => {
                Some(StreamIngestor::new(channel, self.session.clone(), self.settings.reconnect).spawn(stream_tx))
            }
            None => None,
        };

        let mut actor = Actor {
            engine,
            api: self.api,
            refresh_interval: self.settings.refresh_interval,
            fallback: self.fallback,
            fetches: JoinSet::new(),
            refresh_tx,
            refresher: None,
            stream_task,
            view_tx,
        };
        actor.bootstrap();

        let task = tokio::spawn(actor.run(command_rx, refresh_rx, stream_rx));
        info!("monitor session started");

        Ok(SessionHandle { commands: command_tx, view: view_rx, task })
    }
}

#[derive(Debug)]
enum Command {
    Select(String),
    Acknowledge { alert_id: String, note: String },
    Shutdown,
}

#[derive(Debug)]
enum FetchResult {
    Patients(Result<Vec<Patient>, ClientError>),
    AlertSnapshot(Result<Vec<Alert>, ClientError>),
    Vitals(FetchTag, Result<Vec<VitalReading>, ClientError>),
    Analytics(FetchTag, Result<AnalyticsSummary, ClientError>),
    Acknowledged { alert_id: String, result: Result<Vec<Alert>, AcknowledgeFailure> },
}

/// Control surface of a running session. Dropping it ends the session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<DashboardView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn select(&self, patient_id: &str) -> Result<(), EmberError> {
        self.send(Command::Select(patient_id.to_string()))
    }

    /// Queue an acknowledgment. The outcome shows up in the view: the
    /// alert leaves the set, or the error slot is filled.
    pub fn acknowledge(&self, alert_id: &str, note: &str) -> Result<(), EmberError> {
        self.send(Command::Acknowledge {
            alert_id: alert_id.to_string(),
            note: note.to_string(),
        })
    }

    pub fn view(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }

    /// Stop the session and wait for its task to wind down
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "monitor session task failed");
        }
    }

    fn send(&self, command: Command) -> Result<(), EmberError> {
        self.commands.send(command).map_err(|_| EmberError::SessionClosed)
    }
}

struct Actor {
    engine: ReconciliationEngine,
    api: Arc<dyn ClinicalApi>,
    refresh_interval: Duration,
    fallback: FallbackHandler,
    fetches: JoinSet<FetchResult>,
    refresh_tx: mpsc::UnboundedSender<AnalyticsRefresh>,
    refresher: Option<PeriodicRefresher>,
    stream_task: Option<JoinHandle<()>>,
    view_tx: watch::Sender<DashboardView>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut refreshes: mpsc::UnboundedReceiver<AnalyticsRefresh>,
        mut stream: mpsc::UnboundedReceiver<String>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(joined) = self.fetches.join_next() => match joined {
                    Ok(fetch) => self.handle_fetch(fetch),
                    Err(e) => warn!(error = %e, "fetch task failed"),
                },
                Some(refresh) = refreshes.recv() => {
                    self.engine.apply_analytics(&refresh.tag, AnalyticsOrigin::Refresh, refresh.result);
                }
                Some(raw) = stream.recv() => self.handle_stream(&raw),
            }

            self.view_tx.send_replace(self.engine.view());
        }

        self.teardown();
    }

    fn bootstrap(&mut self) {
        let api = self.api.clone();
        self.fetches.spawn(async move { FetchResult::Patients(api.get_patients().await) });

        let api = self.api.clone();
        self.fetches.spawn(async move { FetchResult::AlertSnapshot(api.get_alerts(None).await) });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Select(patient_id) => {
                let tag = self.engine.select(&patient_id);
                self.fetch_selection(tag);
            }
            Command::Acknowledge { alert_id, note } => {
                let api = self.api.clone();
                self.fetches.spawn(async move {
                    let result = match api.acknowledge_alert(&alert_id, &note).await {
                        Ok(_) => api.get_alerts(None).await.map_err(AcknowledgeFailure::Resync),
                        Err(e) => Err(AcknowledgeFailure::Rejected(e)),
                    };
                    FetchResult::Acknowledged { alert_id, result }
                });
            }
            Command::Shutdown => {}
        }
    }

    fn handle_fetch(&mut self, fetch: FetchResult) {
        match fetch {
            FetchResult::Patients(result) => {
                if let Some(tag) = self.engine.apply_patients(result) {
                    self.fetch_selection(tag);
                }
            }
            FetchResult::AlertSnapshot(result) => self.engine.apply_alert_snapshot(result),
            FetchResult::Vitals(tag, result) => {
                self.engine.apply_vitals(&tag, result);
            }
            FetchResult::Analytics(tag, result) => {
                self.engine.apply_analytics(&tag, AnalyticsOrigin::Selection, result);
            }
            FetchResult::Acknowledged { alert_id, result } => {
                self.engine.apply_acknowledgement(&alert_id, result)
            }
        }
    }

    fn handle_stream(&mut self, raw: &str) {
        if let StreamOutcome::Unrecognized(raw) = self.engine.apply_stream_message(raw) {
            (self.fallback)(&raw);
        }
    }

    // Snapshot fetches for a fresh selection, plus a refresher bound to it
    fn fetch_selection(&mut self, tag: FetchTag) {
        let api = self.api.clone();
        let vitals_tag = tag.clone();
        self.fetches.spawn(async move {
            let result = api.get_vitals(&vitals_tag.patient_id, None).await;
            FetchResult::Vitals(vitals_tag, result)
        });

        let api = self.api.clone();
        let analytics_tag = tag.clone();
        self.fetches.spawn(async move {
            let result = api.get_analytics_summary(&analytics_tag.patient_id).await;
            FetchResult::Analytics(analytics_tag, result)
        });

        // Replacing the refresher drops, and so cancels, the old timer
        self.refresher = Some(PeriodicRefresher::start(
            self.api.clone(),
            tag,
            self.refresh_interval,
            self.refresh_tx.clone(),
        ));
    }

    fn teardown(&mut self) {
        self.refresher = None;
        self.fetches.abort_all();
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        debug!("refresher and stream subscription cancelled");
        info!("monitor session stopped");
    }
}
