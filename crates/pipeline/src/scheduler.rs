//! Pipeline assembly and background task scheduling.
//!
//! Each consumer loop fetches a batch at its own cursor, applies it, then
//! commits. A panic-free error path (log and continue) keeps one bad tick
//! from killing a loop.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use event_store::{ConsumerCursor, EventStore};
use pulse_core::{limits::FETCH_BATCH_SIZE, Session, INACTIVITY_GAP_MINUTES};
use telemetry::{health, metrics};

use crate::aggregator::{Aggregator, RollupStore};
use crate::alerts::{AlertEvaluator, NotificationStore, RuleStore};
use crate::binner::HeatmapStore;
use crate::dispatch::NotificationDispatcher;
use crate::query::QueryService;
use crate::sessionizer::Sessionizer;

/// Tuning knobs for the background loops.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Max events fetched per consumer tick
    pub fetch_batch: usize,
    /// Consumer poll interval when the log is quiet
    pub poll_interval: Duration,
    /// Idle-session sweep interval
    pub sweep_interval: Duration,
    /// Alert evaluation interval
    pub alert_interval: Duration,
    /// Metrics snapshot log interval
    pub metrics_flush_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_batch: FETCH_BATCH_SIZE,
            poll_interval: Duration::from_millis(200),
            sweep_interval: Duration::from_secs(60),
            alert_interval: Duration::from_secs(60),
            metrics_flush_interval: Duration::from_secs(60),
        }
    }
}

/// The assembled processing pipeline downstream of the event store.
pub struct Pipeline {
    store: Arc<EventStore>,
    sessionizer: Sessionizer,
    aggregator: Aggregator,
    binner: Arc<HeatmapStore>,
    evaluator: AlertEvaluator,
    rollups: Arc<RollupStore>,
    rules: Arc<RuleStore>,
    notifications: Arc<NotificationStore>,
    query: QueryService,
    aggregation_cursor: ConsumerCursor,
    binner_cursor: ConsumerCursor,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<EventStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: PipelineConfig,
    ) -> Self {
        let rollups = Arc::new(RollupStore::new());
        let binner = Arc::new(HeatmapStore::new());
        let rules = Arc::new(RuleStore::new());
        let notifications = Arc::new(NotificationStore::new());
        let evaluator = AlertEvaluator::new(
            rules.clone(),
            notifications.clone(),
            rollups.clone(),
            dispatcher,
        );
        let query = QueryService::new(rollups.clone(), binner.clone(), store.clone());
        Self {
            store,
            sessionizer: Sessionizer::new(chrono::Duration::minutes(INACTIVITY_GAP_MINUTES)),
            aggregator: Aggregator::new(rollups.clone()),
            binner,
            evaluator,
            rollups,
            rules,
            notifications,
            query,
            aggregation_cursor: ConsumerCursor::new("aggregation"),
            binner_cursor: ConsumerCursor::new("binner"),
            config,
        }
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }

    pub fn rollups(&self) -> &Arc<RollupStore> {
        &self.rollups
    }

    /// One tick of the sessionizer + aggregator consumer. Returns the number
    /// of events applied.
    fn step_aggregation(&self) -> usize {
        let (batch, next) = self
            .store
            .fetch_since(self.aggregation_cursor.load(), self.config.fetch_batch);
        if batch.is_empty() {
            return 0;
        }
        let applied = batch.len();
        for event in batch {
            let closed = self.sessionizer.apply(&event);
            self.aggregator.apply_event(&event);
            self.apply_closed(closed);
        }
        // Commit only after the whole batch applied; a crash before this
        // point redelivers, and seq dedup absorbs the replay.
        self.aggregation_cursor.commit(next);
        metrics()
            .aggregator_lag
            .set(self.store.latest_seq().saturating_sub(self.aggregation_cursor.consumed()));
        applied
    }

    /// One tick of the heatmap binner consumer.
    fn step_binner(&self) -> usize {
        let (batch, next) = self
            .store
            .fetch_since(self.binner_cursor.load(), self.config.fetch_batch);
        if batch.is_empty() {
            return 0;
        }
        let applied = batch.len();
        for event in batch {
            self.binner.apply(&event);
        }
        self.binner_cursor.commit(next);
        metrics()
            .binner_lag
            .set(self.store.latest_seq().saturating_sub(self.binner_cursor.consumed()));
        applied
    }

    fn apply_closed(&self, closed: Vec<Session>) {
        for session in closed {
            debug!(
                site_id = %session.site_id,
                visitor_id = %session.visitor_id,
                pages = session.page_sequence.len(),
                "session closed"
            );
            self.aggregator.apply_session(&session);
        }
    }

    /// Closes idle sessions and folds them into the rollups.
    pub fn sweep_sessions(&self) {
        let closed = self.sessionizer.sweep(Utc::now());
        if !closed.is_empty() {
            info!(count = closed.len(), "swept idle sessions");
        }
        self.apply_closed(closed);
    }

    /// Synchronously consumes the log to its head. Test and shutdown hook;
    /// the background loops do the same work incrementally.
    pub fn drain(&self) {
        loop {
            let applied = self.step_aggregation() + self.step_binner();
            if applied == 0 {
                break;
            }
        }
    }

    /// Drains the log and closes every open session as of `now`.
    pub fn drain_and_sweep(&self, now: chrono::DateTime<Utc>) {
        self.drain();
        self.apply_closed(self.sessionizer.sweep(now));
    }

    pub async fn evaluate_alerts(&self) {
        self.evaluator.evaluate_all(Utc::now()).await;
    }

    /// Spawns the background loops. Handles are returned so the caller can
    /// abort them on shutdown.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        health().pipeline.set_healthy();
        let mut handles = Vec::new();

        let pipeline = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(pipeline.config.poll_interval);
            loop {
                tick.tick().await;
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    pipeline.step_aggregation()
                }));
                if let Err(e) = result {
                    metrics().consumer_errors.inc();
                    error!(consumer = "aggregation", "consumer tick panicked: {e:?}");
                }
            }
        }));

        let pipeline = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(pipeline.config.poll_interval);
            loop {
                tick.tick().await;
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    pipeline.step_binner()
                }));
                if let Err(e) = result {
                    metrics().consumer_errors.inc();
                    error!(consumer = "binner", "consumer tick panicked: {e:?}");
                }
            }
        }));

        let pipeline = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(pipeline.config.sweep_interval);
            loop {
                tick.tick().await;
                pipeline.sweep_sessions();
            }
        }));

        let pipeline = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(pipeline.config.alert_interval);
            loop {
                tick.tick().await;
                pipeline.evaluate_alerts().await;
            }
        }));

        let pipeline = self.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(pipeline.config.metrics_flush_interval);
            loop {
                tick.tick().await;
                match serde_json::to_string(&metrics().snapshot()) {
                    Ok(snapshot) => info!(target: "metrics", %snapshot, "metrics snapshot"),
                    Err(e) => error!("failed to serialize metrics snapshot: {e}"),
                }
            }
        }));

        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            sweep_secs = self.config.sweep_interval.as_secs(),
            alert_secs = self.config.alert_interval.as_secs(),
            "pipeline started"
        );
        handles
    }
}
