//! Alert rule storage and threshold evaluation.
//!
//! The evaluator runs on its own interval, reading committed minute rollups
//! only. Each breach stores a notification before dispatching it, so delivery
//! failures never lose the record; the rule's window doubles as a cooldown
//! that suppresses repeat notifications while a breach persists.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use pulse_core::{
    AlertCondition, AlertNotification, AlertRule, AlertRuleCreate, Error, Granularity, Result,
    RollupBucket,
};
use telemetry::metrics;

use crate::aggregator::RollupStore;
use crate::dispatch::NotificationDispatcher;

const DISPATCH_ATTEMPTS: u32 = 3;
const DISPATCH_BACKOFF_MS: u64 = 100;

/// Per-site alert rules. Deletion is a soft deactivate so notification
/// history keeps resolving rule names.
#[derive(Default)]
pub struct RuleStore {
    rules: RwLock<HashMap<Uuid, AlertRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, create: AlertRuleCreate) -> Result<AlertRule> {
        create
            .validate()
            .map_err(|e| Error::malformed(format!("invalid alert rule: {e}")))?;
        let rule = AlertRule::from_create(create);
        self.rules.write().insert(rule.id, rule.clone());
        Ok(rule)
    }

    pub fn get(&self, rule_id: Uuid) -> Result<AlertRule> {
        self.rules
            .read()
            .get(&rule_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("alert rule {rule_id}")))
    }

    /// Active rules for one site, newest first.
    pub fn list_for_site(&self, site_id: Uuid) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self
            .rules
            .read()
            .values()
            .filter(|r| r.site_id == site_id && r.active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rules
    }

    /// Deactivates a rule. The rule row is kept.
    pub fn delete(&self, rule_id: Uuid) -> Result<()> {
        let mut rules = self.rules.write();
        match rules.get_mut(&rule_id) {
            Some(rule) => {
                rule.active = false;
                Ok(())
            }
            None => Err(Error::not_found(format!("alert rule {rule_id}"))),
        }
    }

    pub fn active_rules(&self) -> Vec<AlertRule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }
}

/// Append-only store of fired notifications.
#[derive(Default)]
pub struct NotificationStore {
    notifications: RwLock<Vec<AlertNotification>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notification: AlertNotification) {
        self.notifications.write().push(notification);
    }

    /// Notifications for one site, newest first, capped at `limit`.
    pub fn recent(&self, site_id: Uuid, limit: usize) -> Vec<AlertNotification> {
        let mut out: Vec<AlertNotification> = self
            .notifications
            .read()
            .iter()
            .filter(|n| n.site_id == site_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        out.truncate(limit);
        out
    }

    /// When the given rule last fired, for cooldown checks.
    pub fn latest_for_rule(&self, rule_id: Uuid) -> Option<DateTime<Utc>> {
        self.notifications
            .read()
            .iter()
            .filter(|n| n.rule_id == rule_id)
            .map(|n| n.triggered_at)
            .max()
    }

    pub fn len(&self) -> usize {
        self.notifications.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.read().is_empty()
    }
}

/// Evaluates every active rule against its trailing window of minute rollups.
pub struct AlertEvaluator {
    rules: Arc<RuleStore>,
    notifications: Arc<NotificationStore>,
    rollups: Arc<RollupStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AlertEvaluator {
    pub fn new(
        rules: Arc<RuleStore>,
        notifications: Arc<NotificationStore>,
        rollups: Arc<RollupStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            rules,
            notifications,
            rollups,
            dispatcher,
        }
    }

    /// Runs one evaluation pass over all active rules.
    pub async fn evaluate_all(&self, now: DateTime<Utc>) {
        for rule in self.rules.active_rules() {
            metrics().alert_evaluations.inc();
            if let Some(last) = self.notifications.latest_for_rule(rule.id) {
                if now - last < rule.cooldown() {
                    continue;
                }
            }

            let window_start = now - rule.time_window();
            let merged =
                self.rollups
                    .merged_range(rule.site_id, window_start, now, Granularity::Minute);
            let value = condition_value(rule.condition, &merged);
            if value <= rule.threshold {
                continue;
            }

            let mut notification =
                AlertNotification::new(&rule, breach_message(&rule, value, &merged));
            // The evaluation clock drives the cooldown, so the record carries
            // it rather than the wall clock
            notification.triggered_at = now;
            info!(
                rule_id = %rule.id,
                site_id = %rule.site_id,
                condition = rule.condition.as_str(),
                value,
                threshold = rule.threshold,
                "alert rule breached"
            );
            metrics().alerts_fired.inc();
            self.notifications.push(notification.clone());
            self.dispatch_with_retry(&notification).await;
        }
    }

    async fn dispatch_with_retry(&self, notification: &AlertNotification) {
        for attempt in 1..=DISPATCH_ATTEMPTS {
            match self.dispatcher.dispatch(notification).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        rule_id = %notification.rule_id,
                        attempt,
                        error = %e,
                        "notification dispatch failed"
                    );
                    if attempt < DISPATCH_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(
                            DISPATCH_BACKOFF_MS * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }
        metrics().alert_dispatch_failures.inc();
    }
}

/// Total events in a bucket. Every admitted event lands in exactly one
/// device-class counter, so their sum is the event count.
fn total_events(bucket: &RollupBucket) -> u64 {
    bucket.devices.values().sum()
}

fn condition_value(condition: AlertCondition, bucket: &RollupBucket) -> f64 {
    match condition {
        AlertCondition::PageviewSpike => bucket.pageviews as f64,
        AlertCondition::JsErrors => bucket.js_errors as f64,
        AlertCondition::ErrorRate => {
            let total = total_events(bucket);
            if total == 0 {
                0.0
            } else {
                bucket.js_errors as f64 / total as f64 * 100.0
            }
        }
        AlertCondition::BounceRate => bucket.bounce_rate(),
        AlertCondition::AvgLoadTime => bucket.avg_load_time_ms(),
    }
}

fn breach_message(rule: &AlertRule, value: f64, bucket: &RollupBucket) -> String {
    let window = rule.time_window_secs;
    match rule.condition {
        AlertCondition::PageviewSpike => format!(
            "Pageview spike detected: {} views in {window} seconds",
            bucket.pageviews
        ),
        AlertCondition::JsErrors => format!(
            "JavaScript errors detected: {} errors in {window} seconds",
            bucket.js_errors
        ),
        AlertCondition::ErrorRate => {
            format!("Error rate at {value:.1}% over the last {window} seconds")
        }
        AlertCondition::BounceRate => {
            format!("Bounce rate at {value:.1}% over the last {window} seconds")
        }
        AlertCondition::AvgLoadTime => {
            format!("Average page load time at {value:.0} ms over the last {window} seconds")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::dispatch::LogDispatcher;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pulse_core::{page_path, Event, EventPayload, EventType, JsErrorData};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rule_create(site: Uuid, condition: AlertCondition, threshold: f64) -> AlertRuleCreate {
        AlertRuleCreate {
            site_id: site,
            name: "test rule".into(),
            condition,
            threshold,
            time_window_secs: 600,
            notification_email: "owner@example.com".into(),
        }
    }

    fn pageview(site: Uuid, seq: u64, ts: DateTime<Utc>) -> Event {
        Event {
            seq,
            id: Uuid::new_v4(),
            site_id: site,
            visitor_id: format!("v{seq}"),
            session_hint: None,
            event_type: EventType::Pageview,
            url: "https://example.com/home".into(),
            path: page_path("https://example.com/home"),
            referrer: None,
            user_agent: None,
            client_timestamp: None,
            server_timestamp: ts,
            payload: None,
            degraded: None,
        }
    }

    fn js_error(site: Uuid, seq: u64, ts: DateTime<Utc>) -> Event {
        let mut event = pageview(site, seq, ts);
        event.event_type = EventType::JsError;
        event.payload = Some(EventPayload::JsError(JsErrorData {
            message: "TypeError: x is undefined".into(),
            filename: None,
            line: None,
        }));
        event
    }

    fn evaluator(
        site: Uuid,
        condition: AlertCondition,
        threshold: f64,
    ) -> (AlertEvaluator, Arc<RuleStore>, Arc<NotificationStore>, Arc<RollupStore>) {
        let rules = Arc::new(RuleStore::new());
        rules.create(rule_create(site, condition, threshold)).unwrap();
        let notifications = Arc::new(NotificationStore::new());
        let rollups = Arc::new(RollupStore::new());
        let evaluator = AlertEvaluator::new(
            rules.clone(),
            notifications.clone(),
            rollups.clone(),
            Arc::new(LogDispatcher),
        );
        (evaluator, rules, notifications, rollups)
    }

    #[tokio::test]
    async fn spike_fires_once_then_cools_down() {
        let site = Uuid::new_v4();
        let (evaluator, _, notifications, rollups) =
            evaluator(site, AlertCondition::PageviewSpike, 5.0);
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 10, 0).unwrap();

        let agg = Aggregator::new(rollups);
        for seq in 1..=6 {
            agg.apply_event(&pageview(site, seq, now - chrono::Duration::minutes(1)));
        }

        evaluator.evaluate_all(now).await;
        assert_eq!(notifications.len(), 1);
        let fired = &notifications.recent(site, 10)[0];
        assert!(fired.message.contains("6 views in 600 seconds"), "{}", fired.message);

        // Still breached one minute later, but inside the cooldown
        evaluator.evaluate_all(now + chrono::Duration::minutes(1)).await;
        assert_eq!(notifications.len(), 1);

        // Past the cooldown a fresh breach fires again
        let later = now + chrono::Duration::minutes(11);
        for seq in 7..=12 {
            agg.apply_event(&pageview(site, seq, later - chrono::Duration::minutes(1)));
        }
        evaluator.evaluate_all(later).await;
        assert_eq!(notifications.len(), 2);
    }

    #[tokio::test]
    async fn js_error_burst_fires_past_threshold() {
        let site = Uuid::new_v4();
        let (evaluator, _, notifications, rollups) =
            evaluator(site, AlertCondition::JsErrors, 5.0);
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 10, 0).unwrap();

        // Five errors sit exactly at the threshold
        let agg = Aggregator::new(rollups);
        for seq in 1..=5 {
            agg.apply_event(&js_error(site, seq, now - chrono::Duration::minutes(1)));
        }
        evaluator.evaluate_all(now).await;
        assert!(notifications.is_empty());

        // The sixth crosses it
        agg.apply_event(&js_error(site, 6, now - chrono::Duration::minutes(1)));
        evaluator.evaluate_all(now).await;
        assert_eq!(notifications.len(), 1);
        let fired = &notifications.recent(site, 10)[0];
        assert!(fired.message.contains("6 errors in 600 seconds"), "{}", fired.message);

        // Further errors inside the cooldown fold into the existing alert
        agg.apply_event(&js_error(site, 7, now));
        evaluator
            .evaluate_all(now + chrono::Duration::minutes(1))
            .await;
        assert_eq!(notifications.len(), 1);
    }

    #[tokio::test]
    async fn below_threshold_stays_quiet() {
        let site = Uuid::new_v4();
        let (evaluator, _, notifications, rollups) =
            evaluator(site, AlertCondition::PageviewSpike, 5.0);
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 10, 0).unwrap();

        let agg = Aggregator::new(rollups);
        for seq in 1..=5 {
            agg.apply_event(&pageview(site, seq, now - chrono::Duration::minutes(1)));
        }

        // Exactly at the threshold is not a breach
        evaluator.evaluate_all(now).await;
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn deleted_rule_no_longer_evaluates() {
        let site = Uuid::new_v4();
        let (evaluator, rules, notifications, rollups) =
            evaluator(site, AlertCondition::PageviewSpike, 1.0);
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 10, 0).unwrap();

        let rule_id = rules.list_for_site(site)[0].id;
        rules.delete(rule_id).unwrap();
        assert!(rules.list_for_site(site).is_empty());

        let agg = Aggregator::new(rollups);
        for seq in 1..=3 {
            agg.apply_event(&pageview(site, seq, now));
        }
        evaluator.evaluate_all(now).await;
        assert!(notifications.is_empty());
    }

    struct FlakyDispatcher {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl NotificationDispatcher for FlakyDispatcher {
        async fn dispatch(&self, _notification: &AlertNotification) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                Err(Error::internal("smtp unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_retries_and_keeps_the_record() {
        let site = Uuid::new_v4();
        let rules = Arc::new(RuleStore::new());
        rules
            .create(rule_create(site, AlertCondition::PageviewSpike, 0.0))
            .unwrap();
        let notifications = Arc::new(NotificationStore::new());
        let rollups = Arc::new(RollupStore::new());
        let dispatcher = Arc::new(FlakyDispatcher {
            attempts: AtomicU32::new(0),
            fail_first: 2,
        });
        let evaluator = AlertEvaluator::new(
            rules,
            notifications.clone(),
            rollups.clone(),
            dispatcher.clone(),
        );

        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 10, 0).unwrap();
        let agg = Aggregator::new(rollups);
        agg.apply_event(&pageview(site, 1, now));

        evaluator.evaluate_all(now).await;
        assert_eq!(dispatcher.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(notifications.len(), 1);
    }

    #[test]
    fn rule_validation_rejects_bad_email() {
        let rules = RuleStore::new();
        let mut create = rule_create(Uuid::new_v4(), AlertCondition::JsErrors, 10.0);
        create.notification_email = "not-an-email".into();
        assert!(rules.create(create).is_err());
    }
}
