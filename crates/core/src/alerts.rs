//! Alert rule and notification types.
//!
//! Rules are owned by site owners through the collaborator API and read-only
//! to the evaluator. Notifications are created once per breach and never
//! mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Metric condition an alert rule evaluates over its time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    /// Pageview count in the window exceeds the threshold
    PageviewSpike,
    /// Script error count in the window exceeds the threshold
    JsErrors,
    /// Script errors as a percentage of all events exceeds the threshold
    ErrorRate,
    /// Bounce rate percentage exceeds the threshold
    BounceRate,
    /// Mean page load time (ms) exceeds the threshold
    AvgLoadTime,
}

impl AlertCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageviewSpike => "pageview_spike",
            Self::JsErrors => "js_errors",
            Self::ErrorRate => "error_rate",
            Self::BounceRate => "bounce_rate",
            Self::AvgLoadTime => "avg_load_time",
        }
    }
}

/// A per-site alert rule.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlertRule {
    pub id: Uuid,
    pub site_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    /// Window the condition is evaluated over, in seconds. Doubles as the
    /// cooldown between successive notifications for this rule.
    #[validate(range(min = 60, max = 604800))]
    pub time_window_secs: u32,
    #[validate(email)]
    pub notification_email: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a rule.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AlertRuleCreate {
    pub site_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    #[validate(range(min = 60, max = 604800))]
    pub time_window_secs: u32,
    #[validate(email)]
    pub notification_email: String,
}

impl AlertRule {
    pub fn from_create(create: AlertRuleCreate) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id: create.site_id,
            name: create.name,
            condition: create.condition,
            threshold: create.threshold,
            time_window_secs: create.time_window_secs,
            notification_email: create.notification_email,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn time_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.time_window_secs as i64)
    }

    /// Minimum interval between successive notifications for this rule.
    pub fn cooldown(&self) -> chrono::Duration {
        self.time_window()
    }
}

/// A fired alert, handed to the notification-dispatch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub site_id: Uuid,
    pub rule_name: String,
    pub notification_email: String,
    pub triggered_at: DateTime<Utc>,
    pub message: String,
}

impl AlertNotification {
    pub fn new(rule: &AlertRule, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            site_id: rule.site_id,
            rule_name: rule.name.clone(),
            notification_email: rule.notification_email.clone(),
            triggered_at: Utc::now(),
            message: message.into(),
        }
    }
}
