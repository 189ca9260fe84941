//! Trigger kinds parsed from workflow nodes.
//!
//! Node configuration arrives as loosely-typed JSON. It is validated once
//! here into a `TriggerKind`, so the registry never does ad hoc key lookups.

use crate::error::TriggerConfigError;
use crate::keys::normalize_path;
use crate::schedule::{CronSchedule, IntervalSchedule, IntervalUnit, ScheduleSpec};
use serde::{Deserialize, Serialize};
use switchyard_core::WorkflowNode;

/// Node type of webhook triggers.
pub const WEBHOOK_TRIGGER: &str = "webhook_trigger";

/// Node type of schedule triggers.
pub const SCHEDULE_TRIGGER: &str = "schedule_trigger";

/// Defaults applied while parsing trigger nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDefaults {
    /// Polling interval when a polling node does not set one.
    pub polling_interval_minutes: u32,
    /// Timezone for cron schedules that do not name one.
    pub timezone: String,
}

impl Default for TriggerDefaults {
    fn default() -> Self {
        Self {
            polling_interval_minutes: 15,
            timezone: "UTC".to_string(),
        }
    }
}

/// How callers of a webhook authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAuthentication {
    /// No authentication.
    #[default]
    None,
    /// Shared secret in a request header.
    Header,
    /// HTTP basic authentication.
    Basic,
    /// Shared secret in a query parameter.
    Query,
}

/// Sources that are polled on an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingSource {
    RssFeed,
    Email,
    GoogleSheets,
    Telegram,
}

impl PollingSource {
    /// Maps a node type to its polling source.
    #[must_use]
    pub fn from_node_type(node_type: &str) -> Option<Self> {
        match node_type {
            "rss_feed_trigger" => Some(Self::RssFeed),
            "email_trigger" => Some(Self::Email),
            "google_sheets_trigger" => Some(Self::GoogleSheets),
            "telegram_trigger" => Some(Self::Telegram),
            _ => None,
        }
    }

    /// The node type that declares this source.
    #[must_use]
    pub fn node_type(self) -> &'static str {
        match self {
            Self::RssFeed => "rss_feed_trigger",
            Self::Email => "email_trigger",
            Self::GoogleSheets => "google_sheets_trigger",
            Self::Telegram => "telegram_trigger",
        }
    }
}

/// A webhook trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTrigger {
    /// Path with leading and trailing slashes removed; never empty.
    pub path: String,
    /// Accepted HTTP method, upper-cased.
    pub method: String,
    /// Authentication scheme.
    pub authentication: WebhookAuthentication,
    /// Secret or credential reference for the scheme.
    pub auth_key: Option<String>,
}

/// A cron or interval schedule trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTrigger {
    /// The cadence.
    pub schedule: ScheduleSpec,
}

/// A polling trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingTrigger {
    /// The node that owns the poll.
    pub node_id: String,
    /// What is polled.
    pub source: PollingSource,
    /// Minutes between polls.
    pub interval_minutes: u32,
}

/// A validated trigger declared by a workflow node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    Webhook(WebhookTrigger),
    Schedule(ScheduleTrigger),
    Polling(PollingTrigger),
}

#[derive(Debug, Default, Deserialize)]
struct RawWebhookConfig {
    #[serde(default)]
    path: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    authentication: WebhookAuthentication,
    #[serde(default, alias = "authKey")]
    auth_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawScheduleConfig {
    #[serde(default, alias = "schedule_type")]
    mode: Option<String>,
    #[serde(default, alias = "cron_expression")]
    cron: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default, alias = "interval_value")]
    interval: Option<u32>,
    #[serde(default, alias = "interval_unit")]
    unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPollingConfig {
    #[serde(default, alias = "poll_interval")]
    interval_minutes: Option<u32>,
}

impl TriggerKind {
    /// Parses the trigger declared by `node`, if its type is trigger-capable.
    ///
    /// Returns `Ok(None)` for non-trigger nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is a trigger but its configuration is
    /// unusable.
    pub fn from_node(
        node: &WorkflowNode,
        defaults: &TriggerDefaults,
    ) -> Result<Option<Self>, TriggerConfigError> {
        match node.node_type.as_str() {
            WEBHOOK_TRIGGER => parse_webhook(node).map(|t| Some(Self::Webhook(t))),
            SCHEDULE_TRIGGER => parse_schedule(node, defaults).map(|t| Some(Self::Schedule(t))),
            other => match PollingSource::from_node_type(other) {
                Some(source) => parse_polling(node, source, defaults).map(|t| Some(Self::Polling(t))),
                None => Ok(None),
            },
        }
    }
}

fn config_of<T: for<'de> Deserialize<'de> + Default>(
    node: &WorkflowNode,
) -> Result<T, TriggerConfigError> {
    if node.config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(node.config.clone()).map_err(|e| TriggerConfigError::InvalidField {
        node_id: node.id.clone(),
        field: "config".to_string(),
        reason: e.to_string(),
    })
}

fn parse_webhook(node: &WorkflowNode) -> Result<WebhookTrigger, TriggerConfigError> {
    let raw: RawWebhookConfig = config_of(node)?;
    let path = normalize_path(raw.path.trim());
    if path.is_empty() {
        return Err(TriggerConfigError::MissingWebhookPath {
            node_id: node.id.clone(),
        });
    }

    let method = raw
        .method
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "POST".to_string());

    Ok(WebhookTrigger {
        path: path.to_string(),
        method,
        authentication: raw.authentication,
        auth_key: raw.auth_key.filter(|k| !k.is_empty()),
    })
}

fn parse_schedule(
    node: &WorkflowNode,
    defaults: &TriggerDefaults,
) -> Result<ScheduleTrigger, TriggerConfigError> {
    let raw: RawScheduleConfig = config_of(node)?;

    let use_cron = match raw.mode.as_deref() {
        Some("cron") => true,
        Some("interval") => false,
        Some(other) => {
            return Err(TriggerConfigError::InvalidField {
                node_id: node.id.clone(),
                field: "mode".to_string(),
                reason: format!("unknown schedule mode '{other}'"),
            });
        }
        None => raw.cron.is_some(),
    };

    let schedule = if use_cron {
        let expression = raw.cron.unwrap_or_default();
        let timezone = raw
            .timezone
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or_else(|| defaults.timezone.clone());
        ScheduleSpec::Cron(CronSchedule::parse(&expression, timezone)?)
    } else {
        let every = raw.interval.unwrap_or(0);
        if every == 0 {
            return Err(TriggerConfigError::InvalidInterval {
                node_id: node.id.clone(),
                reason: "interval must be at least 1".to_string(),
            });
        }
        let unit = match raw.unit.as_deref() {
            None => IntervalUnit::Minutes,
            Some(name) => IntervalUnit::from_name(name).ok_or_else(|| {
                TriggerConfigError::InvalidInterval {
                    node_id: node.id.clone(),
                    reason: format!("unknown unit '{name}'"),
                }
            })?,
        };
        ScheduleSpec::Interval(IntervalSchedule { every, unit })
    };

    Ok(ScheduleTrigger { schedule })
}

fn parse_polling(
    node: &WorkflowNode,
    source: PollingSource,
    defaults: &TriggerDefaults,
) -> Result<PollingTrigger, TriggerConfigError> {
    let raw: RawPollingConfig = config_of(node)?;
    let interval_minutes = match raw.interval_minutes {
        Some(0) => {
            return Err(TriggerConfigError::InvalidInterval {
                node_id: node.id.clone(),
                reason: "interval must be at least 1".to_string(),
            });
        }
        Some(minutes) => minutes,
        None => defaults.polling_interval_minutes,
    };

    Ok(PollingTrigger {
        node_id: node.id.clone(),
        source,
        interval_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};

    fn parse(node_type: &str, config: JsonValue) -> Result<Option<TriggerKind>, TriggerConfigError> {
        let node = WorkflowNode::new("n1", node_type, config);
        TriggerKind::from_node(&node, &TriggerDefaults::default())
    }

    #[test]
    fn non_trigger_node_is_none() {
        assert_eq!(parse("http_request", json!({"url": "x"})), Ok(None));
    }

    #[test]
    fn webhook_defaults() {
        let Some(TriggerKind::Webhook(hook)) = parse(WEBHOOK_TRIGGER, json!({"path": "/x/"})).unwrap()
        else {
            panic!("expected webhook");
        };
        assert_eq!(hook.path, "x");
        assert_eq!(hook.method, "POST");
        assert_eq!(hook.authentication, WebhookAuthentication::None);
        assert_eq!(hook.auth_key, None);
    }

    #[test]
    fn webhook_with_auth() {
        let parsed = parse(
            WEBHOOK_TRIGGER,
            json!({"path": "orders", "method": "put", "authentication": "header", "authKey": "s3cret"}),
        )
        .unwrap();
        let Some(TriggerKind::Webhook(hook)) = parsed else {
            panic!("expected webhook");
        };
        assert_eq!(hook.method, "PUT");
        assert_eq!(hook.authentication, WebhookAuthentication::Header);
        assert_eq!(hook.auth_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn webhook_empty_path_is_rejected() {
        assert!(matches!(
            parse(WEBHOOK_TRIGGER, json!({"path": "//"})),
            Err(TriggerConfigError::MissingWebhookPath { .. })
        ));
        assert!(matches!(
            parse(WEBHOOK_TRIGGER, JsonValue::Null),
            Err(TriggerConfigError::MissingWebhookPath { .. })
        ));
    }

    #[test]
    fn schedule_cron_uses_default_timezone() {
        let parsed = parse(SCHEDULE_TRIGGER, json!({"cron": "*/5 * * * *"})).unwrap();
        let Some(TriggerKind::Schedule(schedule)) = parsed else {
            panic!("expected schedule");
        };
        match schedule.schedule {
            ScheduleSpec::Cron(cron) => {
                assert_eq!(cron.minute, "*/5");
                assert_eq!(cron.timezone, "UTC");
            }
            ScheduleSpec::Interval(_) => panic!("expected cron"),
        }
    }

    #[test]
    fn schedule_invalid_cron_is_rejected() {
        assert!(matches!(
            parse(SCHEDULE_TRIGGER, json!({"mode": "cron", "cron": "* * *"})),
            Err(TriggerConfigError::InvalidCronExpression { .. })
        ));
    }

    #[test]
    fn schedule_interval() {
        let parsed = parse(
            SCHEDULE_TRIGGER,
            json!({"schedule_type": "interval", "interval_value": 2, "interval_unit": "hours"}),
        )
        .unwrap();
        let Some(TriggerKind::Schedule(schedule)) = parsed else {
            panic!("expected schedule");
        };
        assert_eq!(
            schedule.schedule,
            ScheduleSpec::Interval(IntervalSchedule {
                every: 2,
                unit: IntervalUnit::Hours
            })
        );
    }

    #[test]
    fn schedule_zero_interval_is_rejected() {
        assert!(matches!(
            parse(SCHEDULE_TRIGGER, json!({"mode": "interval", "interval": 0})),
            Err(TriggerConfigError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn polling_default_interval() {
        let parsed = parse("rss_feed_trigger", json!({"feed_url": "https://example.com/feed"})).unwrap();
        let Some(TriggerKind::Polling(poll)) = parsed else {
            panic!("expected polling");
        };
        assert_eq!(poll.source, PollingSource::RssFeed);
        assert_eq!(poll.interval_minutes, 15);
        assert_eq!(poll.node_id, "n1");
    }

    #[test]
    fn polling_custom_interval() {
        let parsed = parse("telegram_trigger", json!({"poll_interval": 3})).unwrap();
        let Some(TriggerKind::Polling(poll)) = parsed else {
            panic!("expected polling");
        };
        assert_eq!(poll.interval_minutes, 3);
        assert_eq!(poll.source.node_type(), "telegram_trigger");
    }
}
