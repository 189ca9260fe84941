//! Dead letter entries and the failure signal that creates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use switchyard_core::DeadLetterId;

/// Lifecycle of a dead letter.
///
/// `Resolved` and `Expired` are terminal; the expiry sweep is the only thing
/// that touches them afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterStatus {
    Pending,
    Retrying,
    Resolved,
    Expired,
}

impl DeadLetterStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Retrying, Self::Resolved, Self::Expired];

    /// Returns true for `Resolved` and `Expired`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Expired)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Resolved => "resolved",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for DeadLetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed task execution held for retry.
///
/// Serializes to the persisted record shape: `{id, task_id, task_name, args,
/// kwargs, exception, traceback, retry_count, created_at, last_retry_at,
/// status}` with ISO-8601 timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    /// Broker id of the failed execution.
    pub task_id: String,
    pub task_name: String,
    pub args: Vec<JsonValue>,
    pub kwargs: Map<String, JsonValue>,
    /// Summary of the raised exception.
    pub exception: String,
    pub traceback: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub status: DeadLetterStatus,
}

impl DeadLetterEntry {
    pub(crate) fn from_failure(failure: TaskFailure) -> Self {
        Self {
            id: DeadLetterId::new(),
            task_id: failure.task_id,
            task_name: failure.task_name,
            args: failure.args,
            kwargs: failure.kwargs,
            exception: failure.exception,
            traceback: failure.traceback,
            retry_count: 0,
            created_at: Utc::now(),
            last_retry_at: None,
            status: DeadLetterStatus::Pending,
        }
    }
}

/// Failure signal published by a worker when a task raises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: String,
    pub task_name: String,
    #[serde(default)]
    pub args: Vec<JsonValue>,
    #[serde(default)]
    pub kwargs: Map<String, JsonValue>,
    pub exception: String,
    #[serde(default)]
    pub traceback: String,
}

impl TaskFailure {
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        args: Vec<JsonValue>,
        kwargs: Map<String, JsonValue>,
        exception: impl Into<String>,
        traceback: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_name: task_name.into(),
            args,
            kwargs,
            exception: exception.into(),
            traceback: traceback.into(),
        }
    }
}

/// Counts of dead letters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterStats {
    pub total: usize,
    /// Every status is present, zero when unused.
    pub by_status: BTreeMap<DeadLetterStatus, usize>,
    pub by_task: BTreeMap<String, usize>,
}

impl DeadLetterStats {
    pub(crate) fn tally<'a>(entries: impl IntoIterator<Item = &'a DeadLetterEntry>) -> Self {
        let mut stats = Self {
            by_status: DeadLetterStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            ..Self::default()
        };
        for entry in entries {
            stats.total += 1;
            *stats.by_status.entry(entry.status).or_default() += 1;
            *stats.by_task.entry(entry.task_name.clone()).or_default() += 1;
        }
        stats
    }

    /// Count for one status.
    #[must_use]
    pub fn status_count(&self, status: DeadLetterStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure() -> TaskFailure {
        let mut kwargs = Map::new();
        kwargs.insert("to".to_string(), json!("a@example.com"));
        TaskFailure::new("t-1", "send_email", vec![json!(42)], kwargs, "SMTPError", "trace")
    }

    #[test]
    fn entry_from_failure_is_pending() {
        let entry = DeadLetterEntry::from_failure(failure());
        assert_eq!(entry.status, DeadLetterStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert!(entry.last_retry_at.is_none());
        assert_eq!(entry.args, vec![json!(42)]);
    }

    #[test]
    fn entry_record_shape() {
        let entry = DeadLetterEntry::from_failure(failure());
        let value = serde_json::to_value(&entry).expect("serialize");
        let mut keys: Vec<&str> = value.as_object().expect("object").keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "args",
                "created_at",
                "exception",
                "id",
                "kwargs",
                "last_retry_at",
                "retry_count",
                "status",
                "task_id",
                "task_name",
                "traceback"
            ]
        );
        assert_eq!(value["status"], "pending");
        assert!(value["last_retry_at"].is_null());
        assert!(value["created_at"].as_str().expect("timestamp").contains('T'));
    }

    #[test]
    fn failure_signal_defaults() {
        let failure: TaskFailure = serde_json::from_value(json!({
            "task_id": "t-2",
            "task_name": "poll_trigger",
            "exception": "Timeout"
        }))
        .expect("decode");
        assert!(failure.args.is_empty());
        assert!(failure.kwargs.is_empty());
        assert_eq!(failure.traceback, "");
    }

    #[test]
    fn stats_tally() {
        let mut resolved = DeadLetterEntry::from_failure(failure());
        resolved.status = DeadLetterStatus::Resolved;
        let entries = [DeadLetterEntry::from_failure(failure()), resolved];

        let stats = DeadLetterStats::tally(&entries);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.status_count(DeadLetterStatus::Pending), 1);
        assert_eq!(stats.status_count(DeadLetterStatus::Resolved), 1);
        assert_eq!(stats.status_count(DeadLetterStatus::Expired), 0);
        assert_eq!(stats.by_status.len(), 4);
        assert_eq!(stats.by_task["send_email"], 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeadLetterStatus::Resolved.is_terminal());
        assert!(DeadLetterStatus::Expired.is_terminal());
        assert!(!DeadLetterStatus::Retrying.is_terminal());
        assert_eq!(DeadLetterStatus::Retrying.to_string(), "retrying");
    }
}
