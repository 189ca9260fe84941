//! NATS JetStream collaborators for the dead letter queue.
//!
//! - `NatsTaskBroker`: submissions are published to
//!   `tasks.submit.<task_name>` on a work-queue stream that the worker pool
//!   consumes
//! - `failure_consumer`: workers report failures on `tasks.failed`, captured
//!   by a work-queue stream and read through one durable pull consumer shared
//!   by every coordinator, so each signal is handled once and survives
//!   coordinator downtime; [`decode_failure`] turns a message into a
//!   [`TaskFailure`]
//! - `NatsDeadLetterStore`: entries on a KV bucket in the persisted record
//!   shape, keyed by dead letter id

use crate::broker::TaskBroker;
use crate::entry::{DeadLetterEntry, TaskFailure};
use crate::error::{BrokerError, DeadLetterStoreError};
use crate::store::{DeadLetterStore, StoredEntry};
use async_nats::jetstream::{self, consumer, kv};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::TryStreamExt;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::time::Duration;
use switchyard_core::{DeadLetterId, Envelope};
use tracing::{debug, instrument, warn};

/// Subject prefix for task submissions.
pub const SUBMIT_SUBJECT_PREFIX: &str = "tasks.submit";

/// Subject workers publish failures on.
pub const FAILURE_SUBJECT: &str = "tasks.failed";

/// Durable consumer the coordinators share for failure signals.
pub const FAILURE_CONSUMER: &str = "dead-letter-queue";

/// Default bucket for dead letter records.
pub const DEAD_LETTER_BUCKET: &str = "dead-letters";

/// Stream holding submitted tasks.
const TASKS_STREAM_NAME: &str = "TASKS";

/// Stream holding failure signals until a coordinator records them.
const FAILURES_STREAM_NAME: &str = "TASK_FAILURES";

/// A task handed to the worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_name: String,
    pub args: Vec<JsonValue>,
    pub kwargs: Map<String, JsonValue>,
    /// Workers hold the task until this instant.
    pub not_before: DateTime<Utc>,
}

/// Stream, subject and bucket names for the NATS collaborators.
#[derive(Debug, Clone, Default)]
pub struct NatsQueueConfig {
    /// Submission stream name (defaults to `TASKS`).
    pub stream_name: Option<String>,
    /// Submission subject prefix (defaults to `tasks.submit`).
    pub subject_prefix: Option<String>,
    /// Failure signal subject (defaults to `tasks.failed`).
    pub failure_subject: Option<String>,
    /// Durable failure consumer (defaults to `dead-letter-queue`).
    pub failure_consumer: Option<String>,
    /// Dead letter bucket (defaults to `dead-letters`).
    pub dead_letter_bucket: Option<String>,
}

impl NatsQueueConfig {
    fn stream_name(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(TASKS_STREAM_NAME)
    }

    fn subject_prefix(&self) -> &str {
        self.subject_prefix.as_deref().unwrap_or(SUBMIT_SUBJECT_PREFIX)
    }

    fn failure_subject(&self) -> &str {
        self.failure_subject.as_deref().unwrap_or(FAILURE_SUBJECT)
    }

    fn failure_consumer(&self) -> &str {
        self.failure_consumer.as_deref().unwrap_or(FAILURE_CONSUMER)
    }

    fn dead_letter_bucket(&self) -> &str {
        self.dead_letter_bucket.as_deref().unwrap_or(DEAD_LETTER_BUCKET)
    }
}

/// Task broker publishing to a JetStream work queue.
pub struct NatsTaskBroker {
    jetstream: jetstream::Context,
    subject_prefix: String,
    handlers: BTreeSet<String>,
}

impl NatsTaskBroker {
    /// Creates the broker, ensuring the task stream exists.
    ///
    /// `handlers` names the tasks deployed workers can run.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be created.
    pub async fn new(
        jetstream: jetstream::Context,
        config: &NatsQueueConfig,
        handlers: impl IntoIterator<Item = String>,
    ) -> Result<Self, Report<BrokerError>> {
        let subject_prefix = config.subject_prefix().to_string();
        let stream_config = jetstream::stream::Config {
            name: config.stream_name().to_string(),
            subjects: vec![format!("{subject_prefix}.>")],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| BrokerError::Unavailable {
                reason: format!("failed to create stream: {e}"),
            })?;

        Ok(Self {
            jetstream,
            subject_prefix,
            handlers: handlers.into_iter().collect(),
        })
    }

    fn subject(&self, task_name: &str) -> String {
        format!("{}.{task_name}", self.subject_prefix)
    }
}

#[async_trait]
impl TaskBroker for NatsTaskBroker {
    #[instrument(skip(self, args, kwargs))]
    async fn submit(
        &self,
        task_name: &str,
        args: &[JsonValue],
        kwargs: &Map<String, JsonValue>,
        delay: Duration,
    ) -> Result<(), Report<BrokerError>> {
        let submission = TaskSubmission {
            task_name: task_name.to_string(),
            args: args.to_vec(),
            kwargs: kwargs.clone(),
            not_before: Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero()),
        };
        let bytes = Envelope::new(submission)
            .to_json_bytes()
            .map_err(|e| BrokerError::Serialization {
                task: task_name.to_string(),
                reason: e.to_string(),
            })?;

        let publish_failed = |reason: String| BrokerError::PublishFailed {
            task: task_name.to_string(),
            reason,
        };
        self.jetstream
            .publish(self.subject(task_name), bytes.into())
            .await
            .map_err(|e| publish_failed(e.to_string()))?
            .await
            .map_err(|e| publish_failed(e.to_string()))?;

        debug!("task submitted");
        Ok(())
    }

    fn has_handler(&self, task_name: &str) -> bool {
        self.handlers.contains(task_name)
    }
}

/// Binds the durable consumer for failure signals, creating the failure
/// stream and the consumer if needed.
///
/// Messages must be acknowledged explicitly once recorded; unacknowledged
/// ones are redelivered.
///
/// # Errors
///
/// Returns an error if the stream or consumer cannot be created.
pub async fn failure_consumer(
    jetstream: &jetstream::Context,
    config: &NatsQueueConfig,
) -> Result<consumer::PullConsumer, Report<BrokerError>> {
    let subject = config.failure_subject().to_string();
    let stream = jetstream
        .get_or_create_stream(jetstream::stream::Config {
            name: FAILURES_STREAM_NAME.to_string(),
            subjects: vec![subject],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .map_err(|e| BrokerError::Unavailable {
            reason: format!("failed to create failure stream: {e}"),
        })?;

    let name = config.failure_consumer();
    let consumer = stream
        .get_or_create_consumer(
            name,
            consumer::pull::Config {
                durable_name: Some(name.to_string()),
                ack_policy: consumer::AckPolicy::Explicit,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| BrokerError::Unavailable {
            reason: format!("failed to create failure consumer: {e}"),
        })?;
    Ok(consumer)
}

/// Decodes a failure signal published by a worker.
///
/// # Errors
///
/// Returns an error if the payload is not an enveloped `TaskFailure`.
pub fn decode_failure(payload: &[u8]) -> switchyard_core::Result<TaskFailure, BrokerError> {
    let envelope: Envelope<TaskFailure> =
        Envelope::from_json_bytes(payload).map_err(|e| BrokerError::InvalidFailureSignal {
            reason: e.to_string(),
        })?;
    if !envelope.is_current_version() {
        return Err(BrokerError::InvalidFailureSignal {
            reason: format!("unsupported envelope version {}", envelope.version),
        }
        .into());
    }
    Ok(envelope.into_payload())
}

/// Dead letter store on a JetStream KV bucket.
///
/// Each entry is stored under its id as the JSON record shape. KV revisions
/// back the revision checks of [`DeadLetterStore::save`].
pub struct NatsDeadLetterStore {
    kv: kv::Store,
}

impl NatsDeadLetterStore {
    /// Opens (creating if needed) the dead letter bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be created or bound.
    pub async fn new(
        jetstream: &jetstream::Context,
        config: &NatsQueueConfig,
    ) -> Result<Self, Report<DeadLetterStoreError>> {
        let bucket = config.dead_letter_bucket();
        let kv = jetstream
            .create_key_value(kv::Config {
                bucket: bucket.to_string(),
                history: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| DeadLetterStoreError::Unavailable {
                reason: format!("failed to open bucket '{bucket}': {e}"),
            })?;
        Ok(Self { kv })
    }

    async fn load_key(&self, key: &str) -> Result<Option<StoredEntry>, Report<DeadLetterStoreError>> {
        let entry = self
            .kv
            .entry(key)
            .await
            .map_err(|e| DeadLetterStoreError::ReadFailed {
                reason: e.to_string(),
            })?;
        let Some(entry) = entry.filter(|entry| entry.operation == kv::Operation::Put) else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&entry.value).map_err(|e| {
            DeadLetterStoreError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(StoredEntry {
            entry: record,
            revision: entry.revision,
        }))
    }
}

fn record_key(id: DeadLetterId) -> String {
    id.to_string()
}

#[async_trait]
impl DeadLetterStore for NatsDeadLetterStore {
    async fn save(
        &self,
        entry: &DeadLetterEntry,
        expected: Option<u64>,
    ) -> Result<u64, Report<DeadLetterStoreError>> {
        let key = record_key(entry.id);
        let write_failed = |reason: String| DeadLetterStoreError::WriteFailed {
            id: key.clone(),
            reason,
        };
        let bytes = serde_json::to_vec(entry).map_err(|e| write_failed(e.to_string()))?;

        match expected {
            None => self
                .kv
                .put(key.as_str(), bytes.into())
                .await
                .map_err(|e| write_failed(e.to_string()).into()),
            Some(revision) => match self.kv.update(key.as_str(), bytes.into(), revision).await {
                Ok(revision) => Ok(revision),
                Err(e) if e.kind() == kv::UpdateErrorKind::WrongLastRevision => {
                    Err(DeadLetterStoreError::Conflict { id: key.clone() }.into())
                }
                Err(e) => Err(write_failed(e.to_string()).into()),
            },
        }
    }

    async fn load(
        &self,
        id: DeadLetterId,
    ) -> Result<Option<StoredEntry>, Report<DeadLetterStoreError>> {
        self.load_key(&record_key(id)).await
    }

    async fn delete(&self, id: DeadLetterId) -> Result<(), Report<DeadLetterStoreError>> {
        let key = record_key(id);
        self.kv
            .delete(key.as_str())
            .await
            .map_err(|e| DeadLetterStoreError::WriteFailed {
                id: key.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<Vec<StoredEntry>, Report<DeadLetterStoreError>> {
        let read_failed = |reason: String| DeadLetterStoreError::ReadFailed { reason };
        let keys: Vec<String> = self
            .kv
            .keys()
            .await
            .map_err(|e| read_failed(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| read_failed(e.to_string()))?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            match self.load_key(&key).await {
                Ok(Some(stored)) => entries.push(stored),
                Ok(None) => {}
                Err(e) if matches!(e.current_context(), DeadLetterStoreError::CorruptRecord { .. }) => {
                    warn!(key = %key, error = %e, "skipping corrupt dead letter record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_defaults() {
        let config = NatsQueueConfig::default();
        assert_eq!(config.stream_name(), TASKS_STREAM_NAME);
        assert_eq!(config.subject_prefix(), SUBMIT_SUBJECT_PREFIX);
        assert_eq!(config.failure_subject(), FAILURE_SUBJECT);
        assert_eq!(config.failure_consumer(), FAILURE_CONSUMER);
        assert_eq!(config.dead_letter_bucket(), DEAD_LETTER_BUCKET);
    }

    #[test]
    fn failure_subject_is_outside_the_submission_stream() {
        let config = NatsQueueConfig::default();
        assert!(!config.failure_subject().starts_with(&format!("{}.", config.subject_prefix())));
    }

    #[test]
    fn record_keys_are_valid_kv_keys() {
        let key = record_key(DeadLetterId::new());
        assert!(key.starts_with("dlq_"));
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn decodes_enveloped_failure() {
        let payload = json!({
            "version": 1,
            "payload": {
                "task_id": "t-9",
                "task_name": "poll_trigger",
                "args": [12, "feed"],
                "exception": "ConnectionError",
                "traceback": "..."
            }
        });
        let failure = decode_failure(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert_eq!(failure.task_name, "poll_trigger");
        assert_eq!(failure.args, vec![json!(12), json!("feed")]);
    }

    #[test]
    fn rejects_malformed_failure() {
        assert!(decode_failure(b"not json").is_err());

        let future = json!({"version": 2, "payload": {"task_id": "t", "task_name": "x", "exception": "e"}});
        assert!(decode_failure(&serde_json::to_vec(&future).unwrap()).is_err());
    }
}
