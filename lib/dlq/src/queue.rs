//! The dead letter queue.
//!
//! Each entry sits behind its own async mutex so `retry`, `resolve` and
//! `remove` on one entry are serialized within the process, while different
//! entries proceed concurrently. The map lock is only held for lookups and
//! never across a suspension point.
//!
//! Every change is written through to the [`DeadLetterStore`] with the
//! revision the process last saw. A write that loses to another coordinator
//! reloads the stored copy and the operation reports false, so an entry is
//! never retried twice for one attempt.

use crate::broker::TaskBroker;
use crate::entry::{DeadLetterEntry, DeadLetterStats, DeadLetterStatus, TaskFailure};
use crate::error::{DeadLetterError, DeadLetterStoreError};
use crate::store::{DeadLetterStore, InMemoryDeadLetterStore, StoredEntry};
use chrono::{TimeDelta, Utc};
use rootcause::prelude::Report;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use switchyard_core::DeadLetterId;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// An entry and the store revision it was last written or read at.
///
/// `revision` is `None` while the entry has never reached the store.
#[derive(Debug)]
struct Slot {
    entry: DeadLetterEntry,
    revision: Option<u64>,
}

type EntryHandle = Arc<Mutex<Slot>>;

/// Dead letter queue configuration.
#[derive(Debug, Clone)]
pub struct DeadLetterConfig {
    /// Retries allowed before an entry expires.
    pub max_retries: u32,
    /// Delay before a resubmitted task runs.
    pub retry_delay: Duration,
    /// Age at which the sweep deletes an entry.
    pub expiry_days: u32,
    /// Upper bound on a resubmission call.
    pub submit_timeout: Duration,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
            expiry_days: 7,
            submit_timeout: Duration::from_secs(10),
        }
    }
}

/// Captures failed task executions and retries them through a broker.
pub struct DeadLetterQueue<B: TaskBroker, S: DeadLetterStore = InMemoryDeadLetterStore> {
    broker: B,
    store: S,
    config: DeadLetterConfig,
    entries: RwLock<HashMap<DeadLetterId, EntryHandle>>,
}

impl<B: TaskBroker> DeadLetterQueue<B> {
    /// Creates an empty queue backed by a private in-memory store.
    pub fn new(broker: B, config: DeadLetterConfig) -> Self {
        Self::with_store(broker, InMemoryDeadLetterStore::new(), config)
    }
}

impl<B: TaskBroker, S: DeadLetterStore> DeadLetterQueue<B, S> {
    /// Creates an empty queue over `store`. Call [`restore`](Self::restore)
    /// to pick up entries already in the store.
    pub fn with_store(broker: B, store: S, config: DeadLetterConfig) -> Self {
        Self {
            broker,
            store,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the broker used for resubmission.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn handle(&self, id: DeadLetterId) -> Option<EntryHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn handles(&self) -> Vec<(DeadLetterId, EntryHandle)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect()
    }

    fn contains(&self, id: DeadLetterId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn insert(&self, entry: DeadLetterEntry, revision: Option<u64>) -> DeadLetterId {
        let id = entry.id;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(Slot { entry, revision })));
        id
    }

    fn detach(&self, id: DeadLetterId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Records a failed task as a new `pending` entry and returns its id.
    ///
    /// Always succeeds. If the store rejects the entry it is held in this
    /// process and written again on its next change.
    pub async fn add(
        &self,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        args: Vec<JsonValue>,
        kwargs: Map<String, JsonValue>,
        exception: impl Into<String>,
        traceback: impl Into<String>,
    ) -> DeadLetterId {
        let entry = DeadLetterEntry::from_failure(TaskFailure::new(
            task_id, task_name, args, kwargs, exception, traceback,
        ));
        let revision = match self.store.save(&entry, None).await {
            Ok(revision) => Some(revision),
            Err(e) => {
                error!(dead_letter_id = %entry.id, error = %e, "dead letter not persisted, holding it in memory");
                None
            }
        };
        self.admit(entry, revision)
    }

    /// Records a failure signal from a worker as a new `pending` entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be written to the store; the
    /// signal should then be redelivered.
    pub async fn record_failure(
        &self,
        failure: TaskFailure,
    ) -> Result<DeadLetterId, Report<DeadLetterError>> {
        let entry = DeadLetterEntry::from_failure(failure);
        let revision = self
            .store
            .save(&entry, None)
            .await
            .map_err(|e| persist_error(&e))?;
        Ok(self.admit(entry, Some(revision)))
    }

    fn admit(&self, entry: DeadLetterEntry, revision: Option<u64>) -> DeadLetterId {
        warn!(
            dead_letter_id = %entry.id,
            task_id = %entry.task_id,
            task_name = %entry.task_name,
            exception = %entry.exception,
            "task added to dead letter queue"
        );
        self.insert(entry, revision)
    }

    /// Restores a previously exported entry, keeping its id, counters and
    /// timestamps. Replaces an entry with the same id, here and in the store.
    pub async fn import(&self, entry: DeadLetterEntry) -> DeadLetterId {
        debug!(dead_letter_id = %entry.id, status = %entry.status, "dead letter imported");
        let revision = match self.store.save(&entry, None).await {
            Ok(revision) => Some(revision),
            Err(e) => {
                error!(dead_letter_id = %entry.id, error = %e, "imported dead letter not persisted");
                None
            }
        };
        self.insert(entry, revision)
    }

    /// Loads every entry held by the store into this process, replacing
    /// local copies. Returns the number loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<usize, Report<DeadLetterError>> {
        let stored = self.store.load_all().await.map_err(|e| persist_error(&e))?;
        let count = stored.len();
        for StoredEntry { entry, revision } in stored {
            self.insert(entry, Some(revision));
        }
        info!(count, "dead letters restored");
        Ok(count)
    }

    /// Writes the slot through to the store.
    ///
    /// Returns false if another process changed the entry first; the slot
    /// then holds the stored copy, or the entry is dropped if it was deleted.
    /// Other store failures are logged and leave the change in memory.
    async fn write_through(&self, id: DeadLetterId, slot: &mut Slot) -> bool {
        match self.store.save(&slot.entry, slot.revision).await {
            Ok(revision) => {
                slot.revision = Some(revision);
                true
            }
            Err(e) if matches!(e.current_context(), DeadLetterStoreError::Conflict { .. }) => {
                warn!("dead letter changed by another coordinator, reloading");
                self.reload(id, slot).await;
                false
            }
            Err(e) => {
                error!(error = %e, "failed to persist dead letter");
                true
            }
        }
    }

    async fn reload(&self, id: DeadLetterId, slot: &mut Slot) {
        match self.store.load(id).await {
            Ok(Some(stored)) => {
                slot.entry = stored.entry;
                slot.revision = Some(stored.revision);
            }
            Ok(None) => {
                self.detach(id);
            }
            Err(e) => error!(error = %e, "failed to reload dead letter"),
        }
    }

    /// Resubmits the task of entry `id` through the broker.
    ///
    /// Returns false if the entry is unknown or terminal, if it has used up
    /// its retries (it becomes `expired`), if another coordinator changed it
    /// first, or if the resubmission fails. A failed resubmission puts the
    /// entry back to `pending`.
    #[instrument(skip(self, id), fields(dead_letter_id = %id))]
    pub async fn retry(&self, id: DeadLetterId) -> bool {
        let Some(handle) = self.handle(id) else {
            debug!("retry of unknown dead letter");
            return false;
        };
        let mut slot = handle.lock().await;
        if !self.contains(id) || slot.entry.status.is_terminal() {
            return false;
        }

        if slot.entry.retry_count >= self.config.max_retries {
            slot.entry.status = DeadLetterStatus::Expired;
            if self.write_through(id, &mut slot).await {
                warn!(
                    task_name = %slot.entry.task_name,
                    retry_count = slot.entry.retry_count,
                    "dead letter exhausted its retries"
                );
            }
            return false;
        }

        slot.entry.status = DeadLetterStatus::Retrying;
        slot.entry.retry_count += 1;
        slot.entry.last_retry_at = Some(Utc::now());
        if !self.write_through(id, &mut slot).await {
            return false;
        }

        match self.resubmit(&slot.entry).await {
            Ok(()) => {
                info!(
                    task_name = %slot.entry.task_name,
                    retry_count = slot.entry.retry_count,
                    "dead letter resubmitted"
                );
                true
            }
            Err(e) => {
                error!(task_name = %slot.entry.task_name, error = %e, "dead letter resubmission failed");
                slot.entry.status = DeadLetterStatus::Pending;
                self.write_through(id, &mut slot).await;
                false
            }
        }
    }

    async fn resubmit(&self, entry: &DeadLetterEntry) -> Result<(), Report<DeadLetterError>> {
        if !self.broker.has_handler(&entry.task_name) {
            return Err(DeadLetterError::UnknownHandler {
                task: entry.task_name.clone(),
            }
            .into());
        }

        let submit = self.broker.submit(
            &entry.task_name,
            &entry.args,
            &entry.kwargs,
            self.config.retry_delay,
        );
        match tokio::time::timeout(self.config.submit_timeout, submit).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DeadLetterError::Submit {
                task: entry.task_name.clone(),
                reason: e.current_context().to_string(),
            }
            .into()),
            Err(_) => Err(DeadLetterError::TimedOut {
                task: entry.task_name.clone(),
                timeout_ms: u64::try_from(self.config.submit_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }
            .into()),
        }
    }

    /// Marks entry `id` as resolved without resubmitting it.
    ///
    /// Returns false if the entry is unknown, already expired, or was changed
    /// by another coordinator first.
    #[instrument(skip(self, id), fields(dead_letter_id = %id))]
    pub async fn resolve(&self, id: DeadLetterId) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };
        let mut slot = handle.lock().await;
        if !self.contains(id) || slot.entry.status == DeadLetterStatus::Expired {
            return false;
        }
        slot.entry.status = DeadLetterStatus::Resolved;
        if !self.write_through(id, &mut slot).await {
            return false;
        }
        info!(task_name = %slot.entry.task_name, "dead letter resolved");
        true
    }

    /// Deletes entry `id` regardless of its status.
    ///
    /// Returns false if the entry is unknown or the store delete fails; the
    /// entry is then kept.
    #[instrument(skip(self, id), fields(dead_letter_id = %id))]
    pub async fn remove(&self, id: DeadLetterId) -> bool {
        let Some(handle) = self.handle(id) else {
            return false;
        };
        let _slot = handle.lock().await;
        if !self.contains(id) {
            return false;
        }
        if let Err(e) = self.store.delete(id).await {
            error!(error = %e, "failed to delete dead letter");
            return false;
        }
        self.detach(id);
        debug!("dead letter removed");
        true
    }

    /// Deletes expired entries and entries older than the expiry age.
    ///
    /// Entries with an operation in flight, and entries the store fails to
    /// delete, are left for the next sweep. Returns the number deleted.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> usize {
        let max_age = TimeDelta::days(i64::from(self.config.expiry_days));
        let now = Utc::now();
        let mut removed = 0;

        for (id, handle) in self.handles() {
            let Ok(slot) = handle.try_lock() else {
                continue;
            };
            let stale = now - slot.entry.created_at >= max_age;
            if !stale && slot.entry.status != DeadLetterStatus::Expired {
                continue;
            }
            if let Err(e) = self.store.delete(id).await {
                warn!(dead_letter_id = %id, error = %e, "failed to delete expired dead letter");
                continue;
            }
            if self.detach(id) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "expired dead letters cleaned up");
        }
        removed
    }

    /// Returns a copy of entry `id`.
    pub async fn get(&self, id: DeadLetterId) -> Option<DeadLetterEntry> {
        let handle = self.handle(id)?;
        let slot = handle.lock().await;
        Some(slot.entry.clone())
    }

    /// Returns copies of all entries, optionally only those with `status`,
    /// oldest first.
    pub async fn list(&self, status: Option<DeadLetterStatus>) -> Vec<DeadLetterEntry> {
        let mut entries = Vec::new();
        for (_, handle) in self.handles() {
            let slot = handle.lock().await;
            if status.is_none_or(|s| slot.entry.status == s) {
                entries.push(slot.entry.clone());
            }
        }
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Returns every entry in the persisted record shape.
    pub async fn export(&self) -> Vec<JsonValue> {
        let mut records = Vec::new();
        for entry in self.list(None).await {
            match serde_json::to_value(&entry) {
                Ok(record) => records.push(record),
                Err(e) => error!(dead_letter_id = %entry.id, error = %e, "failed to export dead letter"),
            }
        }
        records
    }

    /// Counts entries by status and by task name.
    pub async fn get_stats(&self) -> DeadLetterStats {
        DeadLetterStats::tally(&self.list(None).await)
    }
}

fn persist_error(e: &Report<DeadLetterStoreError>) -> Report<DeadLetterError> {
    DeadLetterError::Persist {
        reason: e.current_context().to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::RecordingBroker;
    use serde_json::json;

    const TASK: &str = "send_email";

    fn queue() -> DeadLetterQueue<RecordingBroker> {
        DeadLetterQueue::new(RecordingBroker::with_handlers([TASK]), DeadLetterConfig::default())
    }

    async fn add<S: DeadLetterStore>(
        queue: &DeadLetterQueue<RecordingBroker, S>,
        task_name: &str,
    ) -> DeadLetterId {
        let mut kwargs = Map::new();
        kwargs.insert("to".to_string(), json!("a@example.com"));
        queue
            .add("t-1", task_name, vec![json!(7)], kwargs, "SMTPError: refused", "Traceback ...")
            .await
    }

    async fn aged(queue: &DeadLetterQueue<RecordingBroker>, days: i64) -> DeadLetterId {
        let id = add(queue, TASK).await;
        let mut entry = queue.get(id).await.expect("entry");
        entry.created_at = Utc::now() - TimeDelta::days(days);
        queue.import(entry).await
    }

    #[tokio::test]
    async fn add_creates_pending_entry() {
        let queue = queue();
        let id = add(&queue, TASK).await;

        let entry = queue.get(id).await.expect("entry");
        assert_eq!(entry.status, DeadLetterStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.task_name, TASK);
        assert_eq!(entry.exception, "SMTPError: refused");
    }

    #[tokio::test]
    async fn retry_resubmits_with_original_arguments() {
        let queue = queue();
        let id = add(&queue, TASK).await;

        assert!(queue.retry(id).await);

        let entry = queue.get(id).await.expect("entry");
        assert_eq!(entry.status, DeadLetterStatus::Retrying);
        assert_eq!(entry.retry_count, 1);
        assert!(entry.last_retry_at.is_some());

        let submissions = queue.broker().submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].task_name, TASK);
        assert_eq!(submissions[0].args, vec![json!(7)]);
        assert_eq!(submissions[0].kwargs["to"], "a@example.com");
        assert_eq!(submissions[0].delay, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn retries_exhaust_to_expired() {
        let queue = queue();
        let id = add(&queue, TASK).await;

        for _ in 0..3 {
            assert!(queue.retry(id).await);
        }
        assert!(!queue.retry(id).await);

        let entry = queue.get(id).await.expect("entry");
        assert_eq!(entry.status, DeadLetterStatus::Expired);
        assert_eq!(entry.retry_count, 3);
        assert_eq!(queue.broker().submissions().len(), 3);
        assert!(!queue.retry(id).await);
    }

    #[tokio::test]
    async fn retry_unknown_entry() {
        let queue = queue();
        assert!(!queue.retry(DeadLetterId::new()).await);
    }

    #[tokio::test]
    async fn unknown_handler_reverts_to_pending() {
        let queue = queue();
        let id = add(&queue, "retired_task").await;

        assert!(!queue.retry(id).await);
        let entry = queue.get(id).await.expect("entry");
        assert_eq!(entry.status, DeadLetterStatus::Pending);
        assert!(queue.broker().submissions().is_empty());
    }

    #[tokio::test]
    async fn broker_failure_reverts_to_pending() {
        let queue = queue();
        let id = add(&queue, TASK).await;
        queue.broker().set_failing(true);

        assert!(!queue.retry(id).await);
        let entry = queue.get(id).await.expect("entry");
        assert_eq!(entry.status, DeadLetterStatus::Pending);
        assert_eq!(entry.retry_count, 1);

        queue.broker().set_failing(false);
        assert!(queue.retry(id).await);
    }

    #[tokio::test]
    async fn broker_timeout_reverts_to_pending() {
        let queue = DeadLetterQueue::new(
            RecordingBroker::with_handlers([TASK]),
            DeadLetterConfig {
                submit_timeout: Duration::from_millis(20),
                ..DeadLetterConfig::default()
            },
        );
        queue.broker().set_latency(Duration::from_millis(500));
        let id = add(&queue, TASK).await;

        assert!(!queue.retry(id).await);
        assert_eq!(queue.get(id).await.expect("entry").status, DeadLetterStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_retries_are_serialized() {
        let queue = Arc::new(queue());
        queue.broker().set_latency(Duration::from_millis(20));
        let id = add(queue.as_ref(), TASK).await;

        let attempts: Vec<_> = (0..5)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.retry(id).await })
            })
            .collect();
        let mut succeeded = 0;
        for attempt in attempts {
            if attempt.await.expect("join") {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        let entry = queue.get(id).await.expect("entry");
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.status, DeadLetterStatus::Expired);
    }

    #[tokio::test]
    async fn resolve_and_remove() {
        let queue = queue();
        let resolved = add(&queue, TASK).await;
        let removed = add(&queue, TASK).await;

        assert!(queue.resolve(resolved).await);
        assert_eq!(queue.get(resolved).await.expect("entry").status, DeadLetterStatus::Resolved);
        assert!(!queue.retry(resolved).await);
        assert!(queue.broker().submissions().is_empty());

        assert!(queue.remove(removed).await);
        assert!(queue.get(removed).await.is_none());
        assert!(!queue.remove(removed).await);
        assert!(!queue.resolve(removed).await);
    }

    #[tokio::test]
    async fn cleanup_removes_old_and_expired() {
        let queue = queue();
        let old = aged(&queue, 8).await;
        let recent = aged(&queue, 6).await;
        let expired = add(&queue, TASK).await;
        let mut entry = queue.get(expired).await.expect("entry");
        entry.status = DeadLetterStatus::Expired;
        queue.import(entry).await;

        assert_eq!(queue.cleanup_expired().await, 2);
        assert!(queue.get(old).await.is_none());
        assert!(queue.get(expired).await.is_none());
        assert!(queue.get(recent).await.is_some());
    }

    #[tokio::test]
    async fn stats_count_by_status_and_task() {
        let queue = queue();
        let a = add(&queue, TASK).await;
        add(&queue, TASK).await;
        add(&queue, "poll_trigger").await;
        queue.resolve(a).await;

        let stats = queue.get_stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.status_count(DeadLetterStatus::Pending), 2);
        assert_eq!(stats.status_count(DeadLetterStatus::Resolved), 1);
        assert_eq!(stats.by_task[TASK], 2);
        assert_eq!(stats.by_task["poll_trigger"], 1);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let queue = queue();
        let first = add(&queue, TASK).await;
        let second = add(&queue, TASK).await;
        queue.resolve(second).await;

        let pending = queue.list(Some(DeadLetterStatus::Pending)).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first);
        assert_eq!(queue.list(None).await.len(), 2);
    }

    fn shared(store: &InMemoryDeadLetterStore) -> DeadLetterQueue<RecordingBroker> {
        DeadLetterQueue::with_store(
            RecordingBroker::with_handlers([TASK]),
            store.clone(),
            DeadLetterConfig::default(),
        )
    }

    #[tokio::test]
    async fn entries_survive_a_restart() {
        let store = InMemoryDeadLetterStore::new();
        let before = shared(&store);
        let id = add(&before, TASK).await;
        assert!(before.retry(id).await);
        drop(before);

        let after = shared(&store);
        assert_eq!(after.restore().await.unwrap(), 1);
        let entry = after.get(id).await.expect("restored");
        assert_eq!(entry.status, DeadLetterStatus::Retrying);
        assert_eq!(entry.retry_count, 1);
    }

    #[tokio::test]
    async fn record_failure_reports_store_errors() {
        let store = InMemoryDeadLetterStore::new();
        let queue = shared(&store);
        store.set_failing(true);

        let failure = TaskFailure::new("t-2", TASK, Vec::new(), Map::new(), "boom", "");
        let err = queue.record_failure(failure.clone()).await.unwrap_err();
        assert!(matches!(err.current_context(), DeadLetterError::Persist { .. }));
        assert!(queue.list(None).await.is_empty());

        store.set_failing(false);
        let id = queue.record_failure(failure).await.unwrap();
        assert_eq!(store.load(id).await.unwrap().expect("stored").entry.task_id, "t-2");
    }

    #[tokio::test]
    async fn add_holds_entry_when_store_fails() {
        let store = InMemoryDeadLetterStore::new();
        let queue = shared(&store);
        store.set_failing(true);
        let id = add(&queue, TASK).await;
        assert!(queue.get(id).await.is_some());
        assert!(store.is_empty());

        store.set_failing(false);
        assert!(queue.retry(id).await);
        assert_eq!(store.load(id).await.unwrap().expect("stored").entry.retry_count, 1);
    }

    #[tokio::test]
    async fn coordinators_sharing_a_store_retry_once() {
        let store = InMemoryDeadLetterStore::new();
        let first = shared(&store);
        let id = add(&first, TASK).await;
        let second = shared(&store);
        second.restore().await.unwrap();

        assert!(first.retry(id).await);
        assert!(!second.retry(id).await);
        assert!(second.broker().submissions().is_empty());

        let seen = second.get(id).await.expect("reloaded");
        assert_eq!(seen.retry_count, 1);
        assert_eq!(seen.status, DeadLetterStatus::Retrying);
        assert!(second.retry(id).await);
        assert_eq!(store.load(id).await.unwrap().expect("stored").entry.retry_count, 2);
    }

    #[tokio::test]
    async fn entry_removed_elsewhere_is_dropped() {
        let store = InMemoryDeadLetterStore::new();
        let first = shared(&store);
        let id = add(&first, TASK).await;
        let second = shared(&store);
        second.restore().await.unwrap();

        assert!(first.remove(id).await);
        assert!(!second.resolve(id).await);
        assert!(second.get(id).await.is_none());
    }

    #[tokio::test]
    async fn remove_keeps_entry_when_store_fails() {
        let store = InMemoryDeadLetterStore::new();
        let queue = shared(&store);
        let id = add(&queue, TASK).await;
        store.set_failing(true);

        assert!(!queue.remove(id).await);
        assert!(queue.get(id).await.is_some());
        assert_eq!(queue.cleanup_expired().await, 0);
    }

    #[tokio::test]
    async fn export_round_trips_through_import() {
        let queue = queue();
        let id = add(&queue, TASK).await;
        queue.retry(id).await;

        let records = queue.export().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["task_name"], TASK);
        assert_eq!(records[0]["retry_count"], 1);
        assert_eq!(records[0]["status"], "retrying");

        let restored = DeadLetterQueue::new(RecordingBroker::default(), DeadLetterConfig::default());
        let entry: DeadLetterEntry = serde_json::from_value(records[0].clone()).expect("decode");
        assert_eq!(restored.import(entry).await, id);
        assert_eq!(restored.get(id).await.expect("entry").retry_count, 1);
    }
}
