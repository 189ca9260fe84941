//! The dead letter store seam.
//!
//! Entries are written through to a store shared by every coordinator so
//! they survive restarts. Each write carries the revision it was based on,
//! which keeps two processes from acting on the same entry at once.

use crate::entry::DeadLetterEntry;
use crate::error::DeadLetterStoreError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchyard_core::DeadLetterId;

/// A stored entry and the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub entry: DeadLetterEntry,
    pub revision: u64,
}

/// Durable storage for dead letters.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Writes `entry` and returns its new revision.
    ///
    /// With `expected` set the write only succeeds if the stored revision
    /// still matches; otherwise it fails with
    /// [`DeadLetterStoreError::Conflict`]. Without it the write is
    /// unconditional.
    async fn save(
        &self,
        entry: &DeadLetterEntry,
        expected: Option<u64>,
    ) -> Result<u64, Report<DeadLetterStoreError>>;

    /// Reads entry `id`.
    async fn load(
        &self,
        id: DeadLetterId,
    ) -> Result<Option<StoredEntry>, Report<DeadLetterStoreError>>;

    /// Deletes entry `id`. Deleting a missing entry succeeds.
    async fn delete(&self, id: DeadLetterId) -> Result<(), Report<DeadLetterStoreError>>;

    /// Reads every stored entry.
    async fn load_all(&self) -> Result<Vec<StoredEntry>, Report<DeadLetterStoreError>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<DeadLetterId, StoredEntry>,
    last_revision: u64,
    failing: bool,
}

/// In-memory dead letter store.
///
/// Clones share state, so two queues built over clones behave like two
/// coordinators sharing one bucket. Writes can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDeadLetterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every write and delete fail while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(state: &MemoryState, id: DeadLetterId) -> Result<(), Report<DeadLetterStoreError>> {
        if state.failing {
            return Err(DeadLetterStoreError::WriteFailed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn save(
        &self,
        entry: &DeadLetterEntry,
        expected: Option<u64>,
    ) -> Result<u64, Report<DeadLetterStoreError>> {
        let mut state = self.state();
        Self::check_writable(&state, entry.id)?;

        if let Some(expected) = expected {
            let current = state.entries.get(&entry.id).map(|stored| stored.revision);
            if current != Some(expected) {
                return Err(DeadLetterStoreError::Conflict {
                    id: entry.id.to_string(),
                }
                .into());
            }
        }

        state.last_revision += 1;
        let revision = state.last_revision;
        state.entries.insert(
            entry.id,
            StoredEntry {
                entry: entry.clone(),
                revision,
            },
        );
        Ok(revision)
    }

    async fn load(
        &self,
        id: DeadLetterId,
    ) -> Result<Option<StoredEntry>, Report<DeadLetterStoreError>> {
        Ok(self.state().entries.get(&id).cloned())
    }

    async fn delete(&self, id: DeadLetterId) -> Result<(), Report<DeadLetterStoreError>> {
        let mut state = self.state();
        Self::check_writable(&state, id)?;
        state.entries.remove(&id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<StoredEntry>, Report<DeadLetterStoreError>> {
        Ok(self.state().entries.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TaskFailure;
    use serde_json::Map;

    fn entry() -> DeadLetterEntry {
        DeadLetterEntry::from_failure(TaskFailure::new(
            "t-1",
            "send_email",
            Vec::new(),
            Map::new(),
            "boom",
            "",
        ))
    }

    #[tokio::test]
    async fn revisioned_save_detects_concurrent_change() {
        let store = InMemoryDeadLetterStore::new();
        let mut entry = entry();
        let first = store.save(&entry, None).await.unwrap();

        entry.retry_count = 1;
        let second = store.save(&entry, Some(first)).await.unwrap();
        assert!(second > first);

        let stale = store.save(&entry, Some(first)).await.unwrap_err();
        assert!(matches!(stale.current_context(), DeadLetterStoreError::Conflict { .. }));

        let stored = store.load(entry.id).await.unwrap().expect("stored");
        assert_eq!(stored.revision, second);
        assert_eq!(stored.entry.retry_count, 1);
    }

    #[tokio::test]
    async fn revisioned_save_of_deleted_entry_conflicts() {
        let store = InMemoryDeadLetterStore::new();
        let entry = entry();
        let revision = store.save(&entry, None).await.unwrap();
        store.delete(entry.id).await.unwrap();

        assert!(store.save(&entry, Some(revision)).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn injected_failure() {
        let store = InMemoryDeadLetterStore::new();
        store.set_failing(true);
        assert!(store.save(&entry(), None).await.is_err());
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
