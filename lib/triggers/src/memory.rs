//! In-memory collaborators.
//!
//! These back single-process deployments and tests. Clones share state, so a
//! test can hand one clone to the registry and inspect another. Both support
//! injected failures and latency for exercising the registry's error paths.

use crate::error::{SchedulerError, SourceError, StoreError};
use crate::registry::WorkflowSource;
use crate::schedule::PeriodicTask;
use crate::scheduler::PeriodicScheduler;
use crate::store::RegistryStore;
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use switchyard_core::WorkflowDefinition;

#[derive(Debug, Clone)]
enum StoredValue {
    Scalar(Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<String, StoredValue>,
    failing_prefixes: Vec<String>,
    latency: Option<Duration>,
}

/// In-memory registry store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryRegistryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes writes to keys starting with `prefix` fail.
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<String>) {
        self.state().failing_prefixes.push(prefix.into());
    }

    /// Delays every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Returns every key currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state().entries.keys().cloned().collect()
    }

    async fn pause(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_writable(state: &StoreState, key: &str) -> Result<(), Report<StoreError>> {
        if state.failing_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::WriteFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Report<StoreError>> {
        self.pause().await;
        match self.state().entries.get(key) {
            None => Ok(None),
            Some(StoredValue::Scalar(value)) => Ok(Some(value.clone())),
            Some(StoredValue::Set(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
            }
            .into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Report<StoreError>> {
        self.pause().await;
        let mut state = self.state();
        Self::check_writable(&state, key)?;
        state
            .entries
            .insert(key.to_string(), StoredValue::Scalar(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Report<StoreError>> {
        self.pause().await;
        let mut state = self.state();
        Self::check_writable(&state, key)?;
        state.entries.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), Report<StoreError>> {
        self.pause().await;
        let mut state = self.state();
        Self::check_writable(&state, key)?;
        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::Set(BTreeSet::new()));
        match entry {
            StoredValue::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            StoredValue::Scalar(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }
            .into()),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Report<StoreError>> {
        self.pause().await;
        let mut state = self.state();
        Self::check_writable(&state, key)?;
        let now_empty = match state.entries.get_mut(key) {
            None => return Ok(()),
            Some(StoredValue::Set(members)) => {
                members.remove(member);
                members.is_empty()
            }
            Some(StoredValue::Scalar(_)) => {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                }
                .into());
            }
        };
        if now_empty {
            state.entries.remove(key);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, Report<StoreError>> {
        self.pause().await;
        match self.state().entries.get(key) {
            None => Ok(Vec::new()),
            Some(StoredValue::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(StoredValue::Scalar(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    tasks: BTreeMap<String, PeriodicTask>,
    fail_upserts: bool,
    latency: Option<Duration>,
}

/// In-memory periodic scheduler that records task definitions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl InMemoryScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every upsert fail.
    pub fn fail_upserts(&self) {
        self.state().fail_upserts = true;
    }

    /// Delays upserts by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Returns the task with `name`, if defined.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<PeriodicTask> {
        self.state().tasks.get(name).cloned()
    }

    /// Returns every task name, sorted.
    #[must_use]
    pub fn task_names(&self) -> Vec<String> {
        self.state().tasks.keys().cloned().collect()
    }

    /// Inserts a task directly, bypassing failure injection.
    pub fn insert(&self, task: PeriodicTask) {
        self.state().tasks.insert(task.name.clone(), task);
    }
}

#[async_trait]
impl PeriodicScheduler for InMemoryScheduler {
    async fn upsert(&self, task: PeriodicTask) -> Result<(), Report<SchedulerError>> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.fail_upserts {
            return Err(SchedulerError::UpsertFailed {
                task: task.name,
                reason: "injected failure".to_string(),
            }
            .into());
        }
        state.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, Report<SchedulerError>> {
        Ok(self.state().tasks.remove(name).is_some())
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, Report<SchedulerError>> {
        Ok(self
            .state()
            .tasks
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// A fixed list of workflow definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkflowSource {
    workflows: Vec<WorkflowDefinition>,
}

impl StaticWorkflowSource {
    /// Creates a source over `workflows`.
    #[must_use]
    pub fn new(workflows: Vec<WorkflowDefinition>) -> Self {
        Self { workflows }
    }
}

#[async_trait]
impl WorkflowSource for StaticWorkflowSource {
    async fn active_workflows(&self) -> Result<Vec<WorkflowDefinition>, Report<SourceError>> {
        Ok(self.workflows.iter().filter(|w| w.active).cloned().collect())
    }
}
