//! The periodic task scheduler seam.
//!
//! Schedule and polling triggers are durable task definitions owned by the
//! scheduler, not keys in the registry store.

use crate::error::SchedulerError;
use crate::schedule::PeriodicTask;
use async_trait::async_trait;
use rootcause::prelude::Report;

/// Accepts named periodic task definitions.
#[async_trait]
pub trait PeriodicScheduler: Send + Sync {
    /// Creates the task, or replaces the definition with the same name.
    async fn upsert(&self, task: PeriodicTask) -> Result<(), Report<SchedulerError>>;

    /// Deletes a task by name. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Report<SchedulerError>>;

    /// Lists the names of tasks starting with `prefix`.
    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, Report<SchedulerError>>;
}
