//! The task broker seam.
//!
//! The broker is the subsystem that originally ran a task; the queue resubmits
//! dead letters through it with their original arguments.

use crate::error::BrokerError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Submits tasks for asynchronous execution.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Enqueues `task_name` to run no sooner than `delay` from now.
    async fn submit(
        &self,
        task_name: &str,
        args: &[JsonValue],
        kwargs: &Map<String, JsonValue>,
        delay: Duration,
    ) -> Result<(), Report<BrokerError>>;

    /// Returns true if a handler for `task_name` is deployed.
    fn has_handler(&self, task_name: &str) -> bool;
}

/// A submission accepted by [`RecordingBroker`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub task_name: String,
    pub args: Vec<JsonValue>,
    pub kwargs: Map<String, JsonValue>,
    pub delay: Duration,
}

#[derive(Debug, Default)]
struct RecordingState {
    handlers: BTreeSet<String>,
    submissions: Vec<Submission>,
    failing: bool,
    latency: Option<Duration>,
}

/// In-memory broker that records submissions.
///
/// Clones share state. Submissions can be made to fail or stall to exercise
/// the queue's recovery paths.
#[derive(Debug, Clone, Default)]
pub struct RecordingBroker {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBroker {
    /// Creates a broker with handlers for `task_names`.
    #[must_use]
    pub fn with_handlers<I, S>(task_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let broker = Self::default();
        broker.state().handlers = task_names.into_iter().map(Into::into).collect();
        broker
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes submissions fail, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Delays every submission by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = Some(latency);
    }

    /// Submissions accepted so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }
}

#[async_trait]
impl TaskBroker for RecordingBroker {
    async fn submit(
        &self,
        task_name: &str,
        args: &[JsonValue],
        kwargs: &Map<String, JsonValue>,
        delay: Duration,
    ) -> Result<(), Report<BrokerError>> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.failing {
            return Err(BrokerError::PublishFailed {
                task: task_name.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        state.submissions.push(Submission {
            task_name: task_name.to_string(),
            args: args.to_vec(),
            kwargs: kwargs.clone(),
            delay,
        });
        Ok(())
    }

    fn has_handler(&self, task_name: &str) -> bool {
        self.state().handlers.contains(task_name)
    }
}
