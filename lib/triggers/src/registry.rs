//! The trigger registry.
//!
//! Maps external events (webhook calls, schedule ticks, polls) to workflow
//! identity. All state lives in the shared [`RegistryStore`] and the
//! [`PeriodicScheduler`], so any coordinator process can answer a lookup.
//!
//! Registration is always unregister-then-register: the previous
//! registrations of a workflow are torn down through its cleanup index
//! (`triggers:{workflow_id}`) before the current node list is scanned.
//! Callers must not register the same workflow concurrently.

use crate::error::{RegistryError, SchedulerError, SourceError, StoreError, TriggerConfigError};
use crate::keys::{
    POLL_TRIGGER_HANDLER, SCHEDULED_WORKFLOW_HANDLER, WEBHOOK_PREFIX, index_key, normalize_path,
    polling_key, polling_task_name, polling_task_prefix, schedule_key, schedule_task_name,
    webhook_key,
};
use crate::kind::{
    PollingTrigger, ScheduleTrigger, TriggerDefaults, TriggerKind, WebhookAuthentication,
    WebhookTrigger,
};
use crate::schedule::{IntervalSchedule, PeriodicTask, ScheduleSpec};
use crate::scheduler::PeriodicScheduler;
use crate::store::RegistryStore;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use switchyard_core::{UserId, WorkflowDefinition, WorkflowId, WorkflowNode};
use tracing::{debug, info, instrument, warn};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on each store or scheduler call.
    pub operation_timeout: Duration,
    /// Defaults applied while parsing trigger nodes.
    pub defaults: TriggerDefaults,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            defaults: TriggerDefaults::default(),
        }
    }
}

/// The record stored at `webhook:{user_id}/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    /// Workflow started by the webhook.
    pub workflow_id: WorkflowId,
    /// Owner of the workflow.
    pub user_id: UserId,
    /// Accepted HTTP method.
    pub method: String,
    /// Authentication scheme.
    pub authentication: WebhookAuthentication,
    /// Secret for the scheme.
    pub auth_key: Option<String>,
}

/// A trigger node that was not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTrigger {
    /// The node declaring the trigger.
    pub node_id: String,
    /// Why it was not registered.
    pub reason: String,
}

/// Outcome of registering one workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    /// Keys whose trigger was fully registered.
    pub registered_keys: Vec<String>,
    /// Trigger nodes skipped for configuration errors.
    pub skipped: Vec<SkippedTrigger>,
    /// Trigger nodes that failed on a store or scheduler error.
    pub failed: Vec<SkippedTrigger>,
}

impl RegistrationSummary {
    /// Returns whether any trigger hit an infrastructure failure.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Outcome of tearing down one workflow's registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnregisterSummary {
    /// Store keys deleted, including the cleanup index.
    pub keys_removed: u32,
    /// Webhook keys left alone because another workflow now owns them.
    pub keys_retained: u32,
    /// Scheduler tasks deleted.
    pub tasks_removed: u32,
    /// Collaborator calls that failed.
    pub failures: u32,
}

/// Result of re-registering every active workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRegistrationReport {
    /// Workflows registered without infrastructure failures.
    pub registered: u32,
    /// Workflows with at least one failed trigger, with the first reason.
    pub failed: Vec<(WorkflowId, String)>,
}

/// Source of active workflow definitions, backed by the workflow data store.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Lists every active workflow.
    async fn active_workflows(&self) -> Result<Vec<WorkflowDefinition>, Report<SourceError>>;
}

/// Registry of webhook, schedule and polling triggers.
pub struct TriggerRegistry<S: RegistryStore, P: PeriodicScheduler> {
    store: S,
    scheduler: P,
    config: RegistryConfig,
}

impl<S: RegistryStore, P: PeriodicScheduler> TriggerRegistry<S, P> {
    /// Creates a registry over the given collaborators.
    pub fn new(store: S, scheduler: P, config: RegistryConfig) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the underlying scheduler.
    pub fn scheduler(&self) -> &P {
        &self.scheduler
    }

    /// Registers every trigger declared by `workflow`, replacing whatever was
    /// registered for it before.
    ///
    /// Never fails as a whole: each trigger's configuration or
    /// infrastructure error is logged and recorded in the summary while the
    /// remaining nodes are still registered. Inactive workflows are only torn
    /// down.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id, owner_id = %workflow.owner_id))]
    pub async fn register(&self, workflow: &WorkflowDefinition) -> RegistrationSummary {
        self.unregister(workflow.id).await;

        let mut summary = RegistrationSummary::default();
        if !workflow.active {
            debug!("workflow inactive, no triggers registered");
            return summary;
        }

        for node in &workflow.nodes {
            let kind = match TriggerKind::from_node(node, &self.config.defaults) {
                Ok(Some(kind)) => kind,
                Ok(None) => continue,
                Err(e) => {
                    log_config_error(node, &e);
                    summary.skipped.push(SkippedTrigger {
                        node_id: node.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let outcome = match &kind {
                TriggerKind::Webhook(hook) => self.register_webhook(workflow, hook).await,
                TriggerKind::Schedule(schedule) => self.register_schedule(workflow, schedule).await,
                TriggerKind::Polling(poll) => self.register_polling(workflow.id, poll).await,
            };

            match outcome {
                Ok(key) => summary.registered_keys.push(key),
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "failed to register trigger, skipping");
                    summary.failed.push(SkippedTrigger {
                        node_id: node.id.clone(),
                        reason: e.current_context().to_string(),
                    });
                }
            }
        }

        info!(
            registered = summary.registered_keys.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "workflow triggers registered"
        );
        summary
    }

    async fn register_webhook(
        &self,
        workflow: &WorkflowDefinition,
        hook: &WebhookTrigger,
    ) -> Result<String, Report<RegistryError>> {
        let key = webhook_key(workflow.owner_id, &hook.path);

        if let Some(previous) = self.read_webhook(&key).await? {
            if previous.workflow_id != workflow.id {
                warn!(
                    key = %key,
                    previous_workflow_id = %previous.workflow_id,
                    "webhook path reassigned to another workflow"
                );
            }
        }

        let record = WebhookRegistration {
            workflow_id: workflow.id,
            user_id: workflow.owner_id,
            method: hook.method.clone(),
            authentication: hook.authentication,
            auth_key: hook.auth_key.clone(),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| RegistryError::CorruptRecord {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        self.index(workflow.id, &key).await?;
        self.store_call("set webhook", self.store.set(&key, bytes))
            .await?;

        debug!(key = %key, method = %hook.method, "webhook registered");
        Ok(key)
    }

    async fn register_schedule(
        &self,
        workflow: &WorkflowDefinition,
        trigger: &ScheduleTrigger,
    ) -> Result<String, Report<RegistryError>> {
        let task = PeriodicTask::new(
            schedule_task_name(workflow.id),
            SCHEDULED_WORKFLOW_HANDLER,
            vec![json!(workflow.id), json!(workflow.owner_id)],
            trigger.schedule.clone(),
        );

        let key = schedule_key(workflow.id);
        self.index(workflow.id, &key).await?;
        self.scheduler_call("upsert schedule", self.scheduler.upsert(task))
            .await?;

        debug!(schedule = %trigger.schedule, "schedule registered");
        Ok(key)
    }

    async fn register_polling(
        &self,
        workflow_id: WorkflowId,
        poll: &PollingTrigger,
    ) -> Result<String, Report<RegistryError>> {
        let task = PeriodicTask::new(
            polling_task_name(workflow_id, &poll.node_id),
            POLL_TRIGGER_HANDLER,
            vec![json!(workflow_id), json!(poll.node_id)],
            ScheduleSpec::Interval(IntervalSchedule::minutes(poll.interval_minutes)),
        );

        let key = polling_key(workflow_id, &poll.node_id);
        self.index(workflow_id, &key).await?;
        self.scheduler_call("upsert polling", self.scheduler.upsert(task))
            .await?;

        debug!(node_id = %poll.node_id, source = ?poll.source, interval_minutes = poll.interval_minutes, "polling registered");
        Ok(key)
    }

    /// Indexed before the live key or task is written, so a failed write
    /// leaves at most a dangling index entry that `unregister` tolerates.
    async fn index(&self, workflow_id: WorkflowId, key: &str) -> Result<(), Report<RegistryError>> {
        self.store_call(
            "add to cleanup index",
            self.store.set_add(&index_key(workflow_id), key),
        )
        .await
    }

    /// Removes every registration of `workflow_id`.
    ///
    /// Deletes the keys listed in the cleanup index, then the index, then the
    /// schedule task and every polling task of the workflow. The scheduler
    /// cleanup runs even when the index is empty, stale or unreadable.
    /// Webhook keys that another workflow has since claimed are retained.
    #[instrument(skip(self))]
    pub async fn unregister(&self, workflow_id: WorkflowId) -> UnregisterSummary {
        let mut summary = UnregisterSummary::default();
        let index = index_key(workflow_id);

        match self
            .store_call("read cleanup index", self.store.set_members(&index))
            .await
        {
            Ok(keys) => {
                for key in keys {
                    if key.starts_with(WEBHOOK_PREFIX) && !self.owns_webhook(&key, workflow_id).await {
                        summary.keys_retained += 1;
                        continue;
                    }
                    match self.store_call("delete key", self.store.delete(&key)).await {
                        Ok(()) => summary.keys_removed += 1,
                        Err(e) => {
                            warn!(key = %key, error = %e, "failed to delete registry key");
                            summary.failures += 1;
                        }
                    }
                }
                match self.store_call("delete cleanup index", self.store.delete(&index)).await {
                    Ok(()) => summary.keys_removed += 1,
                    Err(e) => {
                        warn!(key = %index, error = %e, "failed to delete cleanup index");
                        summary.failures += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read cleanup index");
                summary.failures += 1;
            }
        }

        let schedule_task = schedule_task_name(workflow_id);
        match self
            .scheduler_call("delete schedule", self.scheduler.delete(&schedule_task))
            .await
        {
            Ok(true) => summary.tasks_removed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(task = %schedule_task, error = %e, "failed to delete schedule task");
                summary.failures += 1;
            }
        }

        let prefix = polling_task_prefix(workflow_id);
        match self
            .scheduler_call("list polling", self.scheduler.list_names(&prefix))
            .await
        {
            Ok(names) => {
                for name in names {
                    match self
                        .scheduler_call("delete polling", self.scheduler.delete(&name))
                        .await
                    {
                        Ok(true) => summary.tasks_removed += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(task = %name, error = %e, "failed to delete polling task");
                            summary.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to list polling tasks");
                summary.failures += 1;
            }
        }

        debug!(
            keys_removed = summary.keys_removed,
            tasks_removed = summary.tasks_removed,
            failures = summary.failures,
            "workflow triggers unregistered"
        );
        summary
    }

    /// Looks up the webhook registered by `user_id` at `path`.
    ///
    /// Leading and trailing slashes of `path` are ignored. Returns `None`
    /// when nothing is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, times out, or holds an
    /// undecodable record.
    #[instrument(skip(self))]
    pub async fn lookup(
        &self,
        user_id: UserId,
        path: &str,
    ) -> Result<Option<WebhookRegistration>, Report<RegistryError>> {
        if normalize_path(path).is_empty() {
            return Ok(None);
        }
        self.read_webhook(&webhook_key(user_id, path)).await
    }

    /// Re-registers every active workflow from `source`, one at a time.
    ///
    /// Per-workflow failures are collected in the report instead of aborting
    /// the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source cannot list workflows.
    #[instrument(skip(self, source))]
    pub async fn register_all(
        &self,
        source: &dyn WorkflowSource,
    ) -> Result<BulkRegistrationReport, Report<RegistryError>> {
        let workflows = source
            .active_workflows()
            .await
            .map_err(|e| RegistryError::Source {
                reason: e.current_context().to_string(),
            })?;

        let mut report = BulkRegistrationReport::default();
        for workflow in &workflows {
            let summary = self.register(workflow).await;
            match summary.failed.first() {
                None => report.registered += 1,
                Some(first) => report
                    .failed
                    .push((workflow.id, format!("node {}: {}", first.node_id, first.reason))),
            }
        }

        info!(
            total = workflows.len(),
            registered = report.registered,
            failed = report.failed.len(),
            "re-registered active workflows"
        );
        Ok(report)
    }

    async fn read_webhook(
        &self,
        key: &str,
    ) -> Result<Option<WebhookRegistration>, Report<RegistryError>> {
        let Some(bytes) = self.store_call("get webhook", self.store.get(key)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| RegistryError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// A webhook key belongs to `workflow_id` unless a readable record names
    /// a different workflow.
    async fn owns_webhook(&self, key: &str, workflow_id: WorkflowId) -> bool {
        match self.read_webhook(key).await {
            Ok(Some(record)) => record.workflow_id == workflow_id,
            Ok(None) => true,
            Err(e) => {
                debug!(key = %key, error = %e, "unreadable webhook record, deleting");
                true
            }
        }
    }

    async fn store_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, Report<StoreError>>>,
    ) -> Result<T, Report<RegistryError>> {
        match tokio::time::timeout(self.config.operation_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RegistryError::Store {
                operation: operation.to_string(),
                reason: e.current_context().to_string(),
            }
            .into()),
            Err(_) => Err(self.timed_out(operation)),
        }
    }

    async fn scheduler_call<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, Report<SchedulerError>>>,
    ) -> Result<T, Report<RegistryError>> {
        match tokio::time::timeout(self.config.operation_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RegistryError::Scheduler {
                operation: operation.to_string(),
                reason: e.current_context().to_string(),
            }
            .into()),
            Err(_) => Err(self.timed_out(operation)),
        }
    }

    fn timed_out(&self, operation: &str) -> Report<RegistryError> {
        let timeout_ms = u64::try_from(self.config.operation_timeout.as_millis()).unwrap_or(u64::MAX);
        RegistryError::TimedOut {
            operation: operation.to_string(),
            timeout_ms,
        }
        .into()
    }
}

fn log_config_error(node: &WorkflowNode, error: &TriggerConfigError) {
    match error {
        TriggerConfigError::MissingWebhookPath { .. } => {
            debug!(node_id = %node.id, "webhook trigger without path, skipping");
        }
        _ => {
            warn!(node_id = %node.id, node_type = %node.node_type, error = %error, "invalid trigger configuration, skipping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryRegistryStore, InMemoryScheduler, StaticWorkflowSource};
    use crate::schedule::IntervalUnit;

    type Registry = TriggerRegistry<InMemoryRegistryStore, InMemoryScheduler>;

    fn registry() -> Registry {
        TriggerRegistry::new(
            InMemoryRegistryStore::new(),
            InMemoryScheduler::new(),
            RegistryConfig::default(),
        )
    }

    fn workflow(id: i64, owner: i64, nodes: Vec<WorkflowNode>) -> WorkflowDefinition {
        WorkflowDefinition::new(WorkflowId::new(id), UserId::new(owner), nodes)
    }

    fn full_workflow(id: i64, owner: i64) -> WorkflowDefinition {
        workflow(
            id,
            owner,
            vec![
                WorkflowNode::new("hook", "webhook_trigger", json!({"path": format!("/wf-{id}/")})),
                WorkflowNode::new("tick", "schedule_trigger", json!({"cron": "0 7 * * *", "timezone": "Europe/Berlin"})),
                WorkflowNode::new("feed", "rss_feed_trigger", json!({"url": "https://example.com/rss"})),
                WorkflowNode::new("mail", "email_trigger", json!({"interval_minutes": 5})),
                WorkflowNode::new("step", "http_request", json!({"url": "https://example.com"})),
            ],
        )
    }

    #[tokio::test]
    async fn lookup_unregistered_is_none() {
        let registry = registry();
        assert_eq!(registry.lookup(UserId::new(7), "x").await.unwrap(), None);
        assert_eq!(registry.lookup(UserId::new(7), "/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn webhook_lookup_normalizes_slashes() {
        let registry = registry();
        let wf = workflow(
            1,
            7,
            vec![WorkflowNode::new(
                "n1",
                "webhook_trigger",
                json!({"path": "/x", "authentication": "header", "auth_key": "k"}),
            )],
        );
        let summary = registry.register(&wf).await;
        assert_eq!(summary.registered_keys, vec!["webhook:7/x"]);

        let found = registry
            .lookup(UserId::new(7), "x")
            .await
            .unwrap()
            .expect("registered");
        assert_eq!(found.workflow_id, WorkflowId::new(1));
        assert_eq!(found.user_id, UserId::new(7));
        assert_eq!(found.method, "POST");
        assert_eq!(found.authentication, WebhookAuthentication::Header);
        assert_eq!(found.auth_key.as_deref(), Some("k"));

        assert!(registry.lookup(UserId::new(7), "/x/").await.unwrap().is_some());
        assert!(registry.lookup(UserId::new(8), "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn webhook_record_has_wire_shape() {
        let registry = registry();
        registry
            .register(&workflow(
                4,
                9,
                vec![WorkflowNode::new("n1", "webhook_trigger", json!({"path": "hook"}))],
            ))
            .await;

        let bytes = registry.store().get("webhook:9/hook").await.unwrap().expect("stored");
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({"workflow_id": 4, "user_id": 9, "method": "POST", "authentication": "none", "auth_key": null})
        );
    }

    #[tokio::test]
    async fn register_records_every_kind() {
        let registry = registry();
        let summary = registry.register(&full_workflow(3, 7)).await;

        assert!(summary.failed.is_empty());
        assert!(summary.skipped.is_empty());
        assert_eq!(
            registry.store().set_members("triggers:3").await.unwrap(),
            vec!["polling:3:feed", "polling:3:mail", "schedule:3", "webhook:7/wf-3"]
        );

        let schedule = registry.scheduler().task("workflow-schedule-3").expect("schedule task");
        assert_eq!(schedule.handler, SCHEDULED_WORKFLOW_HANDLER);
        assert_eq!(schedule.args, vec![json!(3), json!(7)]);
        match schedule.schedule {
            ScheduleSpec::Cron(cron) => {
                assert_eq!(cron.expression(), "0 7 * * *");
                assert_eq!(cron.timezone, "Europe/Berlin");
            }
            ScheduleSpec::Interval(_) => panic!("expected cron"),
        }

        let feed = registry.scheduler().task("workflow-polling-3-feed").expect("feed task");
        assert_eq!(feed.handler, POLL_TRIGGER_HANDLER);
        assert_eq!(feed.args, vec![json!(3), json!("feed")]);
        assert_eq!(feed.schedule, ScheduleSpec::Interval(IntervalSchedule::minutes(15)));

        let mail = registry.scheduler().task("workflow-polling-3-mail").expect("mail task");
        assert_eq!(
            mail.schedule,
            ScheduleSpec::Interval(IntervalSchedule {
                every: 5,
                unit: IntervalUnit::Minutes
            })
        );
    }

    #[tokio::test]
    async fn register_twice_is_idempotent() {
        let registry = registry();
        let wf = full_workflow(5, 2);

        registry.register(&wf).await;
        let keys_once = registry.store().keys();
        let tasks_once = registry.scheduler().task_names();

        registry.register(&wf).await;
        assert_eq!(registry.store().keys(), keys_once);
        assert_eq!(registry.scheduler().task_names(), tasks_once);
    }

    #[tokio::test]
    async fn reregister_drops_removed_triggers() {
        let registry = registry();
        registry.register(&full_workflow(6, 1)).await;

        let trimmed = workflow(
            6,
            1,
            vec![WorkflowNode::new("hook", "webhook_trigger", json!({"path": "other"}))],
        );
        registry.register(&trimmed).await;

        assert_eq!(registry.store().keys(), vec!["triggers:6", "webhook:1/other"]);
        assert!(registry.scheduler().task_names().is_empty());
    }

    #[tokio::test]
    async fn unregister_is_isolated() {
        let registry = registry();
        registry.register(&full_workflow(1, 7)).await;
        registry.register(&full_workflow(12, 7)).await;

        let summary = registry.unregister(WorkflowId::new(1)).await;
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.tasks_removed, 3);

        assert!(registry.lookup(UserId::new(7), "wf-1").await.unwrap().is_none());
        assert!(registry.lookup(UserId::new(7), "wf-12").await.unwrap().is_some());
        assert_eq!(
            registry.scheduler().task_names(),
            vec![
                "workflow-polling-12-feed",
                "workflow-polling-12-mail",
                "workflow-schedule-12"
            ]
        );
        assert_eq!(registry.store().set_members("triggers:12").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn unregister_cleans_scheduler_without_index() {
        let registry = registry();
        let schedule = ScheduleSpec::Interval(IntervalSchedule::minutes(15));
        registry.scheduler().insert(PeriodicTask::new(
            "workflow-schedule-8",
            SCHEDULED_WORKFLOW_HANDLER,
            Vec::new(),
            schedule.clone(),
        ));
        registry.scheduler().insert(PeriodicTask::new(
            "workflow-polling-8-orphan",
            POLL_TRIGGER_HANDLER,
            Vec::new(),
            schedule,
        ));

        let summary = registry.unregister(WorkflowId::new(8)).await;
        assert_eq!(summary.tasks_removed, 2);
        assert!(registry.scheduler().task_names().is_empty());
    }

    #[tokio::test]
    async fn reassigned_webhook_survives_previous_owner_teardown() {
        let registry = registry();
        let hook = |id| {
            workflow(
                id,
                7,
                vec![WorkflowNode::new("hook", "webhook_trigger", json!({"path": "shared"}))],
            )
        };
        registry.register(&hook(1)).await;
        registry.register(&hook(2)).await;

        let summary = registry.unregister(WorkflowId::new(1)).await;
        assert_eq!(summary.keys_retained, 1);

        let found = registry.lookup(UserId::new(7), "shared").await.unwrap().expect("kept");
        assert_eq!(found.workflow_id, WorkflowId::new(2));
    }

    #[tokio::test]
    async fn config_errors_skip_only_that_trigger() {
        let registry = registry();
        let wf = workflow(
            9,
            3,
            vec![
                WorkflowNode::new("empty", "webhook_trigger", json!({"path": "/"})),
                WorkflowNode::new("bad-cron", "schedule_trigger", json!({"cron": "* * *"})),
                WorkflowNode::new("hook", "webhook_trigger", json!({"path": "ok"})),
            ],
        );

        let summary = registry.register(&wf).await;
        assert_eq!(summary.registered_keys, vec!["webhook:3/ok"]);
        assert_eq!(summary.skipped.len(), 2);
        assert!(!summary.has_failures());
        assert!(registry.scheduler().task("workflow-schedule-9").is_none());
    }

    #[tokio::test]
    async fn store_failure_does_not_abort_other_triggers() {
        let registry = registry();
        registry.store().fail_writes_with_prefix("webhook:");

        let summary = registry.register(&full_workflow(10, 4)).await;
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].node_id, "hook");
        assert_eq!(summary.registered_keys.len(), 3);
        assert!(registry.scheduler().task("workflow-schedule-10").is_some());
    }

    #[tokio::test]
    async fn index_failure_leaves_no_live_trigger() {
        let registry = registry();
        registry.store().fail_writes_with_prefix("triggers:");

        let summary = registry.register(&full_workflow(1, 7)).await;
        assert!(summary.registered_keys.is_empty());
        assert_eq!(summary.failed.len(), 4);
        assert!(registry.lookup(UserId::new(7), "wf-1").await.unwrap().is_none());
        assert!(registry.scheduler().task_names().is_empty());
    }

    #[tokio::test]
    async fn failed_write_is_still_torn_down() {
        let registry = registry();
        registry.store().fail_writes_with_prefix("webhook:");
        registry.register(&full_workflow(2, 7)).await;
        assert_eq!(registry.store().set_members("triggers:2").await.unwrap().len(), 4);

        let summary = registry.unregister(WorkflowId::new(2)).await;
        assert_eq!(summary.tasks_removed, 3);
        assert!(registry.store().set_members("triggers:2").await.unwrap().is_empty());
        assert!(registry.scheduler().task_names().is_empty());
    }

    #[tokio::test]
    async fn failure_reason_is_the_error_message() {
        let registry = registry();
        registry.store().fail_writes_with_prefix("webhook:");

        let summary = registry.register(&full_workflow(3, 7)).await;
        assert_eq!(
            summary.failed[0].reason,
            "store operation 'set webhook' failed: registry store write of 'webhook:7/wf-3' failed: injected failure"
        );
    }

    #[tokio::test]
    async fn scheduler_failure_does_not_abort_webhooks() {
        let registry = registry();
        registry.scheduler().fail_upserts();

        let summary = registry.register(&full_workflow(11, 4)).await;
        assert_eq!(summary.registered_keys, vec!["webhook:4/wf-11"]);
        assert_eq!(summary.failed.len(), 3);
    }

    #[tokio::test]
    async fn slow_scheduler_times_out_per_trigger() {
        let registry = TriggerRegistry::new(
            InMemoryRegistryStore::new(),
            InMemoryScheduler::new(),
            RegistryConfig {
                operation_timeout: Duration::from_millis(20),
                ..RegistryConfig::default()
            },
        );
        registry.scheduler().set_latency(Duration::from_millis(500));

        let summary = registry.register(&full_workflow(13, 4)).await;
        assert_eq!(summary.registered_keys, vec!["webhook:4/wf-13"]);
        assert_eq!(summary.failed.len(), 3);
        assert!(summary.failed[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn inactive_workflow_is_torn_down() {
        let registry = registry();
        let mut wf = full_workflow(14, 4);
        registry.register(&wf).await;

        wf.active = false;
        let summary = registry.register(&wf).await;
        assert!(summary.registered_keys.is_empty());
        assert!(registry.store().keys().is_empty());
        assert!(registry.scheduler().task_names().is_empty());
    }

    #[tokio::test]
    async fn register_all_reports_failures() {
        let registry = registry();
        registry.store().fail_writes_with_prefix("webhook:5/");

        let mut inactive = full_workflow(3, 1);
        inactive.active = false;
        let source = StaticWorkflowSource::new(vec![
            full_workflow(1, 1),
            full_workflow(2, 5),
            inactive,
        ]);

        let report = registry.register_all(&source).await.unwrap();
        assert_eq!(report.registered, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, WorkflowId::new(2));
        assert!(report.failed[0].1.contains("hook"));
        assert!(registry.scheduler().task("workflow-schedule-3").is_none());
    }
}
