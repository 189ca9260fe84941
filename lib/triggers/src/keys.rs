//! Registry key schema and scheduler task names.
//!
//! These strings are shared with every process reading the registry, so
//! their exact shape is part of the external interface.

use switchyard_core::{UserId, WorkflowId};

/// Prefix of webhook registration keys.
pub const WEBHOOK_PREFIX: &str = "webhook:";

/// Prefix of schedule registration keys.
pub const SCHEDULE_PREFIX: &str = "schedule:";

/// Prefix of polling registration keys.
pub const POLLING_PREFIX: &str = "polling:";

/// Prefix of per-workflow cleanup index keys.
pub const INDEX_PREFIX: &str = "triggers:";

/// Handler invoked by schedule tasks with `[workflow_id, owner_id]`.
pub const SCHEDULED_WORKFLOW_HANDLER: &str = "execute_scheduled_workflow";

/// Handler invoked by polling tasks with `[workflow_id, node_id]`.
pub const POLL_TRIGGER_HANDLER: &str = "poll_trigger";

/// Trims leading and trailing slashes from a webhook path.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// `webhook:{user_id}/{path}` with the path normalized.
#[must_use]
pub fn webhook_key(user_id: UserId, path: &str) -> String {
    format!("{WEBHOOK_PREFIX}{user_id}/{}", normalize_path(path))
}

/// `schedule:{workflow_id}`.
#[must_use]
pub fn schedule_key(workflow_id: WorkflowId) -> String {
    format!("{SCHEDULE_PREFIX}{workflow_id}")
}

/// `polling:{workflow_id}:{node_id}`.
#[must_use]
pub fn polling_key(workflow_id: WorkflowId, node_id: &str) -> String {
    format!("{POLLING_PREFIX}{workflow_id}:{node_id}")
}

/// `triggers:{workflow_id}`.
#[must_use]
pub fn index_key(workflow_id: WorkflowId) -> String {
    format!("{INDEX_PREFIX}{workflow_id}")
}

/// `workflow-schedule-{workflow_id}`.
#[must_use]
pub fn schedule_task_name(workflow_id: WorkflowId) -> String {
    format!("workflow-schedule-{workflow_id}")
}

/// `workflow-polling-{workflow_id}-`, the prefix shared by all polling tasks
/// of one workflow.
#[must_use]
pub fn polling_task_prefix(workflow_id: WorkflowId) -> String {
    format!("workflow-polling-{workflow_id}-")
}

/// `workflow-polling-{workflow_id}-{node_id}`.
#[must_use]
pub fn polling_task_name(workflow_id: WorkflowId, node_id: &str) -> String {
    format!("{}{node_id}", polling_task_prefix(workflow_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_key_trims_slashes() {
        let user = UserId::new(7);
        assert_eq!(webhook_key(user, "/x"), "webhook:7/x");
        assert_eq!(webhook_key(user, "x/"), "webhook:7/x");
        assert_eq!(webhook_key(user, "//orders/new//"), "webhook:7/orders/new");
    }

    #[test]
    fn workflow_scoped_keys() {
        let wf = WorkflowId::new(12);
        assert_eq!(schedule_key(wf), "schedule:12");
        assert_eq!(polling_key(wf, "rss-1"), "polling:12:rss-1");
        assert_eq!(index_key(wf), "triggers:12");
    }

    #[test]
    fn task_names() {
        let wf = WorkflowId::new(3);
        assert_eq!(schedule_task_name(wf), "workflow-schedule-3");
        assert_eq!(polling_task_name(wf, "mail"), "workflow-polling-3-mail");
        assert!(polling_task_name(wf, "mail").starts_with(&polling_task_prefix(wf)));
    }

    #[test]
    fn polling_prefix_does_not_match_longer_ids() {
        let short = polling_task_prefix(WorkflowId::new(1));
        let other = polling_task_name(WorkflowId::new(12), "n");
        assert!(!other.starts_with(&short));
    }
}
