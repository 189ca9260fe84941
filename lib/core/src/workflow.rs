//! Workflow model as seen by the control plane.
//!
//! The workflow data store owns the full definition. The trigger registry only
//! needs identity, ownership and the node list, so this is the projection the
//! store hands over on save, activation and startup.

use crate::id::{UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single node of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Node identifier, unique within the workflow.
    pub id: String,
    /// Node type name (e.g. `webhook_trigger`, `http_request`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Type-specific configuration as authored.
    #[serde(default)]
    pub config: JsonValue,
}

impl WorkflowNode {
    /// Creates a node.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, config: JsonValue) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config,
        }
    }
}

/// The parts of a workflow definition the control plane acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identity.
    pub id: WorkflowId,
    /// The owning user.
    pub owner_id: UserId,
    /// Whether the workflow is active; inactive workflows hold no triggers.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Nodes in authoring order.
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
}

fn default_active() -> bool {
    true
}

impl WorkflowDefinition {
    /// Creates an active workflow with the given nodes.
    #[must_use]
    pub fn new(id: WorkflowId, owner_id: UserId, nodes: Vec<WorkflowNode>) -> Self {
        Self {
            id,
            owner_id,
            active: true,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn definition_deserializes_with_defaults() {
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "id": 3,
            "owner_id": 7,
            "nodes": [{"id": "n1", "type": "webhook_trigger", "config": {"path": "x"}}]
        }))
        .expect("deserialize");

        assert!(definition.active);
        assert_eq!(definition.id, WorkflowId::new(3));
        assert_eq!(definition.nodes[0].node_type, "webhook_trigger");
    }

    #[test]
    fn node_config_defaults_to_null() {
        let node: WorkflowNode =
            serde_json::from_value(json!({"id": "n1", "type": "noop"})).expect("deserialize");
        assert!(node.config.is_null());
    }
}
