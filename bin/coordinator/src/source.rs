//! Workflow definitions read from a JetStream KV bucket.
//!
//! The workflow data store mirrors each definition into the bucket as an
//! enveloped `WorkflowDefinition` keyed by workflow id.

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use futures::TryStreamExt;
use rootcause::prelude::Report;
use switchyard_core::{Envelope, WorkflowDefinition};
use switchyard_triggers::{SourceError, WorkflowSource};
use tracing::warn;

/// Active workflows listed from a KV bucket.
pub struct NatsWorkflowSource {
    kv: kv::Store,
}

impl NatsWorkflowSource {
    /// Binds to (creating if needed) the workflow bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be created or bound.
    pub async fn new(
        jetstream: &jetstream::Context,
        bucket: &str,
    ) -> Result<Self, Report<SourceError>> {
        let kv = jetstream
            .create_key_value(kv::Config {
                bucket: bucket.to_string(),
                history: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| SourceError::ListFailed {
                reason: format!("failed to open bucket '{bucket}': {e}"),
            })?;
        Ok(Self { kv })
    }
}

/// Decodes one bucket value into a definition.
///
/// # Errors
///
/// Returns an error if the value is not a current-version enveloped
/// definition.
pub fn decode_definition(key: &str, bytes: &[u8]) -> Result<WorkflowDefinition, SourceError> {
    let envelope: Envelope<WorkflowDefinition> =
        Envelope::from_json_bytes(bytes).map_err(|e| SourceError::InvalidDefinition {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
    if !envelope.is_current_version() {
        return Err(SourceError::InvalidDefinition {
            key: key.to_string(),
            reason: format!("unsupported envelope version {}", envelope.version),
        });
    }
    Ok(envelope.into_payload())
}

#[async_trait]
impl WorkflowSource for NatsWorkflowSource {
    async fn active_workflows(&self) -> Result<Vec<WorkflowDefinition>, Report<SourceError>> {
        let list_failed = |reason: String| SourceError::ListFailed { reason };

        let keys: Vec<String> = self
            .kv
            .keys()
            .await
            .map_err(|e| list_failed(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| list_failed(e.to_string()))?;

        let mut workflows = Vec::new();
        for key in keys {
            let Some(bytes) = self
                .kv
                .get(key.as_str())
                .await
                .map_err(|e| list_failed(e.to_string()))?
            else {
                continue;
            };
            match decode_definition(&key, &bytes) {
                Ok(workflow) if workflow.active => workflows.push(workflow),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable workflow definition"),
            }
        }
        Ok(workflows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{UserId, WorkflowId, WorkflowNode};

    #[test]
    fn decodes_enveloped_definition() {
        let workflow = WorkflowDefinition::new(
            WorkflowId::new(3),
            UserId::new(7),
            vec![WorkflowNode::new("n1", "webhook_trigger", serde_json::json!({"path": "x"}))],
        );
        let bytes = Envelope::new(&workflow).to_json_bytes().unwrap();
        assert_eq!(decode_definition("3", &bytes).unwrap(), workflow);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_definition("9", b"{}"),
            Err(SourceError::InvalidDefinition { .. })
        ));
    }
}
