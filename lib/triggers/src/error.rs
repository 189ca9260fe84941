//! Error types for the trigger registry.
//!
//! Errors are split along the failure taxonomy the registry logs by:
//! - `TriggerConfigError`: a node's trigger configuration is unusable
//! - `StoreError` / `SchedulerError`: a collaborator failed or is unreachable
//! - `RegistryError`: registry-level wrapper naming the operation that failed
//! - `SourceError`: the active workflow listing could not be produced

use std::fmt;

/// Errors from parsing a node's trigger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerConfigError {
    /// Webhook node has no path once slashes are trimmed.
    MissingWebhookPath { node_id: String },
    /// Cron expression does not have exactly five fields.
    InvalidCronExpression { expression: String, reason: String },
    /// Interval is zero or missing.
    InvalidInterval { node_id: String, reason: String },
    /// A configuration field has the wrong shape.
    InvalidField {
        node_id: String,
        field: String,
        reason: String,
    },
}

impl fmt::Display for TriggerConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingWebhookPath { node_id } => {
                write!(f, "webhook node {node_id} has no path")
            }
            Self::InvalidCronExpression { expression, reason } => {
                write!(f, "invalid cron expression '{expression}': {reason}")
            }
            Self::InvalidInterval { node_id, reason } => {
                write!(f, "invalid interval on node {node_id}: {reason}")
            }
            Self::InvalidField {
                node_id,
                field,
                reason,
            } => {
                write!(f, "invalid field '{field}' on node {node_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for TriggerConfigError {}

/// Errors from the shared registry store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    Unavailable { reason: String },
    /// A read failed.
    ReadFailed { key: String, reason: String },
    /// A write or delete failed.
    WriteFailed { key: String, reason: String },
    /// A set operation was applied to a scalar key or vice versa.
    WrongType { key: String },
    /// Optimistic set update kept losing to concurrent writers.
    Contended { key: String, attempts: u32 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "registry store unavailable: {reason}"),
            Self::ReadFailed { key, reason } => {
                write!(f, "registry store read of '{key}' failed: {reason}")
            }
            Self::WriteFailed { key, reason } => {
                write!(f, "registry store write of '{key}' failed: {reason}")
            }
            Self::WrongType { key } => {
                write!(f, "registry key '{key}' holds a value of the wrong type")
            }
            Self::Contended { key, attempts } => {
                write!(f, "registry key '{key}' still contended after {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the periodic task scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler could not be reached.
    Unavailable { reason: String },
    /// Creating or updating a task failed.
    UpsertFailed { task: String, reason: String },
    /// Deleting a task failed.
    DeleteFailed { task: String, reason: String },
    /// Listing tasks failed.
    ListFailed { reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "scheduler unavailable: {reason}"),
            Self::UpsertFailed { task, reason } => {
                write!(f, "failed to upsert periodic task '{task}': {reason}")
            }
            Self::DeleteFailed { task, reason } => {
                write!(f, "failed to delete periodic task '{task}': {reason}")
            }
            Self::ListFailed { reason } => write!(f, "failed to list periodic tasks: {reason}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Registry-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A store call failed.
    Store { operation: String, reason: String },
    /// A scheduler call failed.
    Scheduler { operation: String, reason: String },
    /// A collaborator call exceeded the operation timeout.
    TimedOut { operation: String, timeout_ms: u64 },
    /// A stored record could not be decoded.
    CorruptRecord { key: String, reason: String },
    /// The workflow source could not list workflows.
    Source { reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store { operation, reason } => {
                write!(f, "store operation '{operation}' failed: {reason}")
            }
            Self::Scheduler { operation, reason } => {
                write!(f, "scheduler operation '{operation}' failed: {reason}")
            }
            Self::TimedOut {
                operation,
                timeout_ms,
            } => {
                write!(f, "operation '{operation}' timed out after {timeout_ms}ms")
            }
            Self::CorruptRecord { key, reason } => {
                write!(f, "record at '{key}' is corrupt: {reason}")
            }
            Self::Source { reason } => write!(f, "workflow source failed: {reason}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors from a workflow source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Listing active workflows failed.
    ListFailed { reason: String },
    /// A stored definition could not be decoded.
    InvalidDefinition { key: String, reason: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListFailed { reason } => write!(f, "failed to list workflows: {reason}"),
            Self::InvalidDefinition { key, reason } => {
                write!(f, "invalid workflow definition at '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = TriggerConfigError::InvalidCronExpression {
            expression: "* * *".to_string(),
            reason: "expected 5 fields, got 3".to_string(),
        };
        assert!(err.to_string().contains("* * *"));
        assert!(err.to_string().contains("5 fields"));
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Contended {
            key: "triggers:4".to_string(),
            attempts: 8,
        };
        assert!(err.to_string().contains("triggers:4"));
        assert!(err.to_string().contains("8 attempts"));
    }

    #[test]
    fn registry_error_display() {
        let err = RegistryError::TimedOut {
            operation: "upsert schedule".to_string(),
            timeout_ms: 5000,
        };
        assert!(err.to_string().contains("timed out after 5000ms"));
    }
}
