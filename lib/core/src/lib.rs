//! Core domain types and utilities for switchyard.
//!
//! This crate provides the identifiers, error alias, wire envelope and the
//! workflow model shared by the trigger registry, the runtime context and the
//! dead letter queue.

pub mod envelope;
pub mod error;
pub mod id;
pub mod workflow;

pub use envelope::Envelope;
pub use error::Result;
pub use id::{DeadLetterId, ExecutionId, ParseIdError, UserId, WorkflowId};
pub use workflow::{WorkflowDefinition, WorkflowNode};
