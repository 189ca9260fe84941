//! Trigger registry for workflow runs.
//!
//! This crate provides:
//!
//! - **Trigger kinds**: typed webhook, schedule and polling configuration
//!   parsed once from workflow nodes
//! - **Registry**: register/unregister/lookup over a shared store, with a
//!   per-workflow cleanup index for all-or-nothing teardown
//! - **Collaborators**: the `RegistryStore` and `PeriodicScheduler` seams,
//!   with in-memory and NATS JetStream KV implementations

pub mod error;
pub mod keys;
pub mod kind;
pub mod memory;
pub mod nats;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod store;

pub use error::{RegistryError, SchedulerError, SourceError, StoreError, TriggerConfigError};
pub use kind::{
    PollingSource, PollingTrigger, ScheduleTrigger, TriggerDefaults, TriggerKind,
    WebhookAuthentication, WebhookTrigger,
};
pub use memory::{InMemoryRegistryStore, InMemoryScheduler, StaticWorkflowSource};
pub use registry::{
    BulkRegistrationReport, RegistrationSummary, RegistryConfig, SkippedTrigger, TriggerRegistry,
    UnregisterSummary, WebhookRegistration, WorkflowSource,
};
pub use schedule::{CronSchedule, IntervalSchedule, IntervalUnit, PeriodicTask, ScheduleSpec};
pub use scheduler::PeriodicScheduler;
pub use store::RegistryStore;
