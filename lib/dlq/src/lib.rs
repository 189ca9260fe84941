//! Dead letter queue for failed asynchronous tasks.
//!
//! This crate provides:
//!
//! - **Entries**: captured failures with their original arguments, retry
//!   bookkeeping and a four-state lifecycle
//! - **Queue**: add, retry through the broker, resolve, remove, expiry sweep
//!   and statistics, serialized per entry
//! - **Broker**: the `TaskBroker` seam, a recording broker for tests and a
//!   NATS JetStream broker
//! - **Store**: the `DeadLetterStore` seam entries are written through to,
//!   in memory or on a NATS KV bucket

pub mod broker;
pub mod entry;
pub mod error;
pub mod nats;
pub mod queue;
pub mod store;

pub use broker::{RecordingBroker, Submission, TaskBroker};
pub use entry::{DeadLetterEntry, DeadLetterStats, DeadLetterStatus, TaskFailure};
pub use error::{BrokerError, DeadLetterError, DeadLetterStoreError};
pub use queue::{DeadLetterConfig, DeadLetterQueue};
pub use store::{DeadLetterStore, InMemoryDeadLetterStore, StoredEntry};
