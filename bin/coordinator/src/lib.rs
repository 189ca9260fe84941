//! Coordinator process for switchyard.
//!
//! Hosts the trigger registry and the dead letter queue: re-registers every
//! active workflow at startup, feeds worker failure signals into the queue
//! and sweeps expired dead letters on an interval.

pub mod config;
pub mod failures;
pub mod source;
