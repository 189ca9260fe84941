//! The shared registry store seam.
//!
//! Every coordinator process reads and writes trigger registrations through
//! this trait, so registry correctness never depends on process memory.

use crate::error::StoreError;
use async_trait::async_trait;
use rootcause::prelude::Report;

/// Key/value and set store shared by all processes.
///
/// Scalar keys and set keys live in one namespace; applying a set operation
/// to a scalar key (or the reverse) is an error.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Reads a scalar key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Report<StoreError>>;

    /// Writes a scalar key, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Report<StoreError>>;

    /// Deletes a key of either type. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), Report<StoreError>>;

    /// Atomically adds a member to a set, creating the set if needed.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), Report<StoreError>>;

    /// Atomically removes a member from a set.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Report<StoreError>>;

    /// Lists the members of a set; a missing set is empty.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, Report<StoreError>>;
}
