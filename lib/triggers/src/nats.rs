//! NATS JetStream key-value collaborators.
//!
//! - `NatsRegistryStore`: the registry store on a KV bucket
//! - `NatsScheduler`: periodic task definitions on a second KV bucket
//!
//! KV keys are restricted to `[-/_=.a-zA-Z0-9]`, while registry keys carry
//! colons and arbitrary webhook paths, so every logical key is base64
//! encoded (URL-safe, unpadded) before it reaches the bucket.

use crate::error::{SchedulerError, StoreError};
use crate::schedule::PeriodicTask;
use crate::scheduler::PeriodicScheduler;
use crate::store::RegistryStore;
use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::TryStreamExt;
use rootcause::prelude::Report;
use std::collections::BTreeSet;
use switchyard_core::Envelope;
use tracing::{debug, instrument};

/// Default bucket for trigger registrations.
pub const REGISTRY_BUCKET: &str = "trigger-registry";

/// Default bucket for periodic task definitions.
pub const TASKS_BUCKET: &str = "periodic-tasks";

/// Attempts at a compare-and-swap set update before giving up.
const MAX_CAS_ATTEMPTS: u32 = 8;

/// Bucket names for the KV collaborators.
#[derive(Debug, Clone, Default)]
pub struct NatsKvConfig {
    /// Registry bucket (defaults to `trigger-registry`).
    pub registry_bucket: Option<String>,
    /// Periodic task bucket (defaults to `periodic-tasks`).
    pub tasks_bucket: Option<String>,
}

impl NatsKvConfig {
    fn registry_bucket(&self) -> &str {
        self.registry_bucket.as_deref().unwrap_or(REGISTRY_BUCKET)
    }

    fn tasks_bucket(&self) -> &str {
        self.tasks_bucket.as_deref().unwrap_or(TASKS_BUCKET)
    }
}

fn encode_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

async fn open_bucket(
    jetstream: &jetstream::Context,
    bucket: &str,
) -> Result<kv::Store, String> {
    jetstream
        .create_key_value(kv::Config {
            bucket: bucket.to_string(),
            history: 1,
            ..Default::default()
        })
        .await
        .map_err(|e| format!("failed to open bucket '{bucket}': {e}"))
}

/// A compare-and-swap write of a set value.
#[derive(Debug, PartialEq, Eq)]
enum SetWrite {
    /// The key has never been written.
    Create(Vec<u8>),
    /// Replace the value last seen at this revision.
    Update(Vec<u8>, u64),
}

impl SetWrite {
    fn plan(members: &BTreeSet<String>, revision: Option<u64>) -> serde_json::Result<Self> {
        let bytes = serde_json::to_vec(members)?;
        Ok(match revision {
            None => Self::Create(bytes),
            Some(revision) => Self::Update(bytes, revision),
        })
    }
}

/// Registry store on a JetStream KV bucket.
pub struct NatsRegistryStore {
    kv: kv::Store,
}

impl NatsRegistryStore {
    /// Opens (creating if needed) the registry bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be created or bound.
    pub async fn new(
        jetstream: &jetstream::Context,
        config: &NatsKvConfig,
    ) -> Result<Self, Report<StoreError>> {
        let kv = open_bucket(jetstream, config.registry_bucket())
            .await
            .map_err(|reason| StoreError::Unavailable { reason })?;
        Ok(Self { kv })
    }

    async fn read_set(
        &self,
        key: &str,
        encoded: &str,
    ) -> Result<(BTreeSet<String>, Option<u64>), Report<StoreError>> {
        let entry = self
            .kv
            .entry(encoded)
            .await
            .map_err(|e| StoreError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        match entry {
            None => Ok((BTreeSet::new(), None)),
            Some(entry) if entry.operation != kv::Operation::Put => {
                Ok((BTreeSet::new(), Some(entry.revision)))
            }
            Some(entry) => {
                let members: BTreeSet<String> = serde_json::from_slice(&entry.value)
                    .map_err(|_| StoreError::WrongType {
                        key: key.to_string(),
                    })?;
                Ok((members, Some(entry.revision)))
            }
        }
    }

    /// Applies `change` to the set at `key` with optimistic concurrency.
    ///
    /// Every write is revision checked, including one that empties the set:
    /// an emptied set is stored as `[]` rather than deleted, so a concurrent
    /// `set_add` cannot be lost.
    async fn mutate_set(
        &self,
        key: &str,
        change: impl Fn(&mut BTreeSet<String>) -> bool + Send + Sync,
    ) -> Result<(), Report<StoreError>> {
        let encoded = encode_key(key);

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (mut members, revision) = self.read_set(key, &encoded).await?;
            if !change(&mut members) {
                return Ok(());
            }

            let write_failed = |reason: String| StoreError::WriteFailed {
                key: key.to_string(),
                reason,
            };

            let write = SetWrite::plan(&members, revision).map_err(|e| write_failed(e.to_string()))?;
            match write {
                SetWrite::Create(bytes) => match self.kv.create(&encoded, bytes.into()).await {
                    Ok(_) => return Ok(()),
                    Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => {}
                    Err(e) => return Err(write_failed(e.to_string()).into()),
                },
                SetWrite::Update(bytes, revision) => {
                    match self.kv.update(&encoded, bytes.into(), revision).await {
                        Ok(_) => return Ok(()),
                        Err(e) if e.kind() == kv::UpdateErrorKind::WrongLastRevision => {}
                        Err(e) => return Err(write_failed(e.to_string()).into()),
                    }
                }
            }
            debug!(key = %key, attempt, "set update conflicted, retrying");
        }

        Err(StoreError::Contended {
            key: key.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        }
        .into())
    }
}

#[async_trait]
impl RegistryStore for NatsRegistryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Report<StoreError>> {
        let value = self
            .kv
            .get(encode_key(key))
            .await
            .map_err(|e| StoreError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Report<StoreError>> {
        self.kv
            .put(encode_key(key), value.into())
            .await
            .map_err(|e| StoreError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Report<StoreError>> {
        self.kv
            .delete(encode_key(key))
            .await
            .map_err(|e| StoreError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_add(&self, key: &str, member: &str) -> Result<(), Report<StoreError>> {
        self.mutate_set(key, |members| members.insert(member.to_string()))
            .await
    }

    #[instrument(skip(self))]
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), Report<StoreError>> {
        self.mutate_set(key, |members| members.remove(member)).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, Report<StoreError>> {
        let (members, _) = self.read_set(key, &encode_key(key)).await?;
        Ok(members.into_iter().collect())
    }
}

/// Periodic task definitions on a JetStream KV bucket.
///
/// The process that fires the tasks watches the same bucket.
pub struct NatsScheduler {
    kv: kv::Store,
}

impl NatsScheduler {
    /// Opens (creating if needed) the task bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be created or bound.
    pub async fn new(
        jetstream: &jetstream::Context,
        config: &NatsKvConfig,
    ) -> Result<Self, Report<SchedulerError>> {
        let kv = open_bucket(jetstream, config.tasks_bucket())
            .await
            .map_err(|reason| SchedulerError::Unavailable { reason })?;
        Ok(Self { kv })
    }
}

#[async_trait]
impl PeriodicScheduler for NatsScheduler {
    #[instrument(skip(self, task), fields(task = %task.name))]
    async fn upsert(&self, task: PeriodicTask) -> Result<(), Report<SchedulerError>> {
        let key = encode_key(&task.name);
        let bytes = Envelope::new(&task)
            .to_json_bytes()
            .map_err(|e| SchedulerError::UpsertFailed {
                task: task.name.clone(),
                reason: format!("failed to serialize task: {e}"),
            })?;

        self.kv
            .put(key, bytes.into())
            .await
            .map_err(|e| SchedulerError::UpsertFailed {
                task: task.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, Report<SchedulerError>> {
        let key = encode_key(name);
        let existed = self
            .kv
            .get(key.as_str())
            .await
            .map_err(|e| SchedulerError::DeleteFailed {
                task: name.to_string(),
                reason: e.to_string(),
            })?
            .is_some();

        if existed {
            self.kv
                .delete(key)
                .await
                .map_err(|e| SchedulerError::DeleteFailed {
                    task: name.to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(existed)
    }

    async fn list_names(&self, prefix: &str) -> Result<Vec<String>, Report<SchedulerError>> {
        let list_failed = |reason: String| SchedulerError::ListFailed { reason };

        let keys: Vec<String> = self
            .kv
            .keys()
            .await
            .map_err(|e| list_failed(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| list_failed(e.to_string()))?;

        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|encoded| decode_key(encoded))
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }
}
