//! Centralized coordinator configuration.
//!
//! Loaded via the `config` crate from `SWITCHYARD__`-prefixed environment
//! variables, e.g. `SWITCHYARD__NATS__URL` or
//! `SWITCHYARD__DEAD_LETTER__MAX_RETRIES`.

use serde::Deserialize;
use std::time::Duration;
use switchyard_dlq::DeadLetterConfig;
use switchyard_dlq::nats::{
    DEAD_LETTER_BUCKET, FAILURE_CONSUMER, FAILURE_SUBJECT, NatsQueueConfig, SUBMIT_SUBJECT_PREFIX,
};
use switchyard_triggers::keys::{POLL_TRIGGER_HANDLER, SCHEDULED_WORKFLOW_HANDLER};
use switchyard_triggers::nats::{NatsKvConfig, REGISTRY_BUCKET, TASKS_BUCKET};
use switchyard_triggers::{RegistryConfig, TriggerDefaults};

/// Coordinator configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct CoordinatorConfig {
    /// NATS connection and naming.
    pub nats: NatsSettings,

    /// Trigger registry settings.
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Dead letter queue settings.
    #[serde(default)]
    pub dead_letter: DeadLetterSettings,
}

/// NATS connection, bucket and subject names.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsSettings {
    /// NATS server URL.
    pub url: String,

    #[serde(default = "default_registry_bucket")]
    pub registry_bucket: String,

    #[serde(default = "default_tasks_bucket")]
    pub tasks_bucket: String,

    /// Bucket the workflow data store mirrors workflow definitions into.
    #[serde(default = "default_workflows_bucket")]
    pub workflows_bucket: String,

    #[serde(default = "default_submit_subject_prefix")]
    pub submit_subject_prefix: String,

    #[serde(default = "default_failure_subject")]
    pub failure_subject: String,

    /// Durable consumer shared by every coordinator for failure signals.
    #[serde(default = "default_failure_consumer")]
    pub failure_consumer: String,

    #[serde(default = "default_dead_letter_bucket")]
    pub dead_letter_bucket: String,

    /// Task names deployed workers can run.
    #[serde(default = "default_handlers")]
    pub handlers: Vec<String>,
}

fn default_registry_bucket() -> String {
    REGISTRY_BUCKET.to_string()
}

fn default_tasks_bucket() -> String {
    TASKS_BUCKET.to_string()
}

fn default_workflows_bucket() -> String {
    "workflows".to_string()
}

fn default_submit_subject_prefix() -> String {
    SUBMIT_SUBJECT_PREFIX.to_string()
}

fn default_failure_subject() -> String {
    FAILURE_SUBJECT.to_string()
}

fn default_failure_consumer() -> String {
    FAILURE_CONSUMER.to_string()
}

fn default_dead_letter_bucket() -> String {
    DEAD_LETTER_BUCKET.to_string()
}

fn default_handlers() -> Vec<String> {
    vec![
        SCHEDULED_WORKFLOW_HANDLER.to_string(),
        POLL_TRIGGER_HANDLER.to_string(),
    ]
}

impl NatsSettings {
    /// KV bucket names for the registry collaborators.
    #[must_use]
    pub fn kv_config(&self) -> NatsKvConfig {
        NatsKvConfig {
            registry_bucket: Some(self.registry_bucket.clone()),
            tasks_bucket: Some(self.tasks_bucket.clone()),
        }
    }

    /// Stream, subject and bucket names for the dead letter collaborators.
    #[must_use]
    pub fn queue_config(&self) -> NatsQueueConfig {
        NatsQueueConfig {
            stream_name: None,
            subject_prefix: Some(self.submit_subject_prefix.clone()),
            failure_subject: Some(self.failure_subject.clone()),
            failure_consumer: Some(self.failure_consumer.clone()),
            dead_letter_bucket: Some(self.dead_letter_bucket.clone()),
        }
    }
}

/// Trigger registry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    /// Bound on each store or scheduler call, in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    #[serde(default = "default_polling_interval_minutes")]
    pub default_polling_interval_minutes: u32,

    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_polling_interval_minutes() -> u32 {
    15
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
            default_polling_interval_minutes: default_polling_interval_minutes(),
            default_timezone: default_timezone(),
        }
    }
}

impl RegistrySettings {
    #[must_use]
    pub fn to_registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            defaults: TriggerDefaults {
                polling_interval_minutes: self.default_polling_interval_minutes,
                timezone: self.default_timezone.clone(),
            },
        }
    }
}

/// Dead letter queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DeadLetterSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before a retried task runs, in seconds.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    #[serde(default = "default_expiry_days")]
    pub expiry_days: u32,

    /// Bound on a resubmission call, in milliseconds.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Interval between expiry sweeps, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    60
}

fn default_expiry_days() -> u32 {
    7
}

fn default_submit_timeout_ms() -> u64 {
    10_000
}

fn default_cleanup_interval_seconds() -> u64 {
    3600
}

impl Default for DeadLetterSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            expiry_days: default_expiry_days(),
            submit_timeout_ms: default_submit_timeout_ms(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl DeadLetterSettings {
    #[must_use]
    pub fn to_dead_letter_config(&self) -> DeadLetterConfig {
        DeadLetterConfig {
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_seconds),
            expiry_days: self.expiry_days,
            submit_timeout: Duration::from_millis(self.submit_timeout_ms),
        }
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl CoordinatorConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix("SWITCHYARD"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                environment
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("nats.handlers"),
            )
            .build()?
            .try_deserialize()
    }
}
