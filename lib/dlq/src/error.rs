//! Error types for the dead letter queue.

use std::fmt;

/// Errors from the task broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached.
    Unavailable { reason: String },
    /// The submission could not be encoded.
    Serialization { task: String, reason: String },
    /// The broker rejected or did not acknowledge the submission.
    PublishFailed { task: String, reason: String },
    /// A failure signal could not be decoded.
    InvalidFailureSignal { reason: String },
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "task broker unavailable: {reason}"),
            Self::Serialization { task, reason } => {
                write!(f, "failed to encode submission of '{task}': {reason}")
            }
            Self::PublishFailed { task, reason } => {
                write!(f, "failed to submit '{task}': {reason}")
            }
            Self::InvalidFailureSignal { reason } => {
                write!(f, "invalid task failure signal: {reason}")
            }
        }
    }
}

impl std::error::Error for BrokerError {}

/// Reasons a dead letter could not be resubmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterError {
    /// No handler is deployed for the task name.
    UnknownHandler { task: String },
    /// The broker refused the submission.
    Submit { task: String, reason: String },
    /// The broker did not answer in time.
    TimedOut { task: String, timeout_ms: u64 },
    /// The dead letter store could not be read or written.
    Persist { reason: String },
}

impl fmt::Display for DeadLetterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandler { task } => write!(f, "no handler registered for task '{task}'"),
            Self::Submit { task, reason } => write!(f, "resubmission of '{task}' failed: {reason}"),
            Self::TimedOut { task, timeout_ms } => {
                write!(f, "resubmission of '{task}' timed out after {timeout_ms}ms")
            }
            Self::Persist { reason } => write!(f, "dead letter store failed: {reason}"),
        }
    }
}

impl std::error::Error for DeadLetterError {}

/// Errors from the dead letter store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterStoreError {
    /// The store could not be reached.
    Unavailable { reason: String },
    /// A read failed.
    ReadFailed { reason: String },
    /// A write or delete of entry `id` failed.
    WriteFailed { id: String, reason: String },
    /// Entry `id` changed since it was read.
    Conflict { id: String },
    /// A stored record could not be decoded.
    CorruptRecord { key: String, reason: String },
}

impl fmt::Display for DeadLetterStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "dead letter store unavailable: {reason}"),
            Self::ReadFailed { reason } => write!(f, "dead letter store read failed: {reason}"),
            Self::WriteFailed { id, reason } => {
                write!(f, "dead letter store write of '{id}' failed: {reason}")
            }
            Self::Conflict { id } => write!(f, "dead letter '{id}' was changed concurrently"),
            Self::CorruptRecord { key, reason } => {
                write!(f, "dead letter record '{key}' is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for DeadLetterStoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_error_display() {
        let err = BrokerError::PublishFailed {
            task: "send_email".to_string(),
            reason: "no responders".to_string(),
        };
        assert_eq!(err.to_string(), "failed to submit 'send_email': no responders");
    }

    #[test]
    fn dead_letter_error_display() {
        let err = DeadLetterError::TimedOut {
            task: "send_email".to_string(),
            timeout_ms: 10_000,
        };
        assert!(err.to_string().contains("timed out after 10000ms"));
        assert!(
            DeadLetterError::UnknownHandler {
                task: "gone".to_string()
            }
            .to_string()
            .contains("'gone'")
        );
    }
}
