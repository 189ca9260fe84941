//! Strongly-typed ID types for domain entities.
//!
//! Identities minted by switchyard (dead letters, executions) use ULID,
//! providing both uniqueness and temporal ordering. Workflows and users are
//! owned by the external data store, which hands out integer keys; those are
//! wrapped so they cannot be swapped for one another.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid_str = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }
    };
}

/// Macro to generate a wrapper around an integer key issued by the data store.
///
/// These render as the bare number because they appear verbatim in registry
/// keys and scheduler arguments.
macro_rules! define_external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw key.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

define_external_id!(
    /// Identifier of a workflow definition in the data store.
    WorkflowId
);

define_external_id!(
    /// Identifier of the user owning a workflow.
    UserId
);

define_id!(
    /// Unique identifier for a single execution (run) of a workflow.
    ExecutionId,
    "exec"
);

define_id!(
    /// Unique identifier for a dead letter entry.
    DeadLetterId,
    "dlq"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_id_display_format() {
        let id = DeadLetterId::new();
        assert!(id.to_string().starts_with("dlq_"));
    }

    #[test]
    fn parse_with_prefix() {
        let id = ExecutionId::new();
        let parsed: ExecutionId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_without_prefix() {
        let ulid = Ulid::new();
        let id: DeadLetterId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn parse_invalid_ulid() {
        let err = "not_a_ulid".parse::<DeadLetterId>().unwrap_err();
        assert_eq!(err.id_type, "DeadLetterId");
    }

    #[test]
    fn external_ids_render_bare() {
        assert_eq!(WorkflowId::new(42).to_string(), "42");
        assert_eq!(UserId::from(7).to_string(), "7");
    }

    #[test]
    fn external_id_parse() {
        let id: WorkflowId = " 19 ".parse().expect("should parse");
        assert_eq!(id.get(), 19);

        let err = "abc".parse::<UserId>().unwrap_err();
        assert_eq!(err.id_type, "UserId");
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = DeadLetterId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: DeadLetterId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);

        let json = serde_json::to_string(&WorkflowId::new(5)).expect("serialize");
        assert_eq!(json, "5");
    }
}
