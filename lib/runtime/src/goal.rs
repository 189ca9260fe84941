//! Goal conditions and continuation decisions.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Goal condition holding the minimum number of rows a node must produce.
pub const MIN_ROWS: &str = "min_rows";

/// Goal condition holding the maximum number of recorded errors.
pub const MAX_ERRORS: &str = "max_errors";

/// How a value is compared against a goal threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `value >= threshold`
    AtLeast,
    /// `value <= threshold`
    AtMost,
    /// `value == threshold`
    Equal,
}

impl Comparison {
    /// Infers the comparison from a condition name prefix.
    ///
    /// `min_*` is at-least, `max_*` is at-most, `equals_*` is equality and
    /// anything else is at-least.
    #[must_use]
    pub fn for_condition(name: &str) -> Self {
        if name.starts_with("min_") {
            Self::AtLeast
        } else if name.starts_with("max_") {
            Self::AtMost
        } else if name.starts_with("equals_") {
            Self::Equal
        } else {
            Self::AtLeast
        }
    }

    /// Applies the comparison.
    #[must_use]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::AtLeast => value >= threshold,
            Self::AtMost => value <= threshold,
            Self::Equal => (value - threshold).abs() <= f64::EPSILON,
        }
    }
}

/// Whether a run keeps going after a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GoalDecision {
    Continue,
    Stop { reason: String },
}

impl GoalDecision {
    pub(crate) fn stop(reason: impl Into<String>) -> Self {
        Self::Stop {
            reason: reason.into(),
        }
    }

    /// Returns true if the run continues.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// The decision as `(continue, reason)`; the reason is empty when
    /// continuing.
    #[must_use]
    pub fn into_parts(self) -> (bool, String) {
        match self {
            Self::Continue => (true, String::new()),
            Self::Stop { reason } => (false, reason),
        }
    }
}

impl fmt::Display for GoalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Stop { reason } => write!(f, "stop: {reason}"),
        }
    }
}

/// Reads goal conditions from a JSON object, keeping numeric entries.
///
/// Anything else (strings, nulls, non-finite numbers, a non-object value) is
/// dropped, so a malformed threshold never gates a run.
#[must_use]
pub fn parse_goal_conditions(value: &JsonValue) -> HashMap<String, f64> {
    let Some(map) = value.as_object() else {
        return HashMap::new();
    };

    map.iter()
        .filter_map(|(name, threshold)| match threshold.as_f64() {
            Some(t) if t.is_finite() => Some((name.clone(), t)),
            _ => {
                debug!(condition = %name, value = %threshold, "ignoring non-numeric goal condition");
                None
            }
        })
        .collect()
}

/// JSON truthiness: `false`, `null`, zero, and empty strings, arrays and
/// objects are false.
pub(crate) fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
    }
}
