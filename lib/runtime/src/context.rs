//! Per-execution state.
//!
//! The context has a single owner, the driver of the run, and is mutated
//! without locking. Error and human-in-the-loop logs are append-only.

use crate::goal::{Comparison, GoalDecision, MAX_ERRORS, MIN_ROWS, is_truthy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;
use switchyard_core::ExecutionId;
use tracing::info;

const DEFAULT_STOP_REASON: &str = "Stop condition met";
const SKIP_REMAINING_REASON: &str = "Skipping remaining nodes as requested";

/// A node failure recorded during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub node_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A human-in-the-loop answer recorded during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlDecision {
    pub question: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Serializable view of a context, handed to the execution record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution_id: ExecutionId,
    pub goal: Option<String>,
    pub goal_conditions: HashMap<String, f64>,
    pub current_node: Option<String>,
    pub node_outputs: HashMap<String, JsonValue>,
    pub runtime_variables: HashMap<String, JsonValue>,
    pub errors: Vec<ExecutionError>,
    pub hitl_decisions: Vec<HitlDecision>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// State of one workflow execution.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    execution_id: ExecutionId,
    goal: Option<String>,
    goal_conditions: HashMap<String, f64>,
    current_node: Option<String>,
    latest_node: Option<String>,
    node_outputs: HashMap<String, JsonValue>,
    runtime_variables: HashMap<String, JsonValue>,
    errors: Vec<ExecutionError>,
    hitl_decisions: Vec<HitlDecision>,
    started_at: DateTime<Utc>,
}

impl RuntimeContext {
    /// Creates a context for a run with no goal.
    #[must_use]
    pub fn new(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            goal: None,
            goal_conditions: HashMap::new(),
            current_node: None,
            latest_node: None,
            node_outputs: HashMap::new(),
            runtime_variables: HashMap::new(),
            errors: Vec::new(),
            hitl_decisions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Creates a context for a run with a declared goal.
    #[must_use]
    pub fn with_goal(
        execution_id: ExecutionId,
        goal: impl Into<String>,
        goal_conditions: HashMap<String, f64>,
    ) -> Self {
        Self {
            goal: Some(goal.into()),
            goal_conditions,
            ..Self::new(execution_id)
        }
    }

    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    #[must_use]
    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    #[must_use]
    pub fn goal_conditions(&self) -> &HashMap<String, f64> {
        &self.goal_conditions
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// Marks the node the driver is about to run.
    pub fn set_current_node(&mut self, node_id: impl Into<String>) {
        self.current_node = Some(node_id.into());
    }

    #[must_use]
    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    /// Stores the output of a node, replacing any earlier output of the same
    /// node.
    pub fn record_output(&mut self, node_id: impl Into<String>, output: JsonValue) {
        let node_id = node_id.into();
        self.latest_node = Some(node_id.clone());
        self.node_outputs.insert(node_id, output);
    }

    #[must_use]
    pub fn output(&self, node_id: &str) -> Option<&JsonValue> {
        self.node_outputs.get(node_id)
    }

    /// The output recorded most recently, with its node id.
    #[must_use]
    pub fn latest_output(&self) -> Option<(&str, &JsonValue)> {
        let node_id = self.latest_node.as_deref()?;
        self.node_outputs.get(node_id).map(|output| (node_id, output))
    }

    /// Appends a node failure stamped with the current time.
    pub fn record_error(&mut self, node_id: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ExecutionError {
            node_id: node_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    #[must_use]
    pub fn errors(&self) -> &[ExecutionError] {
        &self.errors
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Appends a human-in-the-loop answer stamped with the current time.
    pub fn record_hitl_decision(&mut self, question: impl Into<String>, response: impl Into<String>) {
        self.hitl_decisions.push(HitlDecision {
            question: question.into(),
            response: response.into(),
            timestamp: Utc::now(),
        });
    }

    #[must_use]
    pub fn hitl_decisions(&self) -> &[HitlDecision] {
        &self.hitl_decisions
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: JsonValue) {
        self.runtime_variables.insert(name.into(), value);
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&JsonValue> {
        self.runtime_variables.get(name)
    }

    /// Checks `value` against the goal condition `name`.
    ///
    /// Conditions that are not declared always pass. The comparison is
    /// inferred from the name's prefix (see [`Comparison::for_condition`]).
    #[must_use]
    pub fn check_goal_condition(&self, name: &str, value: f64) -> bool {
        match self.goal_conditions.get(name) {
            Some(&threshold) if threshold.is_finite() => {
                Comparison::for_condition(name).holds(value, threshold)
            }
            _ => true,
        }
    }

    /// Decides whether the run continues after a node produced `output`.
    ///
    /// Checks run in order, first stop wins:
    ///
    /// 1. `min_rows`: an array output shorter than the threshold stops
    /// 2. `max_errors`: more recorded errors than the threshold stops
    /// 3. an object output with a truthy `should_stop` stops, citing
    ///    `stop_reason`
    /// 4. an object output with a truthy `skip_remaining` stops
    ///
    /// Outputs or thresholds of an unexpected shape pass the check they feed.
    #[must_use]
    pub fn should_continue_for_goal(&self, output: &JsonValue) -> GoalDecision {
        let decision = self.evaluate_goal(output);
        if let GoalDecision::Stop { reason } = &decision {
            info!(execution_id = %self.execution_id, reason = %reason, "goal evaluation stopped run");
        }
        decision
    }

    fn evaluate_goal(&self, output: &JsonValue) -> GoalDecision {
        if let (Some(&min_rows), Some(rows)) = (self.goal_conditions.get(MIN_ROWS), output.as_array())
        {
            #[allow(clippy::cast_precision_loss)]
            let count = rows.len() as f64;
            if min_rows.is_finite() && !self.check_goal_condition(MIN_ROWS, count) {
                return GoalDecision::stop(format!(
                    "Output has {} rows, minimum is {min_rows}",
                    rows.len()
                ));
            }
        }

        if let Some(&max_errors) = self.goal_conditions.get(MAX_ERRORS) {
            #[allow(clippy::cast_precision_loss)]
            let count = self.errors.len() as f64;
            if max_errors.is_finite() && count > max_errors {
                return GoalDecision::stop(format!(
                    "Error count {} exceeds maximum of {max_errors}",
                    self.errors.len()
                ));
            }
        }

        if let Some(fields) = output.as_object() {
            if fields.get("should_stop").is_some_and(is_truthy) {
                let reason = fields
                    .get("stop_reason")
                    .and_then(JsonValue::as_str)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_STOP_REASON);
                return GoalDecision::stop(reason);
            }
            if fields.get("skip_remaining").is_some_and(is_truthy) {
                return GoalDecision::stop(SKIP_REMAINING_REASON);
            }
        }

        GoalDecision::Continue
    }

    /// Captures the current state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            execution_id: self.execution_id,
            goal: self.goal.clone(),
            goal_conditions: self.goal_conditions.clone(),
            current_node: self.current_node.clone(),
            node_outputs: self.node_outputs.clone(),
            runtime_variables: self.runtime_variables.clone(),
            errors: self.errors.clone(),
            hitl_decisions: self.hitl_decisions.clone(),
            started_at: self.started_at,
            elapsed_ms: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
