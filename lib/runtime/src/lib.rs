//! Runtime execution context for workflow runs.
//!
//! One `RuntimeContext` exists per execution and is owned by the driver
//! running it. After each node completes the driver records the output and
//! asks the context whether the run should continue toward its goal.

pub mod context;
pub mod goal;

pub use context::{ExecutionError, ExecutionSnapshot, HitlDecision, RuntimeContext};
pub use goal::{Comparison, GoalDecision, parse_goal_conditions};
