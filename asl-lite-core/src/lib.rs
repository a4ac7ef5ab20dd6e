//! State-graph compiler for an Amazon States Language subset.
//!
//! This crate compiles fluently-chained state definitions (Task, Choice,
//! Wait, Parallel, Map, Pass, Succeed, Fail) into a validated ASL document
//! plus the permission statements the states' resources require.
//!
//! # Architecture
//!
//! ```text
//! StateNode ──► Chain ──► StateGraph ──► compile()
//!                                           │
//!                                           ├── namespace & reachability validation
//!                                           ├── ASL document rendering
//!                                           ├── permission aggregation
//!                                           └── content-version hashing
//! ```
//!
//! # Key Concepts
//!
//! - **StateNode**: one step with kind-specific fields; transitions are
//!   wired during chain assembly, not at construction
//! - **Chain**: a value `{start, open ends}`, the frontier of unwired
//!   transitions, so branching states converge on later continuations
//! - **StateGraph**: the arena; validates the flattened namespace and
//!   lazily compiles once into a [`CompiledStateMachine`]
//! - **MachineStore**: versioned registry for compiled artifacts
//!
//! # Example
//!
//! ```
//! use asl_lite_core::{Chain, StateGraph, StateNode};
//!
//! let mut g = StateGraph::new("two steps");
//! let a = g.add(StateNode::task("TaskA", "arn:fn:a"));
//! let b = g.add(StateNode::task("TaskB", "arn:fn:b"));
//! Chain::start(&g, a)
//!     .next_state(&mut g, b)
//!     .unwrap()
//!     .end(&mut g)
//!     .unwrap();
//! g.set_start(a);
//!
//! let artifact = g.compile().unwrap();
//! assert_eq!(artifact.document["StartAt"], "TaskA");
//! ```

mod chain;
mod error;
mod export_asl;
mod graph;
mod policy;
mod registry;
mod state;

pub use chain::Chain;
pub use error::CompileError;
pub use graph::{StateGraph, StateId};
pub use policy::{Effect, PolicyStatement};
pub use registry::{
    CompiledStateMachine, MachineRecord, MachineState, MachineStore, MemoryMachineStore,
};
pub use state::{CatchHandler, ChoiceRule, Condition, RetryPolicy, StateKind, StateNode};

/// Error pattern matching every runtime error.
pub const ERRORS_ALL: &str = "States.ALL";

/// Error pattern for task timeouts.
pub const ERRORS_TIMEOUT: &str = "States.Timeout";

/// Error pattern for failures inside the task itself.
pub const ERRORS_TASK_FAILED: &str = "States.TaskFailed";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_patterns_are_states_namespaced() {
        for pattern in [ERRORS_ALL, ERRORS_TIMEOUT, ERRORS_TASK_FAILED] {
            assert!(pattern.starts_with("States."));
        }
    }
}
