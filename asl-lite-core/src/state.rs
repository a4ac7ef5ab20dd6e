//! The state node model.
//!
//! One `StateNode` per step. The kind-specific payload lives in `StateKind`;
//! transition wiring (`Next`/`End`) is owned by the graph and set during
//! chain assembly, never at construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompileError;
use crate::graph::StateId;
use crate::policy::PolicyStatement;

// ── Transition ──

/// Outgoing transition of a state. `Unset` until chain assembly wires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    Unset,
    Next(String),
    End,
}

// ── Retry / Catch ──

/// Retry policy for a failable state. Appended in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub error_equals: Vec<String>,
    pub interval_seconds: Option<u32>,
    pub max_attempts: Option<u32>,
    pub backoff_rate: Option<f64>,
}

impl RetryPolicy {
    /// Retry on the given error patterns (e.g. `States.ALL`).
    pub fn on<E>(errors: E) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            error_equals: errors.into_iter().map(Into::into).collect(),
            interval_seconds: None,
            max_attempts: None,
            backoff_rate: None,
        }
    }

    pub fn interval_seconds(mut self, seconds: u32) -> Self {
        self.interval_seconds = Some(seconds);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn backoff_rate(mut self, rate: f64) -> Self {
        self.backoff_rate = Some(rate);
        self
    }
}

/// Catch handler routing matched errors to another state by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchHandler {
    pub error_equals: Vec<String>,
    pub next: String,
    pub result_path: Option<String>,
}

impl CatchHandler {
    /// Catch the given error patterns and continue at `next`.
    pub fn on<E>(errors: E, next: impl Into<String>) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            error_equals: errors.into_iter().map(Into::into).collect(),
            next: next.into(),
            result_path: None,
        }
    }

    pub fn result_path(mut self, path: impl Into<String>) -> Self {
        self.result_path = Some(path.into());
        self
    }
}

// ── Choice conditions ──

/// Condition tree evaluated by a Choice state against the execution input.
///
/// Leaf comparisons read a JSONPath `variable`; `And`/`Or`/`Not` combine.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    StringEquals { variable: String, value: String },
    NumericEquals { variable: String, value: i64 },
    NumericLessThan { variable: String, value: i64 },
    NumericGreaterThan { variable: String, value: i64 },
    BooleanEquals { variable: String, value: bool },
    TimestampGreaterThan { variable: String, value: String },
    IsPresent { variable: String, value: bool },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

/// One conditional transition of a Choice state, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRule {
    pub condition: Condition,
    pub next: String,
}

// ── State kind ──

/// Kind-specific payload of a state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateKind {
    Task {
        resource: String,
        timeout_seconds: Option<u32>,
        heartbeat_seconds: Option<u32>,
        statements: Vec<PolicyStatement>,
    },
    Choice {
        choices: Vec<ChoiceRule>,
        default: Option<String>,
    },
    /// Exactly one of the four specifiers must be set; checked at compile.
    Wait {
        seconds: Option<u32>,
        timestamp: Option<String>,
        seconds_path: Option<String>,
        timestamp_path: Option<String>,
    },
    Parallel {
        branches: Vec<StateId>,
    },
    Map {
        iterator: Option<StateId>,
        items_path: Option<String>,
        max_concurrency: Option<u32>,
    },
    Pass {
        result: Option<Value>,
    },
    Succeed,
    Fail {
        error: Option<String>,
        cause: Option<String>,
    },
}

// ── State node ──

/// A single step in the graph: name, kind, data-flow paths and transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct StateNode {
    pub(crate) name: String,
    /// Hierarchical construction path, stamped when added to a graph.
    pub(crate) path: String,
    pub(crate) kind: StateKind,
    pub(crate) transition: Transition,
    pub(crate) retries: Vec<RetryPolicy>,
    pub(crate) catches: Vec<CatchHandler>,
    pub(crate) input_path: Option<String>,
    pub(crate) output_path: Option<String>,
    pub(crate) result_path: Option<String>,
    pub(crate) parameters: Option<Value>,
}

impl StateNode {
    fn new(name: impl Into<String>, kind: StateKind) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            kind,
            transition: Transition::Unset,
            retries: Vec::new(),
            catches: Vec::new(),
            input_path: None,
            output_path: None,
            result_path: None,
            parameters: None,
        }
    }

    /// Task backed by an invokable resource.
    pub fn task(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(
            name,
            StateKind::Task {
                resource: resource.into(),
                timeout_seconds: None,
                heartbeat_seconds: None,
                statements: Vec::new(),
            },
        )
    }

    /// Choice router; add rules with [`when`](Self::when).
    pub fn choice(name: impl Into<String>) -> Self {
        Self::new(
            name,
            StateKind::Choice {
                choices: Vec::new(),
                default: None,
            },
        )
    }

    /// Wait state with no specifier yet; set exactly one `with_wait_*`.
    pub fn wait(name: impl Into<String>) -> Self {
        Self::new(
            name,
            StateKind::Wait {
                seconds: None,
                timestamp: None,
                seconds_path: None,
                timestamp_path: None,
            },
        )
    }

    pub fn parallel(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Parallel { branches: Vec::new() })
    }

    pub fn map(name: impl Into<String>) -> Self {
        Self::new(
            name,
            StateKind::Map {
                iterator: None,
                items_path: None,
                max_concurrency: None,
            },
        )
    }

    pub fn pass(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Pass { result: None })
    }

    pub fn succeed(name: impl Into<String>) -> Self {
        Self::new(name, StateKind::Succeed)
    }

    pub fn fail(name: impl Into<String>) -> Self {
        Self::new(
            name,
            StateKind::Fail {
                error: None,
                cause: None,
            },
        )
    }

    // ── Kind-specific builders ──

    /// Append a permission statement required by this task's resource.
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        if let StateKind::Task { statements, .. } = &mut self.kind {
            statements.push(statement);
        }
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u32) -> Self {
        if let StateKind::Task { timeout_seconds, .. } = &mut self.kind {
            *timeout_seconds = Some(seconds);
        }
        self
    }

    pub fn with_heartbeat_seconds(mut self, seconds: u32) -> Self {
        if let StateKind::Task {
            heartbeat_seconds, ..
        } = &mut self.kind
        {
            *heartbeat_seconds = Some(seconds);
        }
        self
    }

    /// Append a conditional transition to a Choice state, in order.
    pub fn when(mut self, condition: Condition, next: impl Into<String>) -> Self {
        if let StateKind::Choice { choices, .. } = &mut self.kind {
            choices.push(ChoiceRule {
                condition,
                next: next.into(),
            });
        }
        self
    }

    /// Set the default transition of a Choice state.
    pub fn otherwise(mut self, next: impl Into<String>) -> Self {
        if let StateKind::Choice { default, .. } = &mut self.kind {
            *default = Some(next.into());
        }
        self
    }

    pub fn with_wait_seconds(mut self, value: u32) -> Self {
        if let StateKind::Wait { seconds, .. } = &mut self.kind {
            *seconds = Some(value);
        }
        self
    }

    pub fn with_wait_timestamp(mut self, value: impl Into<String>) -> Self {
        if let StateKind::Wait { timestamp, .. } = &mut self.kind {
            *timestamp = Some(value.into());
        }
        self
    }

    pub fn with_wait_seconds_path(mut self, value: impl Into<String>) -> Self {
        if let StateKind::Wait { seconds_path, .. } = &mut self.kind {
            *seconds_path = Some(value.into());
        }
        self
    }

    pub fn with_wait_timestamp_path(mut self, value: impl Into<String>) -> Self {
        if let StateKind::Wait { timestamp_path, .. } = &mut self.kind {
            *timestamp_path = Some(value.into());
        }
        self
    }

    /// Append a branch start to a Parallel state.
    pub fn with_branch(mut self, start: StateId) -> Self {
        if let StateKind::Parallel { branches } = &mut self.kind {
            branches.push(start);
        }
        self
    }

    /// Set the iterator start of a Map state.
    pub fn with_iterator(mut self, start: StateId) -> Self {
        if let StateKind::Map { iterator, .. } = &mut self.kind {
            *iterator = Some(start);
        }
        self
    }

    pub fn with_items_path(mut self, path: impl Into<String>) -> Self {
        if let StateKind::Map { items_path, .. } = &mut self.kind {
            *items_path = Some(path.into());
        }
        self
    }

    pub fn with_max_concurrency(mut self, limit: u32) -> Self {
        if let StateKind::Map {
            max_concurrency, ..
        } = &mut self.kind
        {
            *max_concurrency = Some(limit);
        }
        self
    }

    pub fn with_result(mut self, value: Value) -> Self {
        if let StateKind::Pass { result } = &mut self.kind {
            *result = Some(value);
        }
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        if let StateKind::Fail { error: slot, .. } = &mut self.kind {
            *slot = Some(error.into());
        }
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        if let StateKind::Fail { cause: slot, .. } = &mut self.kind {
            *slot = Some(cause.into());
        }
        self
    }

    // ── Common data-flow paths ──

    pub fn with_input_path(mut self, path: impl Into<String>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_result_path(mut self, path: impl Into<String>) -> Self {
        self.result_path = Some(path.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    // ── Error handling ──

    /// Append a retry policy. Fails on kinds that cannot fail; later calls
    /// append after earlier ones, never replace.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Result<Self, CompileError> {
        if !self.supports_error_handling() {
            return Err(CompileError::RetryNotSupported {
                name: self.name.clone(),
                kind: self.kind_name(),
            });
        }
        self.retries.push(policy);
        Ok(self)
    }

    /// Append a catch handler. Same kind restriction as retries.
    pub fn with_catch(mut self, handler: CatchHandler) -> Result<Self, CompileError> {
        if !self.supports_error_handling() {
            return Err(CompileError::CatchNotSupported {
                name: self.name.clone(),
                kind: self.kind_name(),
            });
        }
        self.catches.push(handler);
        Ok(self)
    }

    // ── Accessors ──

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construction path, e.g. `Payment/ChargeCard`. Equal to the name
    /// until the state is added to a graph scope.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            StateKind::Task { .. } => "Task",
            StateKind::Choice { .. } => "Choice",
            StateKind::Wait { .. } => "Wait",
            StateKind::Parallel { .. } => "Parallel",
            StateKind::Map { .. } => "Map",
            StateKind::Pass { .. } => "Pass",
            StateKind::Succeed => "Succeed",
            StateKind::Fail { .. } => "Fail",
        }
    }

    /// Retry/Catch only make sense on kinds that can fail at runtime.
    pub fn supports_error_handling(&self) -> bool {
        matches!(
            self.kind,
            StateKind::Task { .. } | StateKind::Parallel { .. } | StateKind::Map { .. }
        )
    }

    /// Succeed and Fail terminate without an explicit End marker.
    pub fn is_inherently_terminal(&self) -> bool {
        matches!(self.kind, StateKind::Succeed | StateKind::Fail { .. })
    }
}
