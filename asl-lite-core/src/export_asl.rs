//! Rendering the validated graph into the ASL document shape.
//!
//! Each nesting level (the machine itself, every Parallel branch, every Map
//! iterator) is produced by the same routine: walk the level's own states
//! via their named transitions, emit `StartAt` + `States`, and recurse for
//! sub-graphs. Output is canonical (object keys are emitted in sorted
//! order), so the same graph always renders byte-identically.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::error::CompileError;
use crate::graph::{StateGraph, StateId};
use crate::state::{CatchHandler, Condition, RetryPolicy, StateKind, Transition};

/// Render the whole machine: `StartAt` + `States` plus the graph-level
/// envelope (`Comment`, `TimeoutSeconds`).
pub(crate) fn render_document(
    graph: &StateGraph,
    start: StateId,
    index: &HashMap<String, StateId>,
) -> Result<Value, CompileError> {
    let mut doc = render_level(graph, start, index)?;
    let envelope = doc
        .as_object_mut()
        .ok_or_else(|| CompileError::Serialization("document root is not an object".into()))?;
    if !graph.label().is_empty() {
        envelope.insert("Comment".into(), Value::String(graph.label().to_string()));
    }
    if let Some(timeout) = graph.timeout_seconds() {
        envelope.insert("TimeoutSeconds".into(), Value::Number(Number::from(timeout)));
    }
    Ok(doc)
}

/// One nesting level: the states reachable from `start` through named
/// transitions only (branch internals stay inside their own level).
fn render_level(
    graph: &StateGraph,
    start: StateId,
    index: &HashMap<String, StateId>,
) -> Result<Value, CompileError> {
    let local = local_reachable(graph, start, index)?;

    let mut states = Map::new();
    for (name, id) in &local {
        states.insert(name.clone(), render_state(graph, *id, index)?);
    }

    let mut doc = Map::new();
    doc.insert(
        "StartAt".into(),
        Value::String(graph.node(start).name().to_string()),
    );
    doc.insert("States".into(), Value::Object(states));
    Ok(Value::Object(doc))
}

/// Depth-first pre-order walk over one level's named transitions.
fn local_reachable(
    graph: &StateGraph,
    start: StateId,
    index: &HashMap<String, StateId>,
) -> Result<IndexMap<String, StateId>, CompileError> {
    let mut visited: IndexMap<String, StateId> = IndexMap::new();
    let mut stack = vec![start];

    while let Some(id) = stack.pop() {
        let state = graph.node(id);
        if visited.contains_key(state.name()) {
            continue;
        }
        visited.insert(state.name().to_string(), id);

        let mut targets: Vec<&str> = Vec::new();
        if let Transition::Next(next) = &state.transition {
            targets.push(next);
        }
        for catch in &state.catches {
            targets.push(&catch.next);
        }
        if let StateKind::Choice { choices, default } = &state.kind {
            for rule in choices {
                targets.push(&rule.next);
            }
            if let Some(default) = default {
                targets.push(default);
            }
        }

        let mut pushes = Vec::with_capacity(targets.len());
        for target in targets {
            let resolved =
                index
                    .get(target)
                    .copied()
                    .ok_or_else(|| CompileError::UnresolvedTransition {
                        from: state.name().to_string(),
                        target: target.to_string(),
                    })?;
            pushes.push(resolved);
        }
        for next in pushes.into_iter().rev() {
            if !visited.contains_key(graph.node(next).name()) {
                stack.push(next);
            }
        }
    }

    Ok(visited)
}

/// One state's fragment: `Type`, kind-specific fields, data-flow paths,
/// then the transition fields the serializer owns (`Next`/`End`, `Retry`,
/// `Catch`).
fn render_state(
    graph: &StateGraph,
    id: StateId,
    index: &HashMap<String, StateId>,
) -> Result<Value, CompileError> {
    let state = graph.node(id);
    let mut out = Map::new();
    out.insert("Type".into(), Value::String(state.kind_name().to_string()));

    match &state.kind {
        StateKind::Task {
            resource,
            timeout_seconds,
            heartbeat_seconds,
            ..
        } => {
            out.insert("Resource".into(), Value::String(resource.clone()));
            if let Some(timeout) = timeout_seconds {
                out.insert("TimeoutSeconds".into(), Value::Number(Number::from(*timeout)));
            }
            if let Some(heartbeat) = heartbeat_seconds {
                out.insert(
                    "HeartbeatSeconds".into(),
                    Value::Number(Number::from(*heartbeat)),
                );
            }
        }
        StateKind::Choice { choices, default } => {
            let rules: Vec<Value> = choices
                .iter()
                .map(|rule| {
                    let mut obj = render_condition(&rule.condition);
                    if let Some(map) = obj.as_object_mut() {
                        map.insert("Next".into(), Value::String(rule.next.clone()));
                    }
                    obj
                })
                .collect();
            out.insert("Choices".into(), Value::Array(rules));
            if let Some(default) = default {
                out.insert("Default".into(), Value::String(default.clone()));
            }
        }
        StateKind::Wait {
            seconds,
            timestamp,
            seconds_path,
            timestamp_path,
        } => {
            if let Some(seconds) = seconds {
                out.insert("Seconds".into(), Value::Number(Number::from(*seconds)));
            }
            if let Some(timestamp) = timestamp {
                out.insert("Timestamp".into(), Value::String(timestamp.clone()));
            }
            if let Some(path) = seconds_path {
                out.insert("SecondsPath".into(), Value::String(path.clone()));
            }
            if let Some(path) = timestamp_path {
                out.insert("TimestampPath".into(), Value::String(path.clone()));
            }
        }
        StateKind::Parallel { branches } => {
            let rendered: Result<Vec<Value>, CompileError> = branches
                .iter()
                .map(|branch| render_level(graph, *branch, index))
                .collect();
            out.insert("Branches".into(), Value::Array(rendered?));
        }
        StateKind::Map {
            iterator,
            items_path,
            max_concurrency,
        } => {
            if let Some(iterator) = iterator {
                out.insert("Iterator".into(), render_level(graph, *iterator, index)?);
            }
            if let Some(path) = items_path {
                out.insert("ItemsPath".into(), Value::String(path.clone()));
            }
            if let Some(limit) = max_concurrency {
                out.insert("MaxConcurrency".into(), Value::Number(Number::from(*limit)));
            }
        }
        StateKind::Pass { result } => {
            if let Some(result) = result {
                out.insert("Result".into(), result.clone());
            }
        }
        StateKind::Succeed => {}
        StateKind::Fail { error, cause } => {
            if let Some(error) = error {
                out.insert("Error".into(), Value::String(error.clone()));
            }
            if let Some(cause) = cause {
                out.insert("Cause".into(), Value::String(cause.clone()));
            }
        }
    }

    if let Some(path) = &state.input_path {
        out.insert("InputPath".into(), Value::String(path.clone()));
    }
    if let Some(path) = &state.output_path {
        out.insert("OutputPath".into(), Value::String(path.clone()));
    }
    if let Some(path) = &state.result_path {
        out.insert("ResultPath".into(), Value::String(path.clone()));
    }
    if let Some(parameters) = &state.parameters {
        out.insert("Parameters".into(), parameters.clone());
    }

    match &state.transition {
        Transition::Next(next) => {
            out.insert("Next".into(), Value::String(next.clone()));
        }
        Transition::End => {
            out.insert("End".into(), Value::Bool(true));
        }
        Transition::Unset => {}
    }

    if !state.retries.is_empty() {
        let retries: Vec<Value> = state.retries.iter().map(render_retry).collect();
        out.insert("Retry".into(), Value::Array(retries));
    }
    if !state.catches.is_empty() {
        let catches: Vec<Value> = state.catches.iter().map(render_catch).collect();
        out.insert("Catch".into(), Value::Array(catches));
    }

    Ok(Value::Object(out))
}

fn render_retry(policy: &RetryPolicy) -> Value {
    let mut out = Map::new();
    out.insert(
        "ErrorEquals".into(),
        Value::Array(
            policy
                .error_equals
                .iter()
                .map(|e| Value::String(e.clone()))
                .collect(),
        ),
    );
    if let Some(interval) = policy.interval_seconds {
        out.insert("IntervalSeconds".into(), Value::Number(Number::from(interval)));
    }
    if let Some(attempts) = policy.max_attempts {
        out.insert("MaxAttempts".into(), Value::Number(Number::from(attempts)));
    }
    if let Some(rate) = policy.backoff_rate {
        if let Some(number) = Number::from_f64(rate) {
            out.insert("BackoffRate".into(), Value::Number(number));
        }
    }
    Value::Object(out)
}

fn render_catch(handler: &CatchHandler) -> Value {
    let mut out = Map::new();
    out.insert(
        "ErrorEquals".into(),
        Value::Array(
            handler
                .error_equals
                .iter()
                .map(|e| Value::String(e.clone()))
                .collect(),
        ),
    );
    out.insert("Next".into(), Value::String(handler.next.clone()));
    if let Some(path) = &handler.result_path {
        out.insert("ResultPath".into(), Value::String(path.clone()));
    }
    Value::Object(out)
}

fn render_condition(condition: &Condition) -> Value {
    let mut out = Map::new();
    match condition {
        Condition::StringEquals { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert("StringEquals".into(), Value::String(value.clone()));
        }
        Condition::NumericEquals { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert("NumericEquals".into(), Value::Number(Number::from(*value)));
        }
        Condition::NumericLessThan { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert("NumericLessThan".into(), Value::Number(Number::from(*value)));
        }
        Condition::NumericGreaterThan { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert(
                "NumericGreaterThan".into(),
                Value::Number(Number::from(*value)),
            );
        }
        Condition::BooleanEquals { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert("BooleanEquals".into(), Value::Bool(*value));
        }
        Condition::TimestampGreaterThan { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert("TimestampGreaterThan".into(), Value::String(value.clone()));
        }
        Condition::IsPresent { variable, value } => {
            out.insert("Variable".into(), Value::String(variable.clone()));
            out.insert("IsPresent".into(), Value::Bool(*value));
        }
        Condition::And(conditions) => {
            out.insert(
                "And".into(),
                Value::Array(conditions.iter().map(render_condition).collect()),
            );
        }
        Condition::Or(conditions) => {
            out.insert(
                "Or".into(),
                Value::Array(conditions.iter().map(render_condition).collect()),
            );
        }
        Condition::Not(inner) => {
            out.insert("Not".into(), render_condition(inner));
        }
    }
    Value::Object(out)
}
