//! State graph: the arena of defined states, scope-aware construction
//! paths, and the traversal/validation pass that produces the compiled
//! artifact.
//!
//! Validation walks depth-first pre-order from the bound start state so
//! diagnostics are reproducible. Nested Parallel branches and Map iterators
//! are flattened into the same namespace for uniqueness and resolution
//! checks; serialization keeps them self-contained (see `export_asl`).

use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::error::CompileError;
use crate::export_asl;
use crate::policy;
use crate::registry::{content_version, CompiledStateMachine};
use crate::state::{StateKind, StateNode, Transition};

/// Handle to a state in one graph's arena. Only valid for the graph that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) usize);

/// A buildable state machine: arena of states plus graph-level settings.
#[derive(Debug, Clone)]
pub struct StateGraph {
    label: String,
    timeout_seconds: Option<u32>,
    start: Option<StateId>,
    states: Vec<StateNode>,
    scope: Vec<String>,
    compiled: OnceCell<CompiledStateMachine>,
}

impl StateGraph {
    /// New empty graph. `label` is used only in diagnostics and the
    /// document comment.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timeout_seconds: None,
            start: None,
            states: Vec::new(),
            scope: Vec::new(),
            compiled: OnceCell::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Overall execution timeout in whole seconds.
    pub fn set_timeout_seconds(&mut self, seconds: u32) {
        self.timeout_seconds = Some(seconds);
    }

    pub fn timeout_seconds(&self) -> Option<u32> {
        self.timeout_seconds
    }

    /// Bind the state compilation starts from.
    pub fn set_start(&mut self, start: StateId) {
        self.start = Some(start);
    }

    // ── Construction ──

    /// Add a state under the current scope. The name is kept verbatim;
    /// clashes surface at compile time as [`CompileError::DuplicateStateName`].
    pub fn add(&mut self, mut state: StateNode) -> StateId {
        state.path = self.scoped_path(&state.name);
        let id = StateId(self.states.len());
        self.states.push(state);
        id
    }

    /// Add a state, suffixing its name on collision within the current
    /// scope (`Fetch`, `Fetch2`, `Fetch3`, ...).
    pub fn add_unique(&mut self, mut state: StateNode) -> StateId {
        let base = state.name.clone();
        let mut candidate = base.clone();
        let mut n = 2usize;
        while self.path_taken(&self.scoped_path(&candidate)) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        state.name = candidate;
        self.add(state)
    }

    /// Run `f` with `label` pushed onto the construction scope. States
    /// added inside get `label` as a path segment.
    pub fn scoped<T>(&mut self, label: impl Into<String>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.scope.push(label.into());
        let out = f(self);
        self.scope.pop();
        out
    }

    pub fn get(&self, id: StateId) -> Option<&StateNode> {
        self.states.get(id.0)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn scoped_path(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.scope.join("/"), name)
        }
    }

    fn path_taken(&self, path: &str) -> bool {
        self.states.iter().any(|s| s.path == path)
    }

    // ── Wiring (used by Chain) ──

    pub(crate) fn node(&self, id: StateId) -> &StateNode {
        &self.states[id.0]
    }

    /// Point `from` at the state named `to`. For Choice states this sets
    /// the default transition; for everything else, Next.
    pub(crate) fn wire_next(&mut self, from: StateId, to: &str) -> Result<(), CompileError> {
        let state = self
            .states
            .get_mut(from.0)
            .ok_or(CompileError::UnknownState { index: from.0 })?;
        if let StateKind::Choice { default, .. } = &mut state.kind {
            if default.is_some() {
                return Err(CompileError::DoubleWiring {
                    name: state.name.clone(),
                });
            }
            *default = Some(to.to_string());
            return Ok(());
        }
        if state.transition != Transition::Unset || state.is_inherently_terminal() {
            return Err(CompileError::DoubleWiring {
                name: state.name.clone(),
            });
        }
        state.transition = Transition::Next(to.to_string());
        Ok(())
    }

    /// Mark `id` terminal. No-op for Choice (it has no End of its own) and
    /// for Succeed/Fail (inherently terminal).
    pub(crate) fn mark_end(&mut self, id: StateId) -> Result<(), CompileError> {
        let state = self
            .states
            .get_mut(id.0)
            .ok_or(CompileError::UnknownState { index: id.0 })?;
        if matches!(state.kind, StateKind::Choice { .. }) || state.is_inherently_terminal() {
            return Ok(());
        }
        if state.transition != Transition::Unset {
            return Err(CompileError::DoubleWiring {
                name: state.name.clone(),
            });
        }
        state.transition = Transition::End;
        Ok(())
    }

    // ── Compilation ──

    /// Compile the graph. Lazily computed once and cached; repeated calls
    /// return the same artifact without re-traversing.
    pub fn compile(&self) -> Result<&CompiledStateMachine, CompileError> {
        self.compiled.get_or_try_init(|| {
            let start = self.start.ok_or_else(|| CompileError::EmptyStartState {
                label: self.label.clone(),
            })?;
            let index = self.name_index()?;
            let reachable = self.discover(start, &index)?;

            let document = export_asl::render_document(self, start, &index)?;
            let statements =
                policy::aggregate(reachable.values().map(|id| &self.states[id.0]));
            let json = serde_json::to_string(&document)
                .map_err(|e| CompileError::Serialization(e.to_string()))?;
            let document_version = content_version(&json);

            tracing::info!(
                "compiled state machine `{}`: {} reachable states, version {}",
                self.label,
                reachable.len(),
                document_version
            );

            Ok(CompiledStateMachine {
                label: self.label.clone(),
                document,
                json,
                document_version,
                statements,
            })
        })
    }

    /// Name → id over every defined state, failing on the first clash.
    /// Runs over the whole arena: two states sharing a name conflict even
    /// if neither is reachable.
    fn name_index(&self) -> Result<HashMap<String, StateId>, CompileError> {
        let mut index: HashMap<String, StateId> = HashMap::with_capacity(self.states.len());
        for (i, state) in self.states.iter().enumerate() {
            if let Some(prev) = index.get(&state.name) {
                return Err(CompileError::DuplicateStateName {
                    name: state.name.clone(),
                    first: self.states[prev.0].path.clone(),
                    second: state.path.clone(),
                });
            }
            index.insert(state.name.clone(), StateId(i));
        }
        Ok(index)
    }

    /// Depth-first pre-order discovery from `start`, descending into
    /// Parallel branches and Map iterators. Returns the flattened reachable
    /// set in discovery order; resolves every named target on the way.
    fn discover(
        &self,
        start: StateId,
        index: &HashMap<String, StateId>,
    ) -> Result<IndexMap<String, StateId>, CompileError> {
        let mut visited: IndexMap<String, StateId> = IndexMap::new();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            let state = &self.states[id.0];
            if visited.contains_key(&state.name) {
                continue;
            }
            tracing::debug!("discovered state `{}` ({})", state.name, state.kind_name());
            visited.insert(state.name.clone(), id);
            self.validate_state(state)?;

            // Named targets resolve against the whole namespace, so forward
            // references are fine by the time the stack drains.
            let mut pushes: Vec<StateId> = Vec::new();
            for target in self.named_targets(state) {
                let resolved =
                    index
                        .get(target)
                        .copied()
                        .ok_or_else(|| CompileError::UnresolvedTransition {
                            from: state.name.clone(),
                            target: target.to_string(),
                        })?;
                pushes.push(resolved);
            }
            match &state.kind {
                StateKind::Parallel { branches } => pushes.extend(branches.iter().copied()),
                StateKind::Map {
                    iterator: Some(it), ..
                } => pushes.push(*it),
                _ => {}
            }
            // Reverse so the first-declared target is explored first.
            for next in pushes.into_iter().rev() {
                if !visited.contains_key(&self.states[next.0].name) {
                    stack.push(next);
                }
            }
        }

        Ok(visited)
    }

    /// Every transition target this state names: Next, catch targets,
    /// Choice rule targets and default.
    fn named_targets<'a>(&self, state: &'a StateNode) -> Vec<&'a str> {
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
        targets
    }

    /// Per-state structural rules checked during discovery.
    fn validate_state(&self, state: &StateNode) -> Result<(), CompileError> {
        match &state.kind {
            StateKind::Wait {
                seconds,
                timestamp,
                seconds_path,
                timestamp_path,
            } => {
                let found = [
                    seconds.is_some(),
                    timestamp.is_some(),
                    seconds_path.is_some(),
                    timestamp_path.is_some(),
                ]
                .iter()
                .filter(|set| **set)
                .count();
                if found != 1 {
                    return Err(CompileError::InvalidWaitSpecification {
                        name: state.name.clone(),
                        found,
                    });
                }
            }
            StateKind::Choice { choices, .. } => {
                if choices.is_empty() {
                    return Err(CompileError::EmptyChoice {
                        name: state.name.clone(),
                    });
                }
            }
            StateKind::Parallel { branches } => {
                if branches.is_empty() {
                    return Err(CompileError::EmptyParallel {
                        name: state.name.clone(),
                    });
                }
            }
            StateKind::Map { iterator, .. } => {
                if iterator.is_none() {
                    return Err(CompileError::MissingIterator {
                        name: state.name.clone(),
                    });
                }
            }
            _ => {}
        }

        // Exactly one of {Next, terminal} for non-Choice states. Choice
        // delegates through its rules and default instead.
        let exempt = matches!(state.kind, StateKind::Choice { .. }) || state.is_inherently_terminal();
        if !exempt && state.transition == Transition::Unset {
            return Err(CompileError::UnterminatedState {
                name: state.name.clone(),
            });
        }
        Ok(())
    }
}
