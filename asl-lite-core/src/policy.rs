//! Permission statements and the aggregation pass.
//!
//! Task states carry the statements their backing resource needs at
//! execution time. Aggregation walks the reachable set once and merges
//! statements by exact equality, keeping first-seen order so the caller can
//! attach the result to an execution role verbatim.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::state::{StateKind, StateNode};

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// An access-control record required for a state's resource to be invoked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    /// Allow statement over the given actions and resources.
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    /// Deny statement over the given actions and resources.
    pub fn deny<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Deny,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// Merge every statement contributed by the given states into a minimal
/// first-seen-ordered list. Exact duplicates contribute nothing.
pub(crate) fn aggregate<'a>(states: impl Iterator<Item = &'a StateNode>) -> Vec<PolicyStatement> {
    let mut merged: IndexSet<PolicyStatement> = IndexSet::new();
    for state in states {
        if let StateKind::Task { statements, .. } = &state.kind {
            for statement in statements {
                merged.insert(statement.clone());
            }
        }
    }
    merged.into_iter().collect()
}
