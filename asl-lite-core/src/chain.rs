//! Chains: fluent linear assembly over a frontier of open ends.
//!
//! A chain is a value `{start, open ends}` rather than a cursor into shared
//! structure. Linking two chains wires every open end of the first to the
//! start of the second and hands back the second's frontier, so branching
//! states can contribute several open ends that converge on one
//! continuation later.

use crate::error::CompileError;
use crate::graph::{StateGraph, StateId};

/// A contiguous sequence of states with a start and the set of states
/// whose outgoing transition is still unset.
#[derive(Debug, Clone)]
pub struct Chain {
    start: StateId,
    open: Vec<StateId>,
}

impl Chain {
    /// Chain of one state. Succeed/Fail start out closed; everything else
    /// is its own open end.
    pub fn start(graph: &StateGraph, state: StateId) -> Self {
        let open = if graph.node(state).is_inherently_terminal() {
            Vec::new()
        } else {
            vec![state]
        };
        Self { start: state, open }
    }

    pub fn start_id(&self) -> StateId {
        self.start
    }

    pub fn open_ends(&self) -> &[StateId] {
        &self.open
    }

    /// True once every open end has been wired or marked terminal.
    pub fn is_closed(&self) -> bool {
        self.open.is_empty()
    }

    /// Wire every open end of this chain to `target`'s start. Choice open
    /// ends get their default transition set; everything else gets Next.
    /// The result carries `target`'s open ends.
    pub fn next(self, graph: &mut StateGraph, target: &Chain) -> Result<Chain, CompileError> {
        if self.open.is_empty() {
            return Err(CompileError::ClosedChain {
                start: graph.node(self.start).name().to_string(),
            });
        }
        let to_name = graph.node(target.start).name().to_string();
        for &end in &self.open {
            graph.wire_next(end, &to_name)?;
        }
        Ok(Chain {
            start: self.start,
            open: target.open.clone(),
        })
    }

    /// Convenience: wire to a single state.
    pub fn next_state(self, graph: &mut StateGraph, target: StateId) -> Result<Chain, CompileError> {
        let target = Chain::start(graph, target);
        self.next(graph, &target)
    }

    /// Mark every open end terminal (`End: true`). Choice open ends are
    /// left alone; a Choice carries no End of its own. The result has no
    /// open ends; further [`next`](Self::next) calls fail.
    pub fn end(self, graph: &mut StateGraph) -> Result<Chain, CompileError> {
        for &end in &self.open {
            graph.mark_end(end)?;
        }
        Ok(Chain {
            start: self.start,
            open: Vec::new(),
        })
    }

    /// Fold another chain's open ends into this frontier, so branches
    /// (Choice targets, for instance) converge on one continuation.
    pub fn also(mut self, other: &Chain) -> Chain {
        self.open.extend_from_slice(&other.open);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Condition, StateKind, StateNode, Transition};

    fn task(name: &str) -> StateNode {
        StateNode::task(name, format!("arn:fn:{}", name.to_lowercase()))
    }

    #[test]
    fn linear_chain_wires_next_in_sequence() {
        let mut g = StateGraph::new("linear");
        let a = g.add(task("A"));
        let b = g.add(task("B"));
        let c = g.add(task("C"));

        let chain = Chain::start(&g, a)
            .next_state(&mut g, b)
            .unwrap()
            .next_state(&mut g, c)
            .unwrap()
            .end(&mut g)
            .unwrap();

        assert!(chain.is_closed());
        assert_eq!(g.node(a).transition, Transition::Next("B".into()));
        assert_eq!(g.node(b).transition, Transition::Next("C".into()));
        assert_eq!(g.node(c).transition, Transition::End);
    }

    #[test]
    fn next_on_closed_chain_fails() {
        let mut g = StateGraph::new("closed");
        let a = g.add(task("A"));
        let b = g.add(task("B"));

        let chain = Chain::start(&g, a).end(&mut g).unwrap();
        let err = chain.next_state(&mut g, b);
        assert!(matches!(err, Err(CompileError::ClosedChain { .. })));
    }

    #[test]
    fn succeed_contributes_no_open_end() {
        let mut g = StateGraph::new("succeed");
        let a = g.add(task("A"));
        let done = g.add(StateNode::succeed("Done"));

        let chain = Chain::start(&g, a).next_state(&mut g, done).unwrap();
        assert!(chain.is_closed());
        assert_eq!(g.node(a).transition, Transition::Next("Done".into()));
    }

    #[test]
    fn choice_open_end_wires_default() {
        let mut g = StateGraph::new("router");
        let router = g.add(StateNode::choice("Route").when(
            Condition::BooleanEquals {
                variable: "$.ok".into(),
                value: true,
            },
            "Accept",
        ));
        let fallback = g.add(task("Fallback"));

        let chain = Chain::start(&g, router)
            .next_state(&mut g, fallback)
            .unwrap();
        assert_eq!(chain.open_ends(), &[fallback]);

        match &g.node(router).kind {
            StateKind::Choice { default, .. } => assert_eq!(default.as_deref(), Some("Fallback")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn branches_converge_via_also() {
        let mut g = StateGraph::new("converge");
        let a = g.add(task("A"));
        let b = g.add(task("B"));
        let done = g.add(task("Done"));

        let merged = Chain::start(&g, a).also(&Chain::start(&g, b));
        let merged = merged.next_state(&mut g, done).unwrap();
        merged.end(&mut g).unwrap();

        assert_eq!(g.node(a).transition, Transition::Next("Done".into()));
        assert_eq!(g.node(b).transition, Transition::Next("Done".into()));
        assert_eq!(g.node(done).transition, Transition::End);
    }
}
