//! Compiler error types.

use thiserror::Error;

/// Errors that can occur while wiring or compiling a state graph.
///
/// Every variant is a structural/configuration defect detected from the
/// in-memory graph before any document is emitted. Compilation either fully
/// succeeds or returns one of these; nothing is retried and nothing partial
/// is produced.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// Two distinct state definitions share a name in the same namespace.
    #[error("duplicate state name `{name}` (defined at `{first}` and `{second}`)")]
    DuplicateStateName {
        name: String,
        first: String,
        second: String,
    },

    /// A Next/Catch/Choice target does not resolve to any defined state.
    #[error("state `{from}` references unknown target `{target}`")]
    UnresolvedTransition { from: String, target: String },

    /// A Wait state must set exactly one of its four duration specifiers.
    #[error("wait state `{name}` must set exactly one of seconds, timestamp, seconds_path, timestamp_path (found {found})")]
    InvalidWaitSpecification { name: String, found: usize },

    /// An attempt to set Next/End on a state that already has a transition.
    #[error("state `{name}` already has an outgoing transition")]
    DoubleWiring { name: String },

    /// No start state was bound to the graph.
    #[error("no start state bound to graph `{label}`")]
    EmptyStartState { label: String },

    /// A non-Choice state has neither a Next transition nor a terminal marker.
    #[error("state `{name}` has neither a next transition nor a terminal marker")]
    UnterminatedState { name: String },

    /// Retry attached to a kind that cannot fail.
    #[error("retry policy cannot be attached to {kind} state `{name}`")]
    RetryNotSupported { name: String, kind: &'static str },

    /// Catch attached to a kind that cannot fail.
    #[error("catch handler cannot be attached to {kind} state `{name}`")]
    CatchNotSupported { name: String, kind: &'static str },

    /// A Choice state with no conditional branches.
    #[error("choice state `{name}` has no conditional branches")]
    EmptyChoice { name: String },

    /// A Parallel state with no branches.
    #[error("parallel state `{name}` has no branches")]
    EmptyParallel { name: String },

    /// A Map state without an iterator sub-graph.
    #[error("map state `{name}` has no iterator")]
    MissingIterator { name: String },

    /// An attempt to keep wiring a chain whose open ends were all closed.
    #[error("chain starting at `{start}` has no open ends left to wire")]
    ClosedChain { start: String },

    /// A state handle that does not belong to this graph.
    #[error("state id {index} does not belong to this graph")]
    UnknownState { index: usize },

    /// Document rendering failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}
