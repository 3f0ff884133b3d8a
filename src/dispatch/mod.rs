//! Operation dispatch: which executable responds to which frame.
//!
//! Concepts declare *operations* (an [`OperationKind`] plus an optional
//! required effector type). Anything [`Operable`] resolves its operations by
//! walking its root frame's ancestors and taking the first frame that
//! declares any. Operation kinds map to executables through the
//! [`ExecutableRegistry`], which holds factories so each run gets a fresh
//! executable.
//!
//! # Executable flavours
//!
//! - [`SignalHandler`]: validates and handles a signal against the agent context
//! - [`ProactiveTask`]: runs every heartbeat with no input
//! - [`EffectorAction`]: drives an effector for a job, off the agent's thread

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::FrameGraph;
use crate::signal::SignalId;
use crate::symbol::SymbolId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors specific to the dispatch subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error("unknown operation kind: \"{kind}\"")]
    #[diagnostic(
        code(delib::dispatch::unknown_kind),
        help(
            "No executable is registered under this kind. Register a factory \
             with `ExecutableRegistry::register_*` before attaching the operation."
        )
    )]
    UnknownKind { kind: String },

    #[error("operation kind already registered: \"{kind}\"")]
    #[diagnostic(
        code(delib::dispatch::duplicate_kind),
        help("Operation kinds are unique across handlers, proactive tasks and effector actions.")
    )]
    DuplicateKind { kind: String },
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Names an executable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKind(String);

impl OperationKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// Built-in operation kinds.
pub mod kind {
    pub const ADD_GOAL_INSTANCE: &str = "add-goal-instance";
    pub const RELEASE_EFFECTOR: &str = "release-effector";
    pub const PROCESS_AGENDA: &str = "process-agenda";
    pub const UPDATE_EVERGREENS: &str = "update-evergreens";
}

/// A response a concept declares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Effector type the operation needs, if any.
    pub requires_effector: Option<SymbolId>,
}

impl Operation {
    pub fn new(kind: impl Into<OperationKind>) -> Self {
        Self {
            kind: kind.into(),
            requires_effector: None,
        }
    }

    pub fn requiring(kind: impl Into<OperationKind>, effector_type: SymbolId) -> Self {
        Self {
            kind: kind.into(),
            requires_effector: Some(effector_type),
        }
    }
}

/// Operations declared per frame.
#[derive(Debug, Default)]
pub struct OperationTable {
    by_frame: HashMap<SymbolId, Vec<Operation>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to a frame's responses.
    pub fn add_response(&mut self, frame: SymbolId, operation: Operation) {
        self.by_frame.entry(frame).or_default().push(operation);
    }

    /// Replace a frame's responses.
    pub fn set_response(&mut self, frame: SymbolId, operations: Vec<Operation>) {
        self.by_frame.insert(frame, operations);
    }

    /// Operations declared directly on `frame`.
    pub fn declared(&self, frame: SymbolId) -> &[Operation] {
        self.by_frame.get(&frame).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Operations of `frame`, inherited from the nearest declaring ancestor.
    pub fn lookup(&self, graph: &FrameGraph, frame: SymbolId) -> &[Operation] {
        std::iter::once(frame)
            .chain(graph.ancestors(frame))
            .map(|f| self.declared(f))
            .find(|ops| !ops.is_empty())
            .unwrap_or(&[])
    }
}

/// Something that resolves to operations through its root frame.
pub trait Operable {
    fn root(&self) -> SymbolId;

    fn operations<'t>(&self, graph: &FrameGraph, table: &'t OperationTable) -> &'t [Operation] {
        table.lookup(graph, self.root())
    }

    /// The effector type required by the sole operation; none when zero or
    /// several operations apply.
    fn required_effector(&self, graph: &FrameGraph, table: &OperationTable) -> Option<SymbolId> {
        match self.operations(graph, table) {
            [only] => only.requires_effector,
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Executables
// ---------------------------------------------------------------------------

/// Handles a signal against an agent context `C`.
pub trait SignalHandler<C>: Send {
    /// Whether this handler accepts the signal. A refusal is reported, not run.
    fn validate(&self, _ctx: &C, _signal: SignalId) -> bool {
        true
    }

    fn handle(&mut self, ctx: &mut C, signal: SignalId) -> miette::Result<()>;
}

/// Runs on every heartbeat.
pub trait ProactiveTask<C>: Send {
    fn run(&mut self, ctx: &mut C) -> miette::Result<()>;
}

/// Whether an effector action finished its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The effector may be released.
    Done,
    /// The action continues elsewhere; a release arrives later.
    Pending,
}

/// Work handed to an effector.
#[derive(Debug, Clone, Serialize)]
pub struct EffectorJob {
    pub effector: SymbolId,
    pub effector_label: String,
    pub signal: SignalId,
    /// The step event being executed.
    pub root: SymbolId,
    pub root_label: String,
    pub action: OperationKind,
    /// Set when the effector served an earlier signal: run before `action`.
    pub interrupt: Option<OperationKind>,
}

/// Drives an effector. Runs off the agent's thread.
pub trait EffectorAction: Send {
    fn run(&mut self, job: &EffectorJob) -> miette::Result<Completion>;
}

/// A freshly created executable.
pub enum Executable<C> {
    Handler(Box<dyn SignalHandler<C>>),
    Proactive(Box<dyn ProactiveTask<C>>),
    Action(Box<dyn EffectorAction>),
}

impl<C> Executable<C> {
    pub fn flavour(&self) -> &'static str {
        match self {
            Self::Handler(_) => "handler",
            Self::Proactive(_) => "proactive",
            Self::Action(_) => "action",
        }
    }
}

impl<C> fmt::Debug for Executable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executable::{}", self.flavour())
    }
}

type HandlerFactory<C> = Arc<dyn Fn() -> Box<dyn SignalHandler<C>> + Send + Sync>;
type ProactiveFactory<C> = Arc<dyn Fn() -> Box<dyn ProactiveTask<C>> + Send + Sync>;
type ActionFactory = Arc<dyn Fn() -> Box<dyn EffectorAction> + Send + Sync>;

/// Effector action factories. Cheap to clone and safe to move to a worker.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: HashMap<OperationKind, ActionFactory>,
}

impl ActionRegistry {
    pub fn create(&self, kind: &OperationKind) -> DispatchResult<Box<dyn EffectorAction>> {
        self.factories
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| DispatchError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    pub fn contains(&self, kind: &OperationKind) -> bool {
        self.factories.contains_key(kind)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().map(OperationKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ActionRegistry").field("kinds", &kinds).finish()
    }
}

/// Factories for every executable flavour, keyed by operation kind.
pub struct ExecutableRegistry<C> {
    handlers: HashMap<OperationKind, HandlerFactory<C>>,
    proactive: HashMap<OperationKind, ProactiveFactory<C>>,
    actions: ActionRegistry,
}

impl<C> Default for ExecutableRegistry<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            proactive: HashMap::new(),
            actions: ActionRegistry::default(),
        }
    }
}

impl<C> fmt::Debug for ExecutableRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableRegistry")
            .field("handlers", &self.handlers.len())
            .field("proactive", &self.proactive.len())
            .field("actions", &self.actions)
            .finish()
    }
}

impl<C> ExecutableRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, kind: &OperationKind) -> DispatchResult<()> {
        if self.contains(kind) {
            return Err(DispatchError::DuplicateKind {
                kind: kind.to_string(),
            });
        }
        Ok(())
    }

    pub fn register_handler<F>(&mut self, kind: impl Into<OperationKind>, factory: F) -> DispatchResult<()>
    where
        F: Fn() -> Box<dyn SignalHandler<C>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        self.claim(&kind)?;
        self.handlers.insert(kind, Arc::new(factory));
        Ok(())
    }

    pub fn register_proactive<F>(&mut self, kind: impl Into<OperationKind>, factory: F) -> DispatchResult<()>
    where
        F: Fn() -> Box<dyn ProactiveTask<C>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        self.claim(&kind)?;
        self.proactive.insert(kind, Arc::new(factory));
        Ok(())
    }

    pub fn register_action<F>(&mut self, kind: impl Into<OperationKind>, factory: F) -> DispatchResult<()>
    where
        F: Fn() -> Box<dyn EffectorAction> + Send + Sync + 'static,
    {
        let kind = kind.into();
        self.claim(&kind)?;
        self.actions.factories.insert(kind, Arc::new(factory));
        Ok(())
    }

    /// Create a fresh executable for `kind`.
    pub fn create(&self, kind: &OperationKind) -> DispatchResult<Executable<C>> {
        if let Some(factory) = self.handlers.get(kind) {
            return Ok(Executable::Handler(factory()));
        }
        if let Some(factory) = self.proactive.get(kind) {
            return Ok(Executable::Proactive(factory()));
        }
        self.actions.create(kind).map(Executable::Action)
    }

    pub fn contains(&self, kind: &OperationKind) -> bool {
        self.handlers.contains_key(kind)
            || self.proactive.contains_key(kind)
            || self.actions.contains(kind)
    }

    /// The effector action factories, for handing to a worker.
    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scope;

    struct Counter;

    impl SignalHandler<u32> for Counter {
        fn validate(&self, ctx: &u32, _signal: SignalId) -> bool {
            *ctx < 2
        }

        fn handle(&mut self, ctx: &mut u32, _signal: SignalId) -> miette::Result<()> {
            *ctx += 1;
            Ok(())
        }
    }

    struct Wave;

    impl EffectorAction for Wave {
        fn run(&mut self, _job: &EffectorJob) -> miette::Result<Completion> {
            Ok(Completion::Done)
        }
    }

    struct Root(SymbolId);

    impl Operable for Root {
        fn root(&self) -> SymbolId {
            self.0
        }
    }

    #[test]
    fn lookup_inherits_from_nearest_ancestor() {
        let mut g = FrameGraph::new();
        let event = g.concept("EVENT").unwrap();
        let hold = g.concept_under("HOLD", &[event]).unwrap();
        let step = g.instance_of(hold, Scope::new("AGENDA")).unwrap();
        let hand = g.concept("HAND").unwrap();

        let mut table = OperationTable::new();
        table.add_response(event, Operation::new("log-event"));
        assert_eq!(Root(step).operations(&g, &table)[0].kind.as_str(), "log-event");
        assert_eq!(Root(step).required_effector(&g, &table), None);

        table.add_response(hold, Operation::requiring("grip", hand));
        assert_eq!(Root(step).required_effector(&g, &table), Some(hand));

        table.add_response(hold, Operation::new("announce"));
        assert_eq!(Root(step).operations(&g, &table).len(), 2);
        assert_eq!(Root(step).required_effector(&g, &table), None);

        table.set_response(hold, vec![Operation::new("announce")]);
        assert_eq!(table.declared(hold).len(), 1);
    }

    #[test]
    fn registry_creates_fresh_executables() {
        let mut registry: ExecutableRegistry<u32> = ExecutableRegistry::new();
        registry.register_handler("count", || Box::new(Counter)).unwrap();
        registry.register_action("wave", || Box::new(Wave)).unwrap();

        let mut ctx = 0u32;
        let signal = SymbolId::new(1).unwrap();
        match registry.create(&"count".into()).unwrap() {
            Executable::Handler(mut h) => {
                assert!(h.validate(&ctx, signal));
                h.handle(&mut ctx, signal).unwrap();
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ctx, 1);

        assert_eq!(registry.create(&"wave".into()).unwrap().flavour(), "action");
        assert!(registry.actions().contains(&"wave".into()));
        assert!(matches!(
            registry.create(&"fly".into()),
            Err(DispatchError::UnknownKind { .. })
        ));
    }

    #[test]
    fn kinds_are_unique_across_flavours() {
        let mut registry: ExecutableRegistry<u32> = ExecutableRegistry::new();
        registry.register_handler("count", || Box::new(Counter)).unwrap();
        let err = registry.register_action("count", || Box::new(Wave)).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateKind { .. }));
    }
}
