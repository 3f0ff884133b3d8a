//! Signals and execution reports.
//!
//! A [`Signal`] wraps a frame (its *root*) as a unit of input: something the
//! agent heard, a directive it built for itself, or a step it decided to run.
//! Every executable run against a signal leaves a [`Report`] on it. The
//! [`SignalLog`] is append-only.

use std::collections::HashMap;

use serde::Serialize;

use crate::dispatch::Operable;
use crate::error::{DelibError, SignalError};
use crate::graph::{FrameGraph, Scope, concept};
use crate::symbol::{SymbolId, now_nanos};

/// Result type for signal operations.
pub type SignalResult<T> = std::result::Result<T, SignalError>;

/// Signals share the frame id space.
pub type SignalId = SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Received,
    Consumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    Finished,
    Failed,
}

/// A contained execution error: the diagnostic code plus its rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionFault {
    pub code: String,
    pub message: String,
}

impl ExecutionFault {
    /// Capture a diagnostic without propagating it.
    pub fn from_diagnostic(err: &dyn miette::Diagnostic) -> Self {
        Self {
            code: err
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "delib::unknown".into()),
            message: err.to_string(),
        }
    }
}

/// The outcome of one executable run against one signal.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Operation kind of the executable that produced this report.
    pub executable: String,
    pub status: ReportStatus,
    /// `Some(false)` when the executable refused the signal.
    pub validation: Option<bool>,
    pub timestamp: u128,
    pub faults: Vec<ExecutionFault>,
    pub message: Option<String>,
}

impl Report {
    pub fn pending(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            status: ReportStatus::Pending,
            validation: None,
            timestamp: now_nanos(),
            faults: Vec::new(),
            message: None,
        }
    }

    pub fn finish(&mut self) {
        self.status = ReportStatus::Finished;
    }

    /// Mark the report failed: the executable could not even start.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ReportStatus::Failed;
        self.message = Some(message.into());
    }

    pub fn add_fault(&mut self, fault: ExecutionFault) {
        self.faults.push(fault);
    }

    pub fn is_faulted(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// A frame wrapped as agent input.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub id: SignalId,
    pub root: SymbolId,
    pub scope: Scope,
    pub timestamp: u128,
    pub status: SignalStatus,
    /// The root plus the frames it references inside the same scope.
    pub constituents: Vec<SymbolId>,
    pub reports: Vec<Report>,
}

impl Signal {
    pub fn consume(&mut self) {
        self.status = SignalStatus::Consumed;
    }

    /// The most recent report produced by `executable`.
    pub fn report_for(&self, executable: &str) -> Option<&Report> {
        self.reports.iter().rev().find(|r| r.executable == executable)
    }
}

impl Operable for Signal {
    fn root(&self) -> SymbolId {
        self.root
    }
}

/// Append-only store of every signal the agent has seen.
#[derive(Debug, Default)]
pub struct SignalLog {
    signals: Vec<Signal>,
    index: HashMap<SignalId, usize>,
}

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `root` as a new signal in `scope`.
    ///
    /// The signal gets a fresh identity (a `SIGNAL` instance frame), a
    /// timestamp and status RECEIVED.
    pub fn build(
        &mut self,
        graph: &mut FrameGraph,
        root: SymbolId,
        scope: Scope,
    ) -> Result<SignalId, DelibError> {
        let root_frame = graph.get(root)?;
        let mut constituents = vec![root];
        for name in root_frame.slot_names() {
            for filler in graph.frame_fillers(root, name) {
                let same_scope = graph.frame(filler).is_some_and(|f| f.scope == root_frame.scope);
                if same_scope && !constituents.contains(&filler) {
                    constituents.push(filler);
                }
            }
        }

        let signal_concept = graph.concept(concept::SIGNAL)?;
        let id = graph.instance_of(signal_concept, scope.clone())?;

        tracing::debug!(signal = %id, root = %graph.label(root), %scope, "signal built");
        self.index.insert(id, self.signals.len());
        self.signals.push(Signal {
            id,
            root,
            scope,
            timestamp: now_nanos(),
            status: SignalStatus::Received,
            constituents,
            reports: Vec::new(),
        });
        Ok(id)
    }

    pub fn get(&self, id: SignalId) -> Option<&Signal> {
        self.index.get(&id).map(|&i| &self.signals[i])
    }

    pub fn get_mut(&mut self, id: SignalId) -> Option<&mut Signal> {
        self.index.get(&id).map(|&i| &mut self.signals[i])
    }

    /// Get a signal, failing if it was never built here.
    pub fn require(&self, id: SignalId) -> SignalResult<&Signal> {
        self.get(id).ok_or(SignalError::NotFound {
            signal_id: id.get(),
        })
    }

    pub fn require_mut(&mut self, id: SignalId) -> SignalResult<&mut Signal> {
        self.get_mut(id).ok_or(SignalError::NotFound {
            signal_id: id.get(),
        })
    }

    /// All signals in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::slot;

    #[test]
    fn build_collects_same_scope_constituents() {
        let mut g = FrameGraph::new();
        let hold = g.concept("HOLD").unwrap();
        let cup = g.concept("CUP").unwrap();
        let scope = g.next_scope("MMR");
        let event = g.instance_of(hold, scope.clone()).unwrap();
        let theme = g.instance_of(cup, scope.clone()).unwrap();
        g.set_one(event, slot::THEME, theme).unwrap();
        // Concept fillers live in the ontology and are not constituents.
        g.set_one(event, slot::INSTANCE_OF, cup).unwrap();

        let mut log = SignalLog::new();
        let id = log.build(&mut g, event, scope.clone()).unwrap();
        let signal = log.require(id).unwrap();
        assert_eq!(signal.root, event);
        assert_eq!(signal.scope, scope);
        assert_eq!(signal.status, SignalStatus::Received);
        assert_eq!(signal.constituents, vec![event, theme]);
        assert!(g.is_a_label(id, concept::SIGNAL));
    }

    #[test]
    fn build_rejects_unknown_root() {
        let mut g = FrameGraph::new();
        let mut log = SignalLog::new();
        let bogus = SymbolId::new(77).unwrap();
        assert!(log.build(&mut g, bogus, Scope::new("EXE")).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn reports_track_faults() {
        let mut report = Report::pending("release-effector");
        assert_eq!(report.status, ReportStatus::Pending);
        report.add_fault(ExecutionFault::from_diagnostic(&SignalError::NotFound {
            signal_id: 4,
        }));
        report.finish();
        assert_eq!(report.status, ReportStatus::Finished);
        assert!(report.is_faulted());
        assert_eq!(report.faults[0].code, "delib::signal::not_found");

        let mut failed = Report::pending("add-goal-instance");
        failed.fail("no signal");
        assert_eq!(failed.status, ReportStatus::Failed);
        assert_eq!(failed.message.as_deref(), Some("no signal"));
    }

    #[test]
    fn require_unknown_signal_is_an_error() {
        let log = SignalLog::new();
        let id = SymbolId::new(5).unwrap();
        assert!(matches!(
            log.require(id),
            Err(SignalError::NotFound { signal_id: 5 })
        ));
    }
}
