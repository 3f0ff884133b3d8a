//! Effectors: the agent's scarce actuation resources.
//!
//! An effector is a frame whose ontological parent is its *type* (a step
//! requires a type, e.g. `HAND`; any available effector of that type can
//! serve it). Each effector serves one signal at a time. Work reaches an
//! effector through an [`EffectorOutput`]; the agent never waits on it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::dispatch::{ActionRegistry, Completion, EffectorJob, OperationKind};
use crate::graph::{FrameGraph, GraphResult, PHASE_END, Scope, slot};
use crate::signal::{ExecutionFault, Report, SignalId, SignalLog};
use crate::symbol::SymbolId;

use super::error::{AgentResult, EffectorError};

/// Effectors share the frame id space.
pub type EffectorId = SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectorStatus {
    Available,
    Reserved,
}

/// An actuation resource.
#[derive(Debug, Clone, Serialize)]
pub struct Effector {
    pub id: EffectorId,
    pub label: String,
    pub status: EffectorStatus,
    /// The last signal this effector was reserved to. Kept after release.
    pub reserved_to: Option<SignalId>,
    /// Action run for every job.
    pub executable: OperationKind,
    /// Action run before a job when the effector served an earlier signal.
    pub interrupt: Option<OperationKind>,
}

impl Effector {
    /// Create the effector's frame (scope `SELF`) as an instance of `effector_type`.
    pub fn create(
        graph: &mut FrameGraph,
        name: &str,
        effector_type: SymbolId,
        executable: impl Into<OperationKind>,
    ) -> GraphResult<Self> {
        let id = graph.create_frame(name, Scope::new("SELF"), &[effector_type])?;
        Ok(Self {
            id,
            label: name.into(),
            status: EffectorStatus::Available,
            reserved_to: None,
            executable: executable.into(),
            interrupt: None,
        })
    }

    pub fn with_interrupt(mut self, interrupt: impl Into<OperationKind>) -> Self {
        self.interrupt = Some(interrupt.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == EffectorStatus::Available
    }
}

/// Registered effectors, in registration order.
#[derive(Debug, Default)]
pub struct EffectorRegistry {
    effectors: Vec<Effector>,
    index: HashMap<EffectorId, usize>,
}

impl EffectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an effector. Re-registering an id replaces the record in place.
    pub fn register(&mut self, effector: Effector) -> EffectorId {
        let id = effector.id;
        match self.index.get(&id) {
            Some(&i) => self.effectors[i] = effector,
            None => {
                self.index.insert(id, self.effectors.len());
                self.effectors.push(effector);
            }
        }
        id
    }

    pub fn get(&self, id: EffectorId) -> Option<&Effector> {
        self.index.get(&id).map(|&i| &self.effectors[i])
    }

    fn require_mut(&mut self, id: EffectorId) -> Result<&mut Effector, EffectorError> {
        match self.index.get(&id) {
            Some(&i) => Ok(&mut self.effectors[i]),
            None => Err(EffectorError::NotFound {
                effector_id: id.get(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effector> {
        self.effectors.iter()
    }

    pub fn len(&self) -> usize {
        self.effectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effectors.is_empty()
    }

    /// Available effectors of the given type, in registration order.
    pub fn list_available(&self, graph: &FrameGraph, effector_type: SymbolId) -> Vec<&Effector> {
        self.effectors
            .iter()
            .filter(|e| e.is_available() && graph.is_a(e.id, effector_type))
            .collect()
    }

    /// Reserve an effector to a signal.
    ///
    /// Returns the signal it previously served, if any. Interruption does not
    /// depend on it: every job dispatched to an effector with an interrupt
    /// action runs that action first.
    pub fn reserve(&mut self, id: EffectorId, signal: SignalId) -> Result<Option<SignalId>, EffectorError> {
        let effector = self.require_mut(id)?;
        if effector.status == EffectorStatus::Reserved {
            return Err(EffectorError::Busy {
                label: effector.label.clone(),
                reserved_to: effector.reserved_to.map(SymbolId::get).unwrap_or_default(),
            });
        }
        let previous = effector.reserved_to.replace(signal);
        effector.status = EffectorStatus::Reserved;
        tracing::info!(effector = %effector.label, %signal, "effector reserved");
        Ok(previous)
    }

    /// Make an effector available again and mark its signal's event ended.
    pub fn release(&mut self, graph: &mut FrameGraph, signals: &SignalLog, id: EffectorId) -> AgentResult<()> {
        let effector = self.require_mut(id)?;
        effector.status = EffectorStatus::Available;
        tracing::info!(effector = %effector.label, "effector released");
        if let Some(signal) = effector.reserved_to {
            let root = signals.require(signal)?.root;
            graph.set_one(root, slot::PHASE, PHASE_END)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output channel
// ---------------------------------------------------------------------------

/// Hands effector jobs to whatever drives the hardware. Must not block.
pub trait EffectorOutput: Send + Sync {
    fn dispatch(&self, job: EffectorJob);
}

/// Keeps jobs in memory until someone takes them.
#[derive(Debug, Default)]
pub struct QueuedOutput {
    jobs: Mutex<Vec<EffectorJob>>,
}

impl QueuedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every queued job.
    pub fn take(&self) -> Vec<EffectorJob> {
        std::mem::take(&mut *self.jobs.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EffectorOutput for QueuedOutput {
    fn dispatch(&self, job: EffectorJob) {
        tracing::debug!(effector = %job.effector_label, step = %job.root_label, "job queued");
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job);
    }
}

/// What came of running a job.
#[derive(Debug, Clone, Serialize)]
pub struct EffectorOutcome {
    pub job: EffectorJob,
    /// Interrupt report (if one ran) followed by the action report.
    pub reports: Vec<Report>,
    /// `None` when the action failed to start or returned an error.
    pub completion: Option<Completion>,
}

impl EffectorOutcome {
    pub fn is_done(&self) -> bool {
        self.completion == Some(Completion::Done)
    }
}

/// Run a job's interrupt (if any) and its action. Errors become report faults.
pub fn run_job(actions: &ActionRegistry, job: EffectorJob) -> EffectorOutcome {
    let mut reports = Vec::new();
    if let Some(interrupt) = &job.interrupt {
        let (report, _) = run_action(actions, interrupt, &job);
        reports.push(report);
    }
    let (report, completion) = run_action(actions, &job.action, &job);
    reports.push(report);
    EffectorOutcome {
        job,
        reports,
        completion,
    }
}

fn run_action(actions: &ActionRegistry, kind: &OperationKind, job: &EffectorJob) -> (Report, Option<Completion>) {
    let mut report = Report::pending(kind.as_str());
    let mut action = match actions.create(kind) {
        Ok(action) => action,
        Err(e) => {
            report.fail(e.to_string());
            return (report, None);
        }
    };
    let completion = match action.run(job) {
        Ok(completion) => Some(completion),
        Err(err) => {
            tracing::warn!(effector = %job.effector_label, action = %kind, error = %err, "effector action fault");
            report.add_fault(ExecutionFault::from_diagnostic(&*err));
            None
        }
    };
    report.finish();
    (report, completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{EffectorAction, ExecutableRegistry};

    fn hands() -> (FrameGraph, EffectorRegistry, SymbolId, EffectorId, EffectorId) {
        let mut g = FrameGraph::new();
        let effector = g.concept("EFFECTOR").unwrap();
        let hand = g.concept_under("HAND", &[effector]).unwrap();
        let wheel = g.concept_under("WHEEL", &[effector]).unwrap();
        let mut reg = EffectorRegistry::new();
        let left = reg.register(Effector::create(&mut g, "LEFT-HAND", hand, "grip").unwrap());
        reg.register(Effector::create(&mut g, "WHEELS", wheel, "roll").unwrap());
        let right = reg.register(Effector::create(&mut g, "RIGHT-HAND", hand, "grip").unwrap());
        (g, reg, hand, left, right)
    }

    #[test]
    fn list_available_filters_type_and_status() {
        let (g, mut reg, hand, left, right) = hands();
        let ids: Vec<_> = reg.list_available(&g, hand).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![left, right]);

        reg.reserve(left, SymbolId::new(900).unwrap()).unwrap();
        let ids: Vec<_> = reg.list_available(&g, hand).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![right]);

        let effector = g.lookup_concept("EFFECTOR").unwrap();
        assert_eq!(reg.list_available(&g, effector).len(), 2);
    }

    #[test]
    fn reserving_twice_is_busy() {
        let (_, mut reg, _, left, _) = hands();
        let first = SymbolId::new(900).unwrap();
        assert_eq!(reg.reserve(left, first).unwrap(), None);
        let err = reg.reserve(left, SymbolId::new(901).unwrap()).unwrap_err();
        assert!(matches!(err, EffectorError::Busy { reserved_to: 900, .. }));
        assert_eq!(reg.get(left).unwrap().reserved_to, Some(first));
    }

    #[test]
    fn release_ends_the_signal_event_and_keeps_audit() {
        let (mut g, mut reg, _, left, _) = hands();
        let grab = g.concept("GRAB").unwrap();
        let step = g.instance_of(grab, Scope::new("AGENDA")).unwrap();
        let mut log = SignalLog::new();
        let signal = log.build(&mut g, step, Scope::new("EXE")).unwrap();

        reg.reserve(left, signal).unwrap();
        reg.release(&mut g, &log, left).unwrap();

        let effector = reg.get(left).unwrap();
        assert!(effector.is_available());
        assert_eq!(effector.reserved_to, Some(signal));
        assert_eq!(g.text(step, slot::PHASE), Some(PHASE_END));

        let next = log.build(&mut g, step, Scope::new("EXE")).unwrap();
        assert_eq!(reg.reserve(left, next).unwrap(), Some(signal));
    }

    #[test]
    fn unknown_effector_is_an_error() {
        let (mut g, mut reg, _, _, _) = hands();
        let bogus = SymbolId::new(4242).unwrap();
        assert!(reg.reserve(bogus, bogus).is_err());
        assert!(reg.release(&mut g, &SignalLog::new(), bogus).is_err());
    }

    struct Grip;

    impl EffectorAction for Grip {
        fn run(&mut self, _job: &EffectorJob) -> miette::Result<Completion> {
            Ok(Completion::Done)
        }
    }

    struct Jam;

    impl EffectorAction for Jam {
        fn run(&mut self, _job: &EffectorJob) -> miette::Result<Completion> {
            Err(EffectorError::NotFound { effector_id: 1 }.into())
        }
    }

    fn job(action: &str, interrupt: Option<&str>) -> EffectorJob {
        EffectorJob {
            effector: SymbolId::new(1).unwrap(),
            effector_label: "LEFT-HAND".into(),
            signal: SymbolId::new(2).unwrap(),
            root: SymbolId::new(3).unwrap(),
            root_label: "GRAB.3".into(),
            action: action.into(),
            interrupt: interrupt.map(OperationKind::from),
        }
    }

    #[test]
    fn run_job_reports_interrupt_then_action() {
        let mut registry: ExecutableRegistry<()> = ExecutableRegistry::new();
        registry.register_action("grip", || Box::new(Grip)).unwrap();
        registry.register_action("jam", || Box::new(Jam)).unwrap();

        let outcome = run_job(registry.actions(), job("grip", Some("jam")));
        assert!(outcome.is_done());
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.reports[0].executable, "jam");
        assert_eq!(outcome.reports[0].faults[0].code, "delib::effector::not_found");
        assert_eq!(outcome.reports[1].executable, "grip");

        let failed = run_job(registry.actions(), job("fly", None));
        assert_eq!(failed.completion, None);
        assert_eq!(failed.reports[0].status, crate::signal::ReportStatus::Failed);
    }

    #[test]
    fn queued_output_hands_jobs_over_once() {
        let out = QueuedOutput::new();
        out.dispatch(job("grip", None));
        assert_eq!(out.len(), 1);
        assert_eq!(out.take().len(), 1);
        assert!(out.is_empty());
    }
}
