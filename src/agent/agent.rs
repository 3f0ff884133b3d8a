//! Agent struct: the context object every phase and executable runs against.
//!
//! The `Agent` owns the frame graph, the agenda and every registry. It is a
//! plain synchronous value: one `&mut Agent` is one consistent view, so a
//! heartbeat is atomic by construction. Concurrency lives outside it, in the
//! daemon actor.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::dispatch::{
    DispatchError, EffectorAction, EffectorJob, Executable, ExecutableRegistry, Operable,
    Operation, OperationKind, OperationTable, ProactiveTask, SignalHandler,
};
use crate::error::{SignalError, TemplateError};
use crate::graph::{Filler, FrameGraph, Scope, concept, slot};
use crate::signal::{ExecutionFault, Report, ReportStatus, SignalId, SignalLog};
use crate::states::{PhaseOracle, WorldStateOracle};
use crate::symbol::SymbolId;
use crate::template::{EvergreenValue, Instantiate, KnowledgePack, TemplateLibrary};

use super::agenda::Agenda;
use super::effector::{
    Effector, EffectorId, EffectorOutcome, EffectorOutput, EffectorRegistry, QueuedOutput, run_job,
};
use super::error::{AgentError, AgentResult};
use super::evergreen::{Comparator, EvergreenGoals, LtGoal, Observable, ObservableValue};
use super::goal::GoalId;
use super::impasse::{DetectorRegistry, ImpasseDetector};
use super::operations;
use super::scheduler::TickSummary;

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// The deliberating agent.
///
/// Fields are crate-visible so scheduler phases can borrow them disjointly.
pub struct Agent {
    /// The agent's own frame (scope `SELF`, an instance of `AGENT`).
    pub(crate) identity: SymbolId,
    pub(crate) config: AgentConfig,
    pub(crate) graph: FrameGraph,
    pub(crate) agenda: Agenda,
    pub(crate) effectors: EffectorRegistry,
    pub(crate) evergreens: EvergreenGoals,
    pub(crate) signals: SignalLog,
    pub(crate) operations: OperationTable,
    pub(crate) executables: ExecutableRegistry<Agent>,
    pub(crate) detectors: DetectorRegistry,
    pub(crate) templates: Box<dyn Instantiate>,
    pub(crate) oracle: Box<dyn WorldStateOracle>,
    pub(crate) output: Arc<dyn EffectorOutput>,
    pub(crate) tick_count: u64,
    /// Counters of the current (or last) heartbeat.
    pub(crate) summary: TickSummary,
    /// Reports of the proactive tasks run by the last heartbeat.
    pub(crate) heartbeat_reports: Vec<Report>,
}

impl Agent {
    /// Create an agent named `name`.
    ///
    /// Seeds the base ontology, creates the agent's identity frame and
    /// registers the built-in operations. Effector jobs go to an in-memory
    /// [`QueuedOutput`] until [`Agent::set_output`] replaces it.
    pub fn new(name: &str, config: AgentConfig) -> AgentResult<Self> {
        config.validate()?;

        let mut graph = FrameGraph::new();
        seed_ontology(&mut graph)?;
        let agent_concept = graph.require_concept(concept::AGENT)?;
        let identity = graph.create_frame(name, Scope::new("SELF"), &[agent_concept])?;

        let mut executables = ExecutableRegistry::new();
        let mut operation_table = OperationTable::new();
        operations::register_builtins(&mut graph, &mut executables, &mut operation_table)?;

        tracing::info!(agent = name, %identity, "agent created");
        Ok(Self {
            identity,
            detectors: DetectorRegistry::with_builtins(&config.case_roles),
            oracle: Box::new(PhaseOracle::new(config.case_roles.clone())),
            config,
            graph,
            agenda: Agenda::new(),
            effectors: EffectorRegistry::new(),
            evergreens: EvergreenGoals::new(),
            signals: SignalLog::new(),
            operations: operation_table,
            executables,
            templates: Box::new(TemplateLibrary::new()),
            output: Arc::new(QueuedOutput::new()),
            tick_count: 0,
            summary: TickSummary::default(),
            heartbeat_reports: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> SymbolId {
        self.identity
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn graph(&self) -> &FrameGraph {
        &self.graph
    }

    /// Mutable access to the graph, for perception and test setup.
    pub fn graph_mut(&mut self) -> &mut FrameGraph {
        &mut self.graph
    }

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn effectors(&self) -> &EffectorRegistry {
        &self.effectors
    }

    pub fn evergreens(&self) -> &EvergreenGoals {
        &self.evergreens
    }

    pub fn signals(&self) -> &SignalLog {
        &self.signals
    }

    pub fn operations(&self) -> &OperationTable {
        &self.operations
    }

    pub fn templates(&self) -> &dyn Instantiate {
        self.templates.as_ref()
    }

    /// Heartbeats run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Counters of the last heartbeat.
    pub fn summary(&self) -> &TickSummary {
        &self.summary
    }

    pub fn heartbeat_reports(&self) -> &[Report] {
        &self.heartbeat_reports
    }

    // -----------------------------------------------------------------------
    // Configuration of collaborators
    // -----------------------------------------------------------------------

    /// Replace where effector jobs go.
    pub fn set_output(&mut self, output: Arc<dyn EffectorOutput>) {
        self.output = output;
    }

    pub fn set_oracle(&mut self, oracle: Box<dyn WorldStateOracle>) {
        self.oracle = oracle;
    }

    /// Replace the template library. Templates loaded earlier are dropped
    /// with the old library.
    pub fn set_templates(&mut self, templates: Box<dyn Instantiate>) {
        self.templates = templates;
    }

    /// Register (or replace) an impasse detector kind.
    pub fn register_detector(&mut self, kind: impl Into<String>, detector: impl ImpasseDetector + 'static) {
        self.detectors.register(kind, detector);
    }

    pub fn register_handler<F>(&mut self, kind: impl Into<OperationKind>, factory: F) -> AgentResult<()>
    where
        F: Fn() -> Box<dyn SignalHandler<Agent>> + Send + Sync + 'static,
    {
        Ok(self.executables.register_handler(kind, factory)?)
    }

    pub fn register_proactive<F>(&mut self, kind: impl Into<OperationKind>, factory: F) -> AgentResult<()>
    where
        F: Fn() -> Box<dyn ProactiveTask<Agent>> + Send + Sync + 'static,
    {
        Ok(self.executables.register_proactive(kind, factory)?)
    }

    pub fn register_action<F>(&mut self, kind: impl Into<OperationKind>, factory: F) -> AgentResult<()>
    where
        F: Fn() -> Box<dyn EffectorAction> + Send + Sync + 'static,
    {
        Ok(self.executables.register_action(kind, factory)?)
    }

    /// Append an operation to `frame`'s responses.
    ///
    /// The operation's kind must already be registered.
    pub fn add_response(&mut self, frame: SymbolId, operation: Operation) -> AgentResult<()> {
        self.check_response(frame, &operation)?;
        self.operations.add_response(frame, operation);
        Ok(())
    }

    /// Replace `frame`'s responses.
    pub fn set_response(&mut self, frame: SymbolId, operations: Vec<Operation>) -> AgentResult<()> {
        for operation in &operations {
            self.check_response(frame, operation)?;
        }
        self.operations.set_response(frame, operations);
        Ok(())
    }

    fn check_response(&self, frame: SymbolId, operation: &Operation) -> AgentResult<()> {
        self.graph.get(frame)?;
        if !self.executables.contains(&operation.kind) {
            return Err(DispatchError::UnknownKind {
                kind: operation.kind.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn register_effector(&mut self, effector: Effector) -> EffectorId {
        self.effectors.register(effector)
    }

    pub fn add_evergreen(&mut self, goal: LtGoal) {
        self.evergreens.add(goal);
    }

    // -----------------------------------------------------------------------
    // Knowledge packs
    // -----------------------------------------------------------------------

    pub fn load_pack(&mut self, path: &Path) -> AgentResult<()> {
        let pack = KnowledgePack::load(path)?;
        self.load_pack_value(pack)
    }

    pub fn load_pack_str(&mut self, text: &str) -> AgentResult<()> {
        let pack = KnowledgePack::from_toml_str(text)?;
        self.load_pack_value(pack)
    }

    /// Apply a parsed pack: concepts and templates, then operations,
    /// effectors and evergreens.
    ///
    /// Every goal named by an impasse resolution must be defined by this pack
    /// or already known, otherwise nothing is loaded.
    pub fn load_pack_value(&mut self, pack: KnowledgePack) -> AgentResult<()> {
        for goal in &pack.goals {
            for name in goal.resolution_goals() {
                let known = pack.goals.iter().any(|g| g.name == name)
                    || self.templates.template_concept(name).is_some();
                if !known {
                    return Err(TemplateError::NotFound {
                        template: name.to_string(),
                    }
                    .into());
                }
            }
        }

        let templates = self.templates.load_pack(&mut self.graph, &pack)?;

        for decl in &pack.operations {
            let frame = self.graph.concept(&decl.concept)?;
            let operation = match &decl.requires {
                Some(effector_type) => {
                    Operation::requiring(decl.kind.as_str(), self.graph.concept(effector_type)?)
                }
                None => Operation::new(decl.kind.as_str()),
            };
            self.add_response(frame, operation)?;
        }

        let effector_root = self.graph.require_concept(concept::EFFECTOR)?;
        for decl in &pack.effectors {
            let effector_type = self.graph.concept(&decl.effector_type)?;
            if !self.graph.is_a(effector_type, effector_root) {
                self.graph.add_parent(effector_type, effector_root)?;
            }
            self.require_action(&decl.action)?;
            let mut effector =
                Effector::create(&mut self.graph, &decl.name, effector_type, decl.action.as_str())?;
            if let Some(interrupt) = &decl.interrupt {
                self.require_action(interrupt)?;
                effector = effector.with_interrupt(interrupt.as_str());
            }
            self.register_effector(effector);
        }

        for decl in &pack.evergreens {
            let target = observable_value(&decl.comparator, &decl.values)?;
            if self.templates.template_concept(&decl.resolution).is_none() {
                return Err(TemplateError::NotFound {
                    template: decl.resolution.clone(),
                }
                .into());
            }
            let subject = self.graph.concept(&decl.subject)?;
            let mut goal = LtGoal::new(subject, decl.slot.as_str(), target, decl.resolution.as_str());
            if let Some(name) = &decl.name {
                goal = goal.named(name.as_str());
            }
            self.add_evergreen(goal);
        }

        tracing::info!(
            templates,
            operations = pack.operations.len(),
            effectors = pack.effectors.len(),
            evergreens = pack.evergreens.len(),
            "knowledge pack loaded"
        );
        Ok(())
    }

    fn require_action(&self, kind: &str) -> AgentResult<()> {
        let kind = OperationKind::new(kind);
        if self.executables.actions().contains(&kind) {
            Ok(())
        } else {
            Err(DispatchError::UnknownKind {
                kind: kind.to_string(),
            }
            .into())
        }
    }

    // -----------------------------------------------------------------------
    // Goals
    // -----------------------------------------------------------------------

    /// Instantiate a goal template and attach it to the agenda.
    pub fn add_goal_instance(&mut self, template: &str, bindings: &[(String, Filler)]) -> AgentResult<GoalId> {
        operations::add_goal_instance(self, template, bindings, &[])
    }

    /// Give up on a goal. Its steps are left as they are.
    pub fn abandon_goal(&mut self, goal: GoalId) -> AgentResult<()> {
        let record = self.agenda.require_goal_mut(goal)?;
        record.abandon();
        tracing::info!(goal = %record.label, "goal abandoned");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    /// Wrap `root` as a signal in its own scope and handle it.
    pub fn input(&mut self, root: SymbolId) -> AgentResult<SignalId> {
        let scope = self.graph.get(root)?.scope.clone();
        let signal = self.signals.build(&mut self.graph, root, scope)?;
        self.handle(signal)?;
        Ok(signal)
    }

    /// Run every operation of the signal's root against it.
    ///
    /// Each run leaves a report on the signal; executable errors are
    /// contained as report faults. The signal ends CONSUMED.
    pub fn handle(&mut self, signal: SignalId) -> AgentResult<()> {
        let record = self.signals.require(signal)?;
        let root = record.root;
        if self.graph.root_concept(root).is_none() {
            return Err(SignalError::NoRootConcept {
                signal_id: signal.get(),
                root: self.graph.label(root),
            }
            .into());
        }
        let kinds: Vec<OperationKind> = record
            .operations(&self.graph, &self.operations)
            .iter()
            .map(|op| op.kind.clone())
            .collect();
        if kinds.is_empty() {
            tracing::debug!(%signal, root = %self.graph.label(root), "no operation responds");
        }

        for kind in kinds {
            let report = self.run_handler(&kind, signal);
            self.tally(&report);
            self.signals.require_mut(signal)?.reports.push(report);
        }
        self.signals.require_mut(signal)?.consume();
        Ok(())
    }

    fn run_handler(&mut self, kind: &OperationKind, signal: SignalId) -> Report {
        let mut report = Report::pending(kind.as_str());
        match self.executables.create(kind) {
            Ok(Executable::Handler(mut handler)) => {
                if handler.validate(self, signal) {
                    if let Err(err) = handler.handle(self, signal) {
                        tracing::warn!(%signal, handler = %kind, error = %err, "handler fault");
                        report.add_fault(ExecutionFault::from_diagnostic(&*err));
                    }
                } else {
                    tracing::debug!(%signal, handler = %kind, "signal refused");
                    report.validation = Some(false);
                }
                report.finish();
            }
            Ok(Executable::Proactive(mut task)) => {
                if let Err(err) = task.run(self) {
                    tracing::warn!(%signal, task = %kind, error = %err, "proactive task fault");
                    report.add_fault(ExecutionFault::from_diagnostic(&*err));
                }
                report.finish();
            }
            Ok(Executable::Action(_)) => report.fail("effector action invoked without an effector"),
            Err(err) => report.fail(err.to_string()),
        }
        report
    }

    fn tally(&mut self, report: &Report) {
        if report.status == ReportStatus::Failed {
            tracing::warn!(
                executable = %report.executable,
                message = report.message.as_deref().unwrap_or_default(),
                "executable failed to start"
            );
        }
        if report.is_faulted() || report.status == ReportStatus::Failed {
            self.summary.faults += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    /// Run the configured proactive operations, in order.
    pub fn background(&mut self) -> AgentResult<Vec<Report>> {
        let mut reports = Vec::with_capacity(self.config.proactivity.len());
        for kind in self.config.proactivity.clone() {
            let kind = OperationKind::new(kind);
            let mut report = Report::pending(kind.as_str());
            match self.executables.create(&kind)? {
                Executable::Proactive(mut task) => {
                    if let Err(err) = task.run(self) {
                        tracing::warn!(task = %kind, error = %err, "proactive task fault");
                        report.add_fault(ExecutionFault::from_diagnostic(&*err));
                    }
                    report.finish();
                }
                Executable::Handler(_) => report.fail("handler invoked without a signal"),
                Executable::Action(_) => report.fail("effector action invoked without an effector"),
            }
            self.tally(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// One heartbeat: reset the counters and run [`Agent::background`].
    pub fn tick(&mut self) -> AgentResult<TickSummary> {
        self.tick_count += 1;
        self.summary = TickSummary {
            tick: self.tick_count,
            ..TickSummary::default()
        };
        self.heartbeat_reports = self.background()?;

        let s = &self.summary;
        if s.options_selected + s.goals_satisfied + s.impasses_fired + s.evergreens_attached + s.faults > 0 {
            tracing::info!(
                tick = s.tick,
                selected = s.options_selected,
                jobs = s.effector_jobs,
                impasses = s.impasses_fired,
                satisfied = s.goals_satisfied,
                faults = s.faults,
                "tick"
            );
        } else {
            tracing::debug!(tick = s.tick, "idle tick");
        }
        Ok(self.summary.clone())
    }

    // -----------------------------------------------------------------------
    // Effectors
    // -----------------------------------------------------------------------

    /// Submit a RELEASE-EFFECTOR directive for `effector`.
    pub fn release(&mut self, effector: EffectorId) -> AgentResult<SignalId> {
        let scope = self.graph.next_scope("MMR");
        let directive = self.graph.require_concept(concept::RELEASE_EFFECTOR)?;
        let root = self.graph.instance_of(directive, scope)?;
        self.graph.set_one(root, slot::THEME, effector)?;
        self.input(root)
    }

    /// File an effector's reports on its signal; release it when done.
    pub fn complete_job(&mut self, outcome: EffectorOutcome) -> AgentResult<()> {
        let done = outcome.is_done();
        for report in &outcome.reports {
            self.tally(report);
        }
        self.signals
            .require_mut(outcome.job.signal)?
            .reports
            .extend(outcome.reports);
        if done {
            self.release(outcome.job.effector)?;
        }
        Ok(())
    }

    /// Run jobs on the current thread and complete them. Returns how many
    /// finished with [`Completion::Done`](crate::dispatch::Completion::Done).
    pub fn run_effector_jobs(&mut self, jobs: Vec<EffectorJob>) -> AgentResult<usize> {
        let actions = self.executables.actions().clone();
        let mut done = 0;
        for job in jobs {
            let outcome = run_job(&actions, job);
            done += usize::from(outcome.is_done());
            self.complete_job(outcome)?;
        }
        Ok(done)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("identity", &self.identity)
            .field("frames", &self.graph.len())
            .field("goals", &self.agenda.goals().len())
            .field("effectors", &self.effectors.len())
            .field("evergreens", &self.evergreens.len())
            .field("signals", &self.signals.len())
            .field("executables", &self.executables)
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

/// Build an evergreen condition from its pack form, nested tables included.
fn observable_value(comparator: &str, values: &[EvergreenValue]) -> AgentResult<ObservableValue> {
    let comparator: Comparator = comparator.parse()?;
    let values = values
        .iter()
        .map(|value| match value {
            EvergreenValue::Literal(v) => Ok(Observable::Value(v.literal())),
            EvergreenValue::Nested(nested) => {
                observable_value(&nested.comparator, &nested.values).map(Observable::Nested)
            }
        })
        .collect::<AgentResult<Vec<_>>>()?;
    Ok(ObservableValue::new(comparator, values))
}

/// The base concepts every agent starts with.
fn seed_ontology(graph: &mut FrameGraph) -> AgentResult<()> {
    let all = graph.concept(concept::ALL)?;
    for label in [
        concept::EVENT,
        concept::EFFECT,
        concept::OBJECT,
        concept::GOAL,
        concept::SIGNAL,
        concept::IMPASSE,
        concept::RESOLUTION,
        concept::BINDING,
        concept::VARMAP,
        concept::OPTION,
    ] {
        graph.concept_under(label, &[all])?;
    }
    let object = graph.require_concept(concept::OBJECT)?;
    graph.concept_under(concept::AGENT, &[object])?;
    graph.concept_under(concept::EFFECTOR, &[object])?;
    let event = graph.require_concept(concept::EVENT)?;
    graph.concept_under(concept::ADD_GOAL_INSTANCE, &[event])?;
    graph.concept_under(concept::RELEASE_EFFECTOR, &[event])?;
    Ok(())
}
