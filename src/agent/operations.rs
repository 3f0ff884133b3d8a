//! Built-in executables and the operations that route to them.
//!
//! | Kind | Flavour | Concept |
//! |------|---------|---------|
//! | `add-goal-instance` | handler | `ADD-GOAL-INSTANCE` |
//! | `release-effector` | handler | `RELEASE-EFFECTOR` |
//! | `process-agenda` | proactive | |
//! | `update-evergreens` | proactive | |
//! | `trace` | effector action | |

use crate::dispatch::{
    Completion, EffectorAction, EffectorJob, ExecutableRegistry, Operation, OperationTable,
    ProactiveTask, SignalHandler, kind,
};
use crate::graph::{Filler, FrameGraph, Scope, concept, slot};
use crate::signal::SignalId;

use super::agent::Agent;
use super::error::{AgentError, AgentResult};
use super::goal::GoalId;
use super::plan::StepId;
use super::scheduler::process_agenda;

/// Register every built-in executable and attach the directive operations.
pub(crate) fn register_builtins(
    graph: &mut FrameGraph,
    executables: &mut ExecutableRegistry<Agent>,
    operations: &mut OperationTable,
) -> AgentResult<()> {
    executables.register_handler(kind::ADD_GOAL_INSTANCE, || Box::new(AddGoalInstance))?;
    executables.register_handler(kind::RELEASE_EFFECTOR, || Box::new(ReleaseEffector))?;
    executables.register_proactive(kind::PROCESS_AGENDA, || Box::new(ProcessAgenda))?;
    executables.register_proactive(kind::UPDATE_EVERGREENS, || Box::new(UpdateEvergreens))?;
    executables.register_action(TraceAction::KIND, || Box::new(TraceAction))?;

    let add = graph.require_concept(concept::ADD_GOAL_INSTANCE)?;
    operations.add_response(add, Operation::new(kind::ADD_GOAL_INSTANCE));
    let release = graph.require_concept(concept::RELEASE_EFFECTOR)?;
    operations.add_response(release, Operation::new(kind::RELEASE_EFFECTOR));
    Ok(())
}

/// Instantiate `template` in scope `AGENDA`, adopt it and attach it.
///
/// The new goal becomes a subgoal of every step in `subgoal_of`.
pub(crate) fn add_goal_instance(
    agent: &mut Agent,
    template: &str,
    bindings: &[(String, Filler)],
    subgoal_of: &[StepId],
) -> AgentResult<GoalId> {
    let frame = agent
        .templates
        .instantiate(&mut agent.graph, template, Scope::new("AGENDA"), bindings)?;
    let goal = agent.agenda.adopt_goal(&agent.graph, frame)?;
    for &step in subgoal_of {
        agent.agenda.require_step_mut(step)?.subgoals.push(goal);
        agent.agenda.require_goal_mut(goal)?.subgoal_of = Some(step);
    }
    agent.agenda.add_goal(goal)?;
    tracing::info!(
        goal = %agent.graph.label(goal),
        subgoal_of = subgoal_of.len(),
        "goal instance added"
    );
    Ok(goal)
}

fn signal_root(agent: &Agent, signal: SignalId) -> AgentResult<crate::symbol::SymbolId> {
    Ok(agent.signals.require(signal)?.root)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Handles `ADD-GOAL-INSTANCE` directives.
///
/// THEME names the template concept; each `HAS-BINDING` frame carries a
/// `BIND-TO` variable name and its `REALIZED` value; `SUBGOAL-OF` names the
/// steps waiting on the new goal.
pub struct AddGoalInstance;

impl SignalHandler<Agent> for AddGoalInstance {
    fn handle(&mut self, agent: &mut Agent, signal: SignalId) -> miette::Result<()> {
        let root = signal_root(agent, signal)?;
        let theme = agent
            .graph
            .first_frame(root, slot::THEME)
            .ok_or(AgentError::MissingSlot {
                frame_id: root.get(),
                slot: slot::THEME,
            })?;
        let template = agent.graph.label(theme);

        let bindings: Vec<(String, Filler)> = agent
            .graph
            .frame_fillers(root, slot::HAS_BINDING)
            .into_iter()
            .filter_map(|b| {
                let name = agent.graph.text(b, slot::BIND_TO)?;
                let value = agent.graph.fillers(b, slot::REALIZED).first()?;
                Some((name.to_string(), value.clone()))
            })
            .collect();
        let subgoal_of = agent.graph.frame_fillers(root, slot::SUBGOAL_OF);

        add_goal_instance(agent, &template, &bindings, &subgoal_of)?;
        Ok(())
    }
}

/// Handles `RELEASE-EFFECTOR` directives. THEME names the effector.
pub struct ReleaseEffector;

impl SignalHandler<Agent> for ReleaseEffector {
    fn validate(&self, agent: &Agent, signal: SignalId) -> bool {
        let Some(signal) = agent.signals.get(signal) else {
            return false;
        };
        agent
            .graph
            .first_frame(signal.root, slot::THEME)
            .is_some_and(|effector| agent.effectors.get(effector).is_some())
    }

    fn handle(&mut self, agent: &mut Agent, signal: SignalId) -> miette::Result<()> {
        let root = signal_root(agent, signal)?;
        let effector = agent
            .graph
            .first_frame(root, slot::THEME)
            .ok_or(AgentError::MissingSlot {
                frame_id: root.get(),
                slot: slot::THEME,
            })?;
        agent
            .effectors
            .release(&mut agent.graph, &agent.signals, effector)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Proactive tasks
// ---------------------------------------------------------------------------

/// One scheduler pass per heartbeat.
pub struct ProcessAgenda;

impl ProactiveTask<Agent> for ProcessAgenda {
    fn run(&mut self, agent: &mut Agent) -> miette::Result<()> {
        process_agenda(agent)?;
        Ok(())
    }
}

/// Update evergreens and attach their pending resolutions.
pub struct UpdateEvergreens;

impl ProactiveTask<Agent> for UpdateEvergreens {
    fn run(&mut self, agent: &mut Agent) -> miette::Result<()> {
        agent
            .evergreens
            .update(&mut agent.graph, agent.templates.as_ref(), &mut agent.agenda)?;
        for goal in agent.evergreens.pending_resolutions() {
            if !agent.agenda.is_attached(goal) {
                agent.agenda.add_goal(goal)?;
                agent.summary.evergreens_attached += 1;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Effector actions
// ---------------------------------------------------------------------------

/// Logs the job and reports it done.
pub struct TraceAction;

impl TraceAction {
    pub const KIND: &'static str = "trace";
}

impl EffectorAction for TraceAction {
    fn run(&mut self, job: &EffectorJob) -> miette::Result<Completion> {
        tracing::info!(
            effector = %job.effector_label,
            step = %job.root_label,
            action = %job.action,
            "effector job"
        );
        Ok(Completion::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Comparator, Effector, LtGoal, ObservableValue};
    use crate::config::AgentConfig;
    use crate::graph::PHASE_END;
    use crate::signal::ReportStatus;

    const PACK: &str = r#"
        [concepts]
        CUP = ["OBJECT"]
        HAND = ["EFFECTOR"]
        BATTERY = ["OBJECT"]

        [[goals]]
        name = "TAKE"
        variables = ["object"]
        [[goals.plans]]
        concept = "GRAB"
        roles = { THEME = "$object" }

        [[goals]]
        name = "RECHARGE"
        [[goals.plans]]
        concept = "CHARGE"
    "#;

    fn agent() -> Agent {
        let mut agent = Agent::new("ROBOT-1", AgentConfig::default()).unwrap();
        agent.load_pack_str(PACK).unwrap();
        agent
    }

    fn directive(agent: &mut Agent, concept_label: &str) -> crate::symbol::SymbolId {
        let scope = agent.graph.next_scope("MMR");
        let c = agent.graph.require_concept(concept_label).unwrap();
        agent.graph.instance_of(c, scope).unwrap()
    }

    #[test]
    fn add_goal_instance_directive_binds_variables() {
        let mut agent = agent();
        let cup = agent.graph().lookup_concept("CUP").unwrap();
        let root = directive(&mut agent, concept::ADD_GOAL_INSTANCE);
        let take = agent.templates.template_concept("TAKE").unwrap();
        agent.graph.set_one(root, slot::THEME, take).unwrap();
        let scope = agent.graph.get(root).unwrap().scope.clone();
        let binding_concept = agent.graph.require_concept(concept::BINDING).unwrap();
        let b = agent.graph.instance_of(binding_concept, scope).unwrap();
        agent.graph.set_one(b, slot::BIND_TO, "object").unwrap();
        agent.graph.set_one(b, slot::REALIZED, cup).unwrap();
        agent.graph.push(root, slot::HAS_BINDING, b).unwrap();

        let signal = agent.input(root).unwrap();

        assert_eq!(agent.agenda().goals().len(), 1);
        let goal = agent.agenda().goal(agent.agenda().goals()[0]).unwrap();
        assert_eq!(goal.variable("object"), Some(&Filler::Frame(cup)));
        assert_eq!(goal.subgoal_of, None);
        let report = agent.signals().get(signal).unwrap().report_for(kind::ADD_GOAL_INSTANCE).unwrap();
        assert_eq!(report.status, ReportStatus::Finished);
        assert!(!report.is_faulted());
    }

    #[test]
    fn missing_theme_is_a_contained_fault() {
        let mut agent = agent();
        let root = directive(&mut agent, concept::ADD_GOAL_INSTANCE);
        let signal = agent.input(root).unwrap();

        let report = agent.signals().get(signal).unwrap().report_for(kind::ADD_GOAL_INSTANCE).unwrap();
        assert_eq!(report.status, ReportStatus::Finished);
        assert_eq!(report.faults[0].code, "delib::agent::missing_slot");
        assert!(agent.agenda().goals().is_empty());
        assert_eq!(agent.summary.faults, 1);
    }

    #[test]
    fn release_directive_frees_effector_and_ends_step() {
        let mut agent = agent();
        let hand = agent.graph().lookup_concept("HAND").unwrap();
        let effector = Effector::create(&mut agent.graph, "LEFT", hand, TraceAction::KIND).unwrap();
        let left = agent.register_effector(effector);
        let goal = agent.add_goal_instance("TAKE", &[]).unwrap();
        let step = agent.agenda().goal_plans(goal)[0];
        let signal = agent.signals.build(&mut agent.graph, step, Scope::new("EXE")).unwrap();
        agent.effectors.reserve(left, signal).unwrap();

        agent.release(left).unwrap();

        assert!(agent.effectors().get(left).unwrap().is_available());
        assert_eq!(agent.graph().text(step, slot::PHASE), Some(PHASE_END));
    }

    #[test]
    fn release_of_unknown_effector_is_refused() {
        let mut agent = agent();
        let cup = agent.graph().lookup_concept("CUP").unwrap();
        let signal = agent.release(cup).unwrap();
        let report = agent.signals().get(signal).unwrap().report_for(kind::RELEASE_EFFECTOR).unwrap();
        assert_eq!(report.validation, Some(false));
        assert_eq!(report.status, ReportStatus::Finished);
    }

    #[test]
    fn update_evergreens_attaches_pending_resolution_once() {
        let mut agent = agent();
        let battery = agent.graph().lookup_concept("BATTERY").unwrap();
        agent.graph.set_one(battery, "LEVEL", 0.1).unwrap();
        agent.add_evergreen(LtGoal::new(
            battery,
            "LEVEL",
            ObservableValue::single(Comparator::Gte, 0.5),
            "RECHARGE",
        ));

        UpdateEvergreens.run(&mut agent).unwrap();
        assert_eq!(agent.agenda().goals().len(), 1);
        assert_eq!(agent.summary.evergreens_attached, 1);

        UpdateEvergreens.run(&mut agent).unwrap();
        assert_eq!(agent.agenda().goals().len(), 1);
        assert_eq!(agent.summary.evergreens_attached, 1);
    }

    #[test]
    fn trace_action_is_done() {
        let job = EffectorJob {
            effector: crate::symbol::SymbolId::new(1).unwrap(),
            effector_label: "LEFT".into(),
            signal: crate::symbol::SymbolId::new(2).unwrap(),
            root: crate::symbol::SymbolId::new(3).unwrap(),
            root_label: "GRAB.3".into(),
            action: TraceAction::KIND.into(),
            interrupt: None,
        };
        assert_eq!(TraceAction.run(&job).unwrap(), Completion::Done);
    }

    #[test]
    fn builtins_cannot_be_registered_twice() {
        let mut agent = agent();
        let err = agent
            .executables
            .register_action(TraceAction::KIND, || Box::new(TraceAction))
            .unwrap_err();
        assert!(err.to_string().contains("trace"));
    }
}
