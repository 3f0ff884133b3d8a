//! The scheduler loop (ProcessAgenda): one pass over the agenda per heartbeat.
//!
//! Phases, in order:
//!
//! 1. **Impasses**: unblock or block steps, spawning subgoals
//! 2. **Generate**: one scored option per plan's next PLANNED step
//! 3. **Select**: arbitrate options over effectors
//! 4. **Queue**: dispatch selected steps as signals
//! 5. **Cleanup**: expire options, roll completion up from steps to goals
//!
//! All phases run under one `&mut Agent`, so a pass is atomic.

use serde::Serialize;

use crate::dispatch::EffectorJob;
use crate::graph::Scope;

use super::agent::Agent;
use super::arbitration::{EffectorAssignment, OptionStatus, generate_options, select_options};
use super::error::AgentResult;
use super::goal::GoalStatus;
use super::impasse::handle_impasses;
use super::plan::{PlanStatus, StepStatus};

/// Counters for one heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub impasses_fired: usize,
    pub options_generated: usize,
    pub options_selected: usize,
    pub effector_jobs: usize,
    pub handled_inline: usize,
    pub steps_finished: usize,
    pub goals_satisfied: usize,
    pub evergreens_attached: usize,
    /// Contained executable faults and failed reports.
    pub faults: usize,
}

/// Run one full agenda pass.
pub fn process_agenda(agent: &mut Agent) -> AgentResult<()> {
    let fired = handle_impasses(agent)?;
    let generated = generate_options(agent)?;
    let assignment = select_options(agent)?;
    queue_options(agent, &assignment)?;
    cleanup(agent)?;

    agent.summary.impasses_fired += fired;
    agent.summary.options_generated += generated;
    Ok(())
}

/// Dispatch every CURRENT selected option.
///
/// Each step is wrapped as a signal (scope `EXE`). Steps with an assigned
/// effector reserve it and go out as an [`EffectorJob`]; the rest are handled
/// in-line.
pub fn queue_options(agent: &mut Agent, assignment: &EffectorAssignment) -> AgentResult<()> {
    let selected: Vec<_> = agent
        .agenda
        .options()
        .into_iter()
        .filter_map(|id| agent.agenda.option(id))
        .filter(|o| o.selected)
        .map(|o| (o.id, o.step))
        .collect();

    for (option_id, step_id) in selected {
        agent.summary.options_selected += 1;
        let signal = agent.signals.build(&mut agent.graph, step_id, Scope::new("EXE"))?;
        agent.agenda.require_step_mut(step_id)?.signal = Some(signal);

        match assignment.get(&option_id) {
            Some(&effector_id) => {
                agent.effectors.reserve(effector_id, signal)?;
                agent.agenda.require_step_mut(step_id)?.effector = Some(effector_id);
                let Some(effector) = agent.effectors.get(effector_id) else {
                    continue;
                };
                let job = EffectorJob {
                    effector: effector_id,
                    effector_label: effector.label.clone(),
                    signal,
                    root: step_id,
                    root_label: agent.graph.label(step_id),
                    action: effector.executable.clone(),
                    interrupt: effector.interrupt.clone(),
                };
                agent.output.dispatch(job);
                agent.summary.effector_jobs += 1;
            }
            None => {
                agent.agenda.require_step_mut(step_id)?.effector = None;
                agent.handle(signal)?;
                agent.summary.handled_inline += 1;
            }
        }
    }
    Ok(())
}

/// Expire options and reconcile completion: steps via the oracle, plans
/// when all steps finish, goals when any plan finishes.
pub fn cleanup(agent: &mut Agent) -> AgentResult<()> {
    for id in agent.agenda.options() {
        if let Some(option) = agent.agenda.option_mut(id) {
            option.status = OptionStatus::Expired;
        }
    }

    for goal_id in agent.agenda.goals().to_vec() {
        let mut any_plan_finished = false;
        for plan_id in agent.agenda.goal_plans(goal_id).to_vec() {
            let mut all_finished = true;
            for step_id in agent.agenda.plan_steps(plan_id).to_vec() {
                let step = agent.agenda.require_step(step_id)?;
                if step.is_finished() {
                    continue;
                }
                if agent.oracle.holds(&agent.graph, step_id) {
                    agent.agenda.require_step_mut(step_id)?.set_status(StepStatus::Finished);
                    agent.summary.steps_finished += 1;
                } else {
                    all_finished = false;
                }
            }
            if let Some(plan) = agent.agenda.plan_mut(plan_id) {
                if all_finished && plan.status != PlanStatus::Finished {
                    tracing::debug!(plan = %plan.label, "plan finished");
                    plan.status = PlanStatus::Finished;
                }
                any_plan_finished |= plan.status == PlanStatus::Finished;
            }
        }

        let goal = agent.agenda.require_goal_mut(goal_id)?;
        if any_plan_finished && goal.status != GoalStatus::Satisfied {
            goal.status = GoalStatus::Satisfied;
            tracing::info!(goal = %goal.label, "goal satisfied");
            agent.summary.goals_satisfied += 1;
        }
    }
    Ok(())
}
