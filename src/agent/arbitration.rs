//! Option arbitration: turning next steps into scored options and picking
//! which ones run under effector constraints.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::dispatch::Operable;
use crate::graph::{Filler, Scope, concept, slot};
use crate::symbol::{SymbolId, now_nanos};

use super::agent::Agent;
use super::effector::EffectorId;
use super::error::AgentResult;
use super::goal::GoalId;
use super::plan::{PlanId, StepId, StepStatus};

/// Options share the frame id space.
pub type OptionId = SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionStatus {
    #[default]
    Current,
    Expired,
}

/// A candidate: run this step of this plan for this goal, now.
#[derive(Debug, Clone, Serialize)]
pub struct AgendaOption {
    pub id: OptionId,
    pub goal: GoalId,
    pub plan: PlanId,
    pub step: StepId,
    /// Nanoseconds since the epoch; shared by every option of one tick.
    pub timestamp: u128,
    pub status: OptionStatus,
    pub selected: bool,
    pub score: f64,
}

impl AgendaOption {
    pub fn new(id: OptionId, goal: GoalId, plan: PlanId, step: StepId, timestamp: u128) -> Self {
        Self {
            id,
            goal,
            plan,
            step,
            timestamp,
            status: OptionStatus::Current,
            selected: false,
            score: 0.0,
        }
    }
}

/// Option → effector assignments made by one selection pass.
pub type EffectorAssignment = HashMap<OptionId, EffectorId>;

/// Create one option per plan whose first unfinished step is PLANNED.
///
/// Returns the number of options created.
pub fn generate_options(agent: &mut Agent) -> AgentResult<usize> {
    let timestamp = now_nanos();
    let option_concept = agent.graph.concept(concept::OPTION)?;
    let mut created = 0;

    for goal in agent.agenda.goals().to_vec() {
        let priority = agent.agenda.require_goal(goal)?.priority;
        for plan_id in agent.agenda.goal_plans(goal).to_vec() {
            let Some(plan) = agent.agenda.plan(plan_id) else {
                continue;
            };
            let cost = plan.cost;
            let next = plan
                .steps
                .iter()
                .filter_map(|s| agent.agenda.step(*s))
                .find(|s| !s.is_finished());
            let Some(step) = next else {
                continue;
            };
            if step.status != StepStatus::Planned {
                continue;
            }
            let step_id = step.id;

            let id = agent.graph.instance_of(option_concept, Scope::new("AGENDA"))?;
            let mut option = AgendaOption::new(id, goal, plan_id, step_id, timestamp);
            option.score = priority * agent.config.priority_weight - cost * agent.config.cost_weight;
            tracing::debug!(step = %agent.graph.label(step_id), score = option.score, "option generated");
            agent.agenda.add_option(option);
            created += 1;
        }
    }
    Ok(created)
}

/// Whether the step names an agent other than this one.
fn performed_by_other(agent: &Agent, step: StepId) -> bool {
    let performers = agent.graph.fillers(step, slot::AGENT);
    !performers.is_empty()
        && !performers.iter().any(|p| match p {
            Filler::Frame(f) => agent.graph.is_a(agent.identity, *f),
            _ => false,
        })
}

/// Select CURRENT options by descending score, first-fit over effectors.
///
/// Steps meant for another agent are DEFERRED. Steps needing an effector
/// type get the first available one not already claimed in this pass, or
/// stay unselected.
pub fn select_options(agent: &mut Agent) -> AgentResult<EffectorAssignment> {
    let mut options: Vec<(OptionId, StepId, f64)> = agent
        .agenda
        .options()
        .into_iter()
        .filter_map(|id| agent.agenda.option(id).map(|o| (id, o.step, o.score)))
        .collect();
    options.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut assignment = EffectorAssignment::new();
    let mut claimed: HashSet<EffectorId> = HashSet::new();

    for (option_id, step_id, _) in options {
        if performed_by_other(agent, step_id) {
            agent.agenda.require_step_mut(step_id)?.set_status(StepStatus::Deferred);
            continue;
        }

        let required = agent
            .agenda
            .require_step(step_id)?
            .required_effector(&agent.graph, &agent.operations);

        let chosen = match required {
            None => None,
            Some(effector_type) => {
                let free = agent
                    .effectors
                    .list_available(&agent.graph, effector_type)
                    .into_iter()
                    .map(|e| e.id)
                    .find(|id| !claimed.contains(id));
                match free {
                    Some(effector) => Some(effector),
                    None => {
                        tracing::debug!(
                            step = %agent.graph.label(step_id),
                            effector_type = %agent.graph.label(effector_type),
                            "no free effector, option left unselected"
                        );
                        continue;
                    }
                }
            }
        };

        if let Some(option) = agent.agenda.option_mut(option_id) {
            option.selected = true;
        }
        agent.agenda.require_step_mut(step_id)?.set_status(StepStatus::Executing);
        if let Some(effector) = chosen {
            claimed.insert(effector);
            assignment.insert(option_id, effector);
        }
    }
    Ok(assignment)
}
