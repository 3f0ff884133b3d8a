//! The agenda: attached goals, options, and the arena holding their records.
//!
//! Records are never removed. Goals are *adopted* into the arena (their
//! plans flattened into steps) and separately *attached*: only attached
//! goals are visited by the scheduler. Evergreen resolutions are adopted
//! first and attached later.

use std::collections::{BTreeMap, HashMap};

use crate::graph::{FrameGraph, concept, slot};
use crate::symbol::SymbolId;

use super::arbitration::{AgendaOption, OptionId, OptionStatus};
use super::error::{AgentError, AgentResult};
use super::goal::{Goal, GoalId};
use super::impasse::Impasse;
use super::plan::{Plan, PlanId, PlanStatus, Step, StepId, flatten};

/// Goals, plans, steps and options, keyed by frame id.
#[derive(Debug, Default)]
pub struct Agenda {
    goals: Vec<GoalId>,
    options: Vec<OptionId>,
    goal_arena: HashMap<GoalId, Goal>,
    plan_arena: HashMap<PlanId, Plan>,
    step_arena: HashMap<StepId, Step>,
    option_arena: HashMap<OptionId, AgendaOption>,
}

impl Agenda {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attached goals, in attachment order.
    pub fn goals(&self) -> &[GoalId] {
        &self.goals
    }

    pub fn is_attached(&self, goal: GoalId) -> bool {
        self.goals.contains(&goal)
    }

    /// Attach an adopted goal. Attaching twice is a no-op.
    pub fn add_goal(&mut self, goal: GoalId) -> AgentResult<()> {
        let record = self.require_goal(goal)?;
        if !self.goals.contains(&goal) {
            tracing::debug!(goal = %record.label, "goal attached");
            self.goals.push(goal);
        }
        Ok(())
    }

    /// CURRENT options, in insertion order.
    pub fn options(&self) -> Vec<OptionId> {
        self.options
            .iter()
            .copied()
            .filter(|id| {
                self.option_arena
                    .get(id)
                    .is_some_and(|o| o.status == OptionStatus::Current)
            })
            .collect()
    }

    /// Every option ever added, expired ones included.
    pub fn all_options(&self) -> &[OptionId] {
        &self.options
    }

    pub fn add_option(&mut self, option: AgendaOption) -> OptionId {
        let id = option.id;
        if self.option_arena.insert(id, option).is_none() {
            self.options.push(id);
        }
        id
    }

    // -----------------------------------------------------------------------
    // Arena access
    // -----------------------------------------------------------------------

    pub fn goal(&self, id: GoalId) -> Option<&Goal> {
        self.goal_arena.get(&id)
    }

    pub fn goal_mut(&mut self, id: GoalId) -> Option<&mut Goal> {
        self.goal_arena.get_mut(&id)
    }

    pub fn plan(&self, id: PlanId) -> Option<&Plan> {
        self.plan_arena.get(&id)
    }

    pub fn plan_mut(&mut self, id: PlanId) -> Option<&mut Plan> {
        self.plan_arena.get_mut(&id)
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.step_arena.get(&id)
    }

    pub fn step_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.step_arena.get_mut(&id)
    }

    pub fn option(&self, id: OptionId) -> Option<&AgendaOption> {
        self.option_arena.get(&id)
    }

    pub fn option_mut(&mut self, id: OptionId) -> Option<&mut AgendaOption> {
        self.option_arena.get_mut(&id)
    }

    pub fn require_goal(&self, id: GoalId) -> AgentResult<&Goal> {
        self.goal(id)
            .ok_or(AgentError::GoalNotFound { goal_id: id.get() })
    }

    pub fn require_goal_mut(&mut self, id: GoalId) -> AgentResult<&mut Goal> {
        self.goal_mut(id)
            .ok_or(AgentError::GoalNotFound { goal_id: id.get() })
    }

    pub fn require_step(&self, id: StepId) -> AgentResult<&Step> {
        self.step(id)
            .ok_or(AgentError::StepNotFound { step_id: id.get() })
    }

    pub fn require_step_mut(&mut self, id: StepId) -> AgentResult<&mut Step> {
        self.step_mut(id)
            .ok_or(AgentError::StepNotFound { step_id: id.get() })
    }

    /// Steps of a plan, in order. Empty for an unknown plan.
    pub fn plan_steps(&self, plan: PlanId) -> &[StepId] {
        self.plan(plan).map(|p| p.steps.as_slice()).unwrap_or(&[])
    }

    /// Plans of a goal, in order. Empty for an unknown goal.
    pub fn goal_plans(&self, goal: GoalId) -> &[PlanId] {
        self.goal(goal).map(|g| g.plans.as_slice()).unwrap_or(&[])
    }

    // -----------------------------------------------------------------------
    // Adoption
    // -----------------------------------------------------------------------

    /// Read a goal instance frame into typed records without attaching it.
    ///
    /// Priority, cost and variables come from the frame's slots; each plan is
    /// flattened into steps. Adopting an already-adopted goal returns it
    /// unchanged.
    pub fn adopt_goal(&mut self, graph: &FrameGraph, goal_frame: SymbolId) -> AgentResult<GoalId> {
        if self.goal_arena.contains_key(&goal_frame) {
            return Ok(goal_frame);
        }
        let frame = graph.get(goal_frame)?;
        if !graph.is_a_label(goal_frame, concept::GOAL) {
            return Err(AgentError::NotAGoal {
                frame_id: goal_frame.get(),
                label: frame.label.clone(),
            });
        }

        let mut goal = Goal::new(goal_frame, frame.label.clone());
        goal.priority = graph.number(goal_frame, slot::PRIORITY).unwrap_or(0.5);
        goal.variables = read_variables(graph, goal_frame);

        for plan_frame in graph.frame_fillers(goal_frame, slot::HAS_PLAN) {
            let steps = flatten(graph, plan_frame);
            for &step_id in &steps {
                let mut step = Step::new(step_id, goal_frame, plan_frame, graph.label(step_id));
                step.impasses = graph
                    .frame_fillers(step_id, slot::HAS_IMPASSE)
                    .into_iter()
                    .map(|i| Impasse::read(graph, i))
                    .collect();
                self.step_arena.insert(step_id, step);
            }
            self.plan_arena.insert(
                plan_frame,
                Plan {
                    id: plan_frame,
                    goal: goal_frame,
                    label: graph.label(plan_frame),
                    status: PlanStatus::default(),
                    cost: graph.number(plan_frame, slot::COST).unwrap_or(0.5),
                    steps,
                },
            );
            goal.plans.push(plan_frame);
        }

        tracing::debug!(goal = %goal.label, plans = goal.plans.len(), "goal adopted");
        self.goal_arena.insert(goal_frame, goal);
        Ok(goal_frame)
    }
}

/// `DEFINED → REALIZED` pairs of a goal's varmaps. Unrealized variables are skipped.
fn read_variables(graph: &FrameGraph, goal: SymbolId) -> BTreeMap<String, crate::graph::Filler> {
    graph
        .frame_fillers(goal, slot::HAS_VARMAP)
        .into_iter()
        .filter_map(|varmap| {
            let name = graph.text(varmap, slot::DEFINED)?;
            let value = graph.fillers(varmap, slot::REALIZED).first()?;
            Some((name.to_string(), value.clone()))
        })
        .collect()
}
