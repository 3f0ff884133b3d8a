//! Serializable read projection of an agent, for hosts and the CLI.

use serde::Serialize;

use crate::signal::{Report, SignalStatus};

use super::agent::Agent;
use super::arbitration::OptionStatus;
use super::effector::EffectorStatus;
use super::evergreen::LtGoalStatus;
use super::goal::GoalStatus;
use super::impasse::{Binding, Impasse};
use super::plan::{PlanStatus, StepStatus};
use super::scheduler::TickSummary;

#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub identity: String,
    pub tick: u64,
    pub summary: TickSummary,
    pub goals: Vec<GoalView>,
    pub options: Vec<OptionView>,
    pub effectors: Vec<EffectorView>,
    pub evergreens: Vec<EvergreenView>,
    pub signals: Vec<SignalView>,
    pub heartbeat: Vec<Report>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalView {
    pub id: u64,
    pub label: String,
    pub status: GoalStatus,
    pub priority: f64,
    /// Attached goals are visited by the scheduler.
    pub attached: bool,
    pub subgoal_of: Option<u64>,
    pub plans: Vec<PlanView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    pub id: u64,
    pub label: String,
    pub status: PlanStatus,
    pub cost: f64,
    pub steps: Vec<StepView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub id: u64,
    pub label: String,
    pub status: StepStatus,
    pub impasses: Vec<ImpasseView>,
    pub subgoals: Vec<u64>,
    pub signal: Option<u64>,
    pub effector: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpasseView {
    pub name: String,
    pub detector: String,
    pub resolutions: Vec<ResolutionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionView {
    /// Goal template requested when the impasse fires.
    pub goal: String,
    pub bindings: Vec<Binding>,
}

impl From<&Impasse> for ImpasseView {
    fn from(impasse: &Impasse) -> Self {
        Self {
            name: impasse.name.clone(),
            detector: impasse.detector.clone(),
            resolutions: impasse
                .resolutions
                .iter()
                .map(|r| ResolutionView {
                    goal: r.goal.clone(),
                    bindings: r.bindings.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionView {
    pub id: u64,
    pub step: String,
    pub status: OptionStatus,
    pub selected: bool,
    pub score: f64,
    pub timestamp: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectorView {
    pub id: u64,
    pub label: String,
    pub status: EffectorStatus,
    pub reserved_to: Option<u64>,
    pub executable: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvergreenView {
    pub name: Option<String>,
    pub subject: String,
    pub slot: String,
    pub status: LtGoalStatus,
    pub pending: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalView {
    pub id: u64,
    pub root: String,
    pub scope: String,
    pub status: SignalStatus,
    pub reports: Vec<Report>,
}

impl AgentSnapshot {
    /// Pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Agent {
    /// Project the agent's current state: attached goals in attachment
    /// order, then evergreen resolutions not attached yet.
    pub fn snapshot(&self) -> AgentSnapshot {
        let graph = &self.graph;
        let agenda = &self.agenda;

        let mut goal_ids: Vec<_> = agenda.goals().to_vec();
        for evergreen in self.evergreens.pending_resolutions() {
            if !goal_ids.contains(&evergreen) {
                goal_ids.push(evergreen);
            }
        }

        let goals = goal_ids
            .iter()
            .filter_map(|id| agenda.goal(*id))
            .map(|goal| GoalView {
                id: goal.id.get(),
                label: goal.label.clone(),
                status: goal.status,
                priority: goal.priority,
                attached: agenda.is_attached(goal.id),
                subgoal_of: goal.subgoal_of.map(|s| s.get()),
                plans: goal
                    .plans
                    .iter()
                    .filter_map(|p| agenda.plan(*p))
                    .map(|plan| PlanView {
                        id: plan.id.get(),
                        label: plan.label.clone(),
                        status: plan.status,
                        cost: plan.cost,
                        steps: plan
                            .steps
                            .iter()
                            .filter_map(|s| agenda.step(*s))
                            .map(|step| StepView {
                                id: step.id.get(),
                                label: step.label.clone(),
                                status: step.status,
                                impasses: step.impasses.iter().map(ImpasseView::from).collect(),
                                subgoals: step.subgoals.iter().map(|g| g.get()).collect(),
                                signal: step.signal.map(|s| s.get()),
                                effector: step.effector.map(|e| graph.label(e)),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        let options = agenda
            .all_options()
            .iter()
            .filter_map(|id| agenda.option(*id))
            .map(|o| OptionView {
                id: o.id.get(),
                step: graph.label(o.step),
                status: o.status,
                selected: o.selected,
                score: o.score,
                timestamp: o.timestamp,
            })
            .collect();

        let effectors = self
            .effectors
            .iter()
            .map(|e| EffectorView {
                id: e.id.get(),
                label: e.label.clone(),
                status: e.status,
                reserved_to: e.reserved_to.map(|s| s.get()),
                executable: e.executable.to_string(),
            })
            .collect();

        let evergreens = self
            .evergreens
            .iter()
            .map(|lt| EvergreenView {
                name: lt.name.clone(),
                subject: graph.label(lt.subject),
                slot: lt.slot.clone(),
                status: lt.status,
                pending: lt.pending.map(|g| g.get()),
            })
            .collect();

        let signals = self
            .signals
            .iter()
            .map(|s| SignalView {
                id: s.id.get(),
                root: graph.label(s.root),
                scope: s.scope.name().to_string(),
                status: s.status,
                reports: s.reports.clone(),
            })
            .collect();

        AgentSnapshot {
            identity: graph.label(self.identity),
            tick: self.tick_count,
            summary: self.summary.clone(),
            goals,
            options,
            effectors,
            evergreens,
            signals,
            heartbeat: self.heartbeat_reports.clone(),
        }
    }
}
