//! Plans and steps.
//!
//! A plan is an event instance whose leaf events (found by expanding
//! `HAS-EVENT-AS-PART` depth-first, left to right) are its steps. A step is
//! the leaf event itself: the step id is the event's frame id.

use std::collections::HashSet;

use serde::Serialize;

use crate::dispatch::Operable;
use crate::graph::{FrameGraph, slot};
use crate::signal::SignalId;
use crate::symbol::SymbolId;

use super::effector::EffectorId;
use super::goal::GoalId;
use super::impasse::Impasse;

pub type PlanId = SymbolId;
pub type StepId = SymbolId;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    #[default]
    Pending,
    Finished,
}

/// Status of an individual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Waiting to be scheduled.
    #[default]
    Planned,
    /// Selected and dispatched.
    Executing,
    /// Blocked until a subgoal is satisfied.
    Impassed,
    /// Another agent is expected to perform it.
    Deferred,
    Finished,
}

/// A way of achieving a goal.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: PlanId,
    pub goal: GoalId,
    pub label: String,
    pub status: PlanStatus,
    /// In [0, 1]; lower is better.
    pub cost: f64,
    pub steps: Vec<StepId>,
}

/// A schedulable unit of a plan.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: StepId,
    pub goal: GoalId,
    pub plan: PlanId,
    pub label: String,
    pub status: StepStatus,
    pub impasses: Vec<Impasse>,
    pub subgoals: Vec<GoalId>,
    /// Signal generated when the step was last dispatched.
    pub signal: Option<SignalId>,
    /// Effector serving the step, when dispatched to one.
    pub effector: Option<EffectorId>,
}

impl Step {
    pub fn new(id: StepId, goal: GoalId, plan: PlanId, label: impl Into<String>) -> Self {
        Self {
            id,
            goal,
            plan,
            label: label.into(),
            status: StepStatus::default(),
            impasses: Vec::new(),
            subgoals: Vec::new(),
            signal: None,
            effector: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == StepStatus::Finished
    }

    pub fn set_status(&mut self, status: StepStatus) {
        if self.status != status {
            tracing::debug!(step = %self.label, from = ?self.status, to = ?status, "step transition");
            self.status = status;
        }
    }
}

impl Operable for Step {
    fn root(&self) -> SymbolId {
        self.id
    }
}

/// Leaf events of `event`, depth-first and left to right.
///
/// An event with no parts is its own single step. Events reached twice are
/// skipped, so cyclic part structures terminate.
pub fn flatten(graph: &FrameGraph, event: SymbolId) -> Vec<StepId> {
    fn walk(graph: &FrameGraph, event: SymbolId, seen: &mut HashSet<SymbolId>, out: &mut Vec<StepId>) {
        if !seen.insert(event) {
            return;
        }
        let parts = graph.frame_fillers(event, slot::HAS_EVENT_AS_PART);
        if parts.is_empty() {
            out.push(event);
            return;
        }
        for part in parts {
            walk(graph, part, seen, out);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    walk(graph, event, &mut seen, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scope;

    #[test]
    fn flatten_is_depth_first_left_to_right() {
        let mut g = FrameGraph::new();
        let ev = g.concept("EVENT").unwrap();
        let scope = Scope::new("AGENDA");
        let root = g.instance_of(ev, scope.clone()).unwrap();
        let a = g.instance_of(ev, scope.clone()).unwrap();
        let a1 = g.instance_of(ev, scope.clone()).unwrap();
        let a2 = g.instance_of(ev, scope.clone()).unwrap();
        let b = g.instance_of(ev, scope.clone()).unwrap();
        g.push(root, slot::HAS_EVENT_AS_PART, a).unwrap();
        g.push(root, slot::HAS_EVENT_AS_PART, b).unwrap();
        g.push(a, slot::HAS_EVENT_AS_PART, a1).unwrap();
        g.push(a, slot::HAS_EVENT_AS_PART, a2).unwrap();

        assert_eq!(flatten(&g, root), vec![a1, a2, b]);
        assert_eq!(flatten(&g, b), vec![b]);
    }

    #[test]
    fn flatten_skips_revisited_events() {
        let mut g = FrameGraph::new();
        let ev = g.concept("EVENT").unwrap();
        let scope = Scope::new("AGENDA");
        let root = g.instance_of(ev, scope.clone()).unwrap();
        let a = g.instance_of(ev, scope.clone()).unwrap();
        let leaf = g.instance_of(ev, scope.clone()).unwrap();
        g.push(root, slot::HAS_EVENT_AS_PART, a).unwrap();
        g.push(a, slot::HAS_EVENT_AS_PART, root).unwrap();
        g.push(a, slot::HAS_EVENT_AS_PART, leaf).unwrap();
        g.push(root, slot::HAS_EVENT_AS_PART, leaf).unwrap();

        assert_eq!(flatten(&g, root), vec![leaf]);
    }

    #[test]
    fn step_transitions() {
        let id = SymbolId::new(7).unwrap();
        let mut step = Step::new(id, id, id, "HOLD.7");
        assert_eq!(step.status, StepStatus::Planned);
        step.set_status(StepStatus::Finished);
        assert!(step.is_finished());
        assert_eq!(step.root(), id);
    }
}
