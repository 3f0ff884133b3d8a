//! Goals: what the agent is trying to bring about.
//!
//! A goal is an instance of a goal template (a `GOAL` concept). Its typed
//! record lives in the agenda arena under the same id as its frame.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::graph::Filler;
use crate::symbol::SymbolId;

use super::plan::{PlanId, StepId};

/// Goals share the frame id space.
pub type GoalId = SymbolId;

/// Status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    #[default]
    Active,
    Abandoned,
    Satisfied,
}

impl GoalStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Abandoned => "ABANDONED",
            Self::Satisfied => "SATISFIED",
        }
    }

    /// A goal that will not change status again.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Abandoned | Self::Satisfied)
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// A goal instance on the agenda.
#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub id: GoalId,
    pub label: String,
    pub status: GoalStatus,
    /// In [0, 1]; higher is more urgent.
    pub priority: f64,
    pub plans: Vec<PlanId>,
    /// Variables realized at instantiation.
    pub variables: BTreeMap<String, Filler>,
    /// The step this goal was spawned to unblock, if any.
    pub subgoal_of: Option<StepId>,
}

impl Goal {
    pub fn new(id: GoalId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            status: GoalStatus::default(),
            priority: 0.5,
            plans: Vec::new(),
            variables: BTreeMap::new(),
            subgoal_of: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    pub fn variable(&self, name: &str) -> Option<&Filler> {
        self.variables.get(name)
    }

    pub fn abandon(&mut self) {
        if !self.status.is_closed() {
            tracing::info!(goal = %self.label, "goal abandoned");
            self.status = GoalStatus::Abandoned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_goal_defaults() {
        let goal = Goal::new(SymbolId::new(3).unwrap(), "TAKE-OBJECT.3");
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(goal.priority, 0.5);
        assert!(goal.plans.is_empty());
        assert!(goal.variable("object").is_none());
    }

    #[test]
    fn abandon_does_not_reopen_satisfied_goals() {
        let mut goal = Goal::new(SymbolId::new(3).unwrap(), "TAKE-OBJECT.3");
        goal.status = GoalStatus::Satisfied;
        goal.abandon();
        assert_eq!(goal.status, GoalStatus::Satisfied);

        let mut other = Goal::new(SymbolId::new(4).unwrap(), "TAKE-OBJECT.4");
        other.abandon();
        assert_eq!(other.status.to_string(), "ABANDONED");
    }
}
