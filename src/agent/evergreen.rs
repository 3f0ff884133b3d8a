//! Evergreen (homeostatic) goals: standing conditions the agent keeps true.
//!
//! An [`LtGoal`] watches one slot of one frame. Whenever its target
//! observation fails and no resolution is already in flight, it
//! instantiates its resolution template and keeps the new goal as
//! *pending* until that goal closes (SATISFIED or ABANDONED).

use serde::{Deserialize, Serialize};

use crate::graph::{Filler, FrameGraph, Scope};
use crate::symbol::SymbolId;
use crate::template::Instantiate;

use super::agenda::Agenda;
use super::error::{AgentResult, EvergreenError};
use super::goal::GoalId;

/// Result type for observations.
pub type EvergreenResult<T> = std::result::Result<T, EvergreenError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    Equals,
    Gt,
    Gte,
    Lt,
    Lte,
    Not,
    And,
    Or,
}

impl Comparator {
    fn is_composite(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    fn numeric(self, observed: f64, target: f64) -> bool {
        match self {
            Self::Gt => observed > target,
            Self::Gte => observed >= target,
            Self::Lt => observed < target,
            Self::Lte => observed <= target,
            _ => false,
        }
    }
}

impl std::str::FromStr for Comparator {
    type Err = EvergreenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "EQUALS" => Self::Equals,
            "GT" => Self::Gt,
            "GTE" => Self::Gte,
            "LT" => Self::Lt,
            "LTE" => Self::Lte,
            "NOT" => Self::Not,
            "AND" => Self::And,
            "OR" => Self::Or,
            _ => {
                return Err(EvergreenError::UnknownComparator { name: s.into() });
            }
        })
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Equals => "EQUALS",
            Self::Gt => "GT",
            Self::Gte => "GTE",
            Self::Lt => "LT",
            Self::Lte => "LTE",
            Self::Not => "NOT",
            Self::And => "AND",
            Self::Or => "OR",
        };
        f.write_str(label)
    }
}

/// One operand of an observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Observable {
    Value(Filler),
    Nested(ObservableValue),
}

impl From<Filler> for Observable {
    fn from(value: Filler) -> Self {
        Self::Value(value)
    }
}

impl From<ObservableValue> for Observable {
    fn from(value: ObservableValue) -> Self {
        Self::Nested(value)
    }
}

/// A comparison against the fillers of a slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservableValue {
    pub comparator: Comparator,
    pub values: Vec<Observable>,
}

impl ObservableValue {
    pub fn new(comparator: Comparator, values: Vec<Observable>) -> Self {
        Self { comparator, values }
    }

    /// Single-value comparison.
    pub fn single(comparator: Comparator, value: impl Into<Filler>) -> Self {
        Self::new(comparator, vec![Observable::Value(value.into())])
    }

    /// Evaluate against `subject.slot`.
    ///
    /// EQUALS and NOT test membership. GT/GTE/LT/LTE hold if any numeric
    /// filler satisfies them. AND/OR combine nested observations; a bare
    /// value inside them means EQUALS.
    pub fn observe(&self, graph: &FrameGraph, subject: SymbolId, slot: &str) -> EvergreenResult<bool> {
        let fillers = graph.fillers(subject, slot);

        if self.comparator.is_composite() {
            let mut results = Vec::with_capacity(self.values.len());
            for value in &self.values {
                results.push(match value {
                    Observable::Nested(nested) => nested.observe(graph, subject, slot)?,
                    Observable::Value(v) => fillers.contains(v),
                });
            }
            return Ok(match self.comparator {
                Comparator::And => results.iter().all(|r| *r),
                _ => results.iter().any(|r| *r),
            });
        }

        let [operand] = self.values.as_slice() else {
            return Err(EvergreenError::Arity {
                comparator: self.comparator.to_string(),
                count: self.values.len(),
            });
        };
        let target = match operand {
            Observable::Value(v) => v,
            Observable::Nested(nested) => {
                let inner = nested.observe(graph, subject, slot)?;
                return Ok(if self.comparator == Comparator::Not { !inner } else { inner });
            }
        };

        Ok(match self.comparator {
            Comparator::Equals => fillers.contains(target),
            Comparator::Not => !fillers.contains(target),
            numeric => match target.as_number() {
                Some(t) => fillers
                    .iter()
                    .filter_map(Filler::as_number)
                    .any(|observed| numeric.numeric(observed, t)),
                None => false,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LtGoalStatus {
    #[default]
    Unsatisfied,
    Satisfied,
}

/// A long-term goal watching `subject.slot`.
#[derive(Debug, Clone, Serialize)]
pub struct LtGoal {
    pub name: Option<String>,
    pub subject: SymbolId,
    pub slot: String,
    pub target: ObservableValue,
    /// Goal template instantiated whenever the target fails.
    pub resolution: String,
    pub status: LtGoalStatus,
    /// Resolution goal currently in flight.
    pub pending: Option<GoalId>,
}

impl LtGoal {
    pub fn new(
        subject: SymbolId,
        slot: impl Into<String>,
        target: ObservableValue,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            subject,
            slot: slot.into(),
            target,
            resolution: resolution.into(),
            status: LtGoalStatus::default(),
            pending: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Observe, then inject a resolution if needed.
    ///
    /// Returns the newly instantiated resolution goal, if any. The goal is
    /// adopted into the agenda arena but not attached.
    pub fn update(
        &mut self,
        graph: &mut FrameGraph,
        templates: &dyn Instantiate,
        agenda: &mut Agenda,
    ) -> AgentResult<Option<GoalId>> {
        let holds = self.target.observe(graph, self.subject, &self.slot)?;
        self.status = if holds {
            LtGoalStatus::Satisfied
        } else {
            LtGoalStatus::Unsatisfied
        };

        if let Some(pending) = self.pending {
            if agenda.goal(pending).is_some_and(|g| g.status.is_closed()) {
                self.pending = None;
            }
        }

        if holds || self.pending.is_some() {
            return Ok(None);
        }

        let frame = templates.instantiate(graph, &self.resolution, Scope::new("AGENDA"), &[])?;
        let goal = agenda.adopt_goal(graph, frame)?;
        tracing::info!(
            evergreen = self.name.as_deref().unwrap_or(&self.resolution),
            goal = %graph.label(goal),
            "evergreen resolution injected"
        );
        self.pending = Some(goal);
        Ok(Some(goal))
    }
}

/// Every evergreen the agent monitors.
#[derive(Debug, Default)]
pub struct EvergreenGoals {
    goals: Vec<LtGoal>,
}

impl EvergreenGoals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, goal: LtGoal) {
        self.goals.push(goal);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LtGoal> {
        self.goals.iter()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Update all evergreens; returns the resolutions injected.
    pub fn update(
        &mut self,
        graph: &mut FrameGraph,
        templates: &dyn Instantiate,
        agenda: &mut Agenda,
    ) -> AgentResult<Vec<GoalId>> {
        let mut injected = Vec::new();
        for goal in &mut self.goals {
            if let Some(id) = goal.update(graph, templates, agenda)? {
                injected.push(id);
            }
        }
        Ok(injected)
    }

    /// Resolution goals currently in flight.
    pub fn pending_resolutions(&self) -> Vec<GoalId> {
        self.goals.iter().filter_map(|g| g.pending).collect()
    }
}
