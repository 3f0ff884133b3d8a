//! Impasse resolution: blocked steps spawn subgoals.
//!
//! A step may declare impasses, each naming a detector kind and the goal
//! templates that resolve it. Every tick, for every step of every attached
//! goal:
//!
//! 1. an IMPASSED step with any SATISFIED subgoal, or with no subgoal at
//!    all, goes back to PLANNED;
//! 2. a PLANNED step evaluates its impasses in order. Each one whose
//!    detector fires marks the step IMPASSED and, per resolution, routes an
//!    `ADD-GOAL-INSTANCE` directive (in a fresh `MMR#n` scope) through the
//!    agent's handler pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::error::TemplateError;
use crate::graph::{Filler, FrameGraph, concept, slot};
use crate::symbol::SymbolId;

use super::agenda::Agenda;
use super::agent::Agent;
use super::error::AgentResult;
use super::goal::{GoalId, GoalStatus};
use super::plan::{StepId, StepStatus};

// ---------------------------------------------------------------------------
// Impasse records
// ---------------------------------------------------------------------------

/// Maps a variable of the blocked step's goal onto a variable of the new goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub local: String,
    pub to: String,
}

/// One way out of an impasse: instantiate `goal` with `bindings`.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub id: SymbolId,
    /// Goal template name.
    pub goal: String,
    pub bindings: Vec<Binding>,
}

/// A named blocking condition on a step.
#[derive(Debug, Clone, Serialize)]
pub struct Impasse {
    pub id: SymbolId,
    pub name: String,
    /// Detector kind, looked up in the [`DetectorRegistry`].
    pub detector: String,
    pub resolutions: Vec<Resolution>,
}

impl Impasse {
    /// Read an `IMPASSE` frame and its resolutions.
    pub fn read(graph: &FrameGraph, frame: SymbolId) -> Self {
        let text = |id: SymbolId, key: &'static str| graph.text(id, key).unwrap_or_default().to_string();
        let resolutions = graph
            .frame_fillers(frame, slot::HAS_RESOLUTION)
            .into_iter()
            .map(|res| Resolution {
                id: res,
                goal: text(res, slot::HAS_GOAL),
                bindings: graph
                    .frame_fillers(res, slot::HAS_BINDING)
                    .into_iter()
                    .map(|b| Binding {
                        local: text(b, slot::BIND_LOCAL),
                        to: text(b, slot::BIND_TO),
                    })
                    .collect(),
            })
            .collect();
        Self {
            id: frame,
            name: text(frame, slot::NAME),
            detector: text(frame, slot::DETECT),
            resolutions,
        }
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Decides whether an impasse currently blocks a step.
pub trait ImpasseDetector: Send + Sync {
    fn detect(&self, graph: &FrameGraph, agenda: &Agenda, step: StepId) -> bool;
}

impl<F> ImpasseDetector for F
where
    F: Fn(&FrameGraph, &Agenda, StepId) -> bool + Send + Sync,
{
    fn detect(&self, graph: &FrameGraph, agenda: &Agenda, step: StepId) -> bool {
        self(graph, agenda, step)
    }
}

/// Fires while a role of the step is unfilled.
#[derive(Debug, Clone)]
pub struct MissingRole(pub String);

impl ImpasseDetector for MissingRole {
    fn detect(&self, graph: &FrameGraph, _agenda: &Agenda, step: StepId) -> bool {
        graph.fillers(step, &self.0).is_empty()
    }
}

/// Detectors keyed by kind name.
#[derive(Clone, Default)]
pub struct DetectorRegistry {
    detectors: HashMap<String, Arc<dyn ImpasseDetector>>,
}

impl DetectorRegistry {
    /// A registry holding the built-in kinds: `always`, `never`, and
    /// `missing-<role>` for each of `roles`.
    pub fn with_builtins(roles: &[String]) -> Self {
        let mut registry = Self::default();
        registry.register("always", |_: &FrameGraph, _: &Agenda, _: StepId| true);
        registry.register("never", |_: &FrameGraph, _: &Agenda, _: StepId| false);
        for role in roles {
            registry.register(
                format!("missing-{}", role.to_lowercase()),
                MissingRole(role.clone()),
            );
        }
        registry
    }

    /// Register (or replace) a detector.
    pub fn register(&mut self, kind: impl Into<String>, detector: impl ImpasseDetector + 'static) {
        self.detectors.insert(kind.into(), Arc::new(detector));
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn ImpasseDetector>> {
        self.detectors.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.detectors.contains_key(kind)
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.detectors.keys().collect();
        kinds.sort();
        f.debug_struct("DetectorRegistry").field("kinds", &kinds).finish()
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Re-plan unblocked steps and fire detectors. Returns the number of
/// impasses that fired.
pub fn handle_impasses(agent: &mut Agent) -> AgentResult<usize> {
    let mut fired = 0;
    for goal in agent.agenda.goals().to_vec() {
        for plan in agent.agenda.goal_plans(goal).to_vec() {
            for step in agent.agenda.plan_steps(plan).to_vec() {
                fired += handle_step(agent, goal, step)?;
            }
        }
    }
    Ok(fired)
}

fn handle_step(agent: &mut Agent, goal: GoalId, step_id: StepId) -> AgentResult<usize> {
    let step = agent.agenda.require_step(step_id)?;
    if step.status == StepStatus::Impassed {
        let unblocked = step.subgoals.is_empty() || step.subgoals.iter().any(|sg| {
            agent
                .agenda
                .goal(*sg)
                .is_some_and(|g| g.status == GoalStatus::Satisfied)
        });
        if unblocked {
            agent.agenda.require_step_mut(step_id)?.set_status(StepStatus::Planned);
        }
    }

    let step = agent.agenda.require_step(step_id)?;
    if step.status != StepStatus::Planned {
        return Ok(0);
    }

    let mut fired = 0;
    for impasse in step.impasses.clone() {
        let fires = match agent.detectors.get(&impasse.detector) {
            Some(detector) => detector.detect(&agent.graph, &agent.agenda, step_id),
            None => {
                tracing::warn!(
                    impasse = %impasse.name,
                    detector = %impasse.detector,
                    "unknown detector kind, impasse skipped"
                );
                false
            }
        };
        if fires {
            build_impasse(agent, goal, step_id, &impasse)?;
            fired += 1;
        }
    }
    Ok(fired)
}

/// Mark the step IMPASSED and request one subgoal per resolution.
///
/// A resolution that cannot be requested is logged and counted as a fault;
/// the remaining resolutions and the rest of the tick still run.
fn build_impasse(agent: &mut Agent, goal: GoalId, step: StepId, impasse: &Impasse) -> AgentResult<()> {
    agent.agenda.require_step_mut(step)?.set_status(StepStatus::Impassed);
    tracing::debug!(step = %agent.graph.label(step), impasse = %impasse.name, "impasse fired");

    let variables = agent.agenda.require_goal(goal)?.variables.clone();
    for resolution in &impasse.resolutions {
        if let Err(err) = request_subgoal(agent, step, &variables, resolution) {
            tracing::warn!(
                step = %agent.graph.label(step),
                impasse = %impasse.name,
                goal = %resolution.goal,
                error = %err,
                "impasse resolution failed"
            );
            agent.summary.faults += 1;
        }
    }
    Ok(())
}

/// Route an `ADD-GOAL-INSTANCE` directive for one resolution.
fn request_subgoal(
    agent: &mut Agent,
    step: StepId,
    variables: &BTreeMap<String, Filler>,
    resolution: &Resolution,
) -> AgentResult<()> {
    let template = agent
        .templates
        .template_concept(&resolution.goal)
        .ok_or_else(|| TemplateError::NotFound {
            template: resolution.goal.clone(),
        })?;

    let scope = agent.graph.next_scope("MMR");
    let directive = agent.graph.concept(concept::ADD_GOAL_INSTANCE)?;
    let root = agent.graph.instance_of(directive, scope.clone())?;
    agent.graph.set_one(root, slot::THEME, template)?;
    agent.graph.set_one(root, slot::SUBGOAL_OF, step)?;

    let binding_concept = agent.graph.concept(concept::BINDING)?;
    for binding in &resolution.bindings {
        let Some(value) = variables.get(&binding.local) else {
            continue;
        };
        let b = agent.graph.instance_of(binding_concept, scope.clone())?;
        agent.graph.set_one(b, slot::BIND_TO, binding.to.as_str())?;
        agent.graph.set_one(b, slot::REALIZED, value.clone())?;
        agent.graph.push(root, slot::HAS_BINDING, b)?;
    }

    let signal = agent.signals.build(&mut agent.graph, root, scope)?;
    agent.handle(signal)
}
