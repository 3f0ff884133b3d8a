//! Agent-specific error types with rich miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::error::{ConfigError, DelibError, GraphError, SignalError, TemplateError};

/// Errors specific to the agent layer (agenda, scheduler, effectors, evergreens).
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error("goal not found on the agenda: {goal_id}")]
    #[diagnostic(
        code(delib::agent::goal_not_found),
        help("Goals enter the agenda arena through `Agenda::adopt_goal`; this id never did.")
    )]
    GoalNotFound { goal_id: u64 },

    #[error("step not found on the agenda: {step_id}")]
    #[diagnostic(
        code(delib::agent::step_not_found),
        help("Steps are created when their goal is adopted. Check the goal's plans.")
    )]
    StepNotFound { step_id: u64 },

    #[error("frame {frame_id} (\"{label}\") is not a goal instance")]
    #[diagnostic(
        code(delib::agent::not_a_goal),
        help("Only instances of a GOAL concept can be adopted onto the agenda.")
    )]
    NotAGoal { frame_id: u64, label: String },

    #[error("frame {frame_id} is missing required slot {slot}")]
    #[diagnostic(
        code(delib::agent::missing_slot),
        help("The directive frame was built without a slot its handler needs.")
    )]
    MissingSlot { frame_id: u64, slot: &'static str },

    #[error("agent daemon is not running")]
    #[diagnostic(
        code(delib::agent::daemon_stopped),
        help("The daemon's inbox is closed. Start a new daemon or keep the handle's daemon alive.")
    )]
    DaemonStopped,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Effector(#[from] EffectorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Evergreen(#[from] EvergreenError),

    #[error("{0}")]
    #[diagnostic(
        code(delib::agent::core),
        help("A core-level error occurred during an agent operation.")
    )]
    Core(Box<DelibError>),
}

impl From<DelibError> for AgentError {
    fn from(e: DelibError) -> Self {
        Self::Core(Box::new(e))
    }
}

impl From<GraphError> for AgentError {
    fn from(e: GraphError) -> Self {
        DelibError::from(e).into()
    }
}

impl From<SignalError> for AgentError {
    fn from(e: SignalError) -> Self {
        DelibError::from(e).into()
    }
}

impl From<TemplateError> for AgentError {
    fn from(e: TemplateError) -> Self {
        DelibError::from(e).into()
    }
}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        DelibError::from(e).into()
    }
}

// ---------------------------------------------------------------------------
// Effector errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EffectorError {
    #[error("effector not registered: {effector_id}")]
    #[diagnostic(
        code(delib::effector::not_found),
        help("Register the effector with `Agent::register_effector` first.")
    )]
    NotFound { effector_id: u64 },

    #[error("effector \"{label}\" is already reserved to signal {reserved_to}")]
    #[diagnostic(
        code(delib::effector::busy),
        help(
            "An effector serves one signal at a time. Release it (RELEASE-EFFECTOR) \
             before reserving it again."
        )
    )]
    Busy { label: String, reserved_to: u64 },
}

// ---------------------------------------------------------------------------
// Evergreen errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EvergreenError {
    #[error("comparator {comparator} takes exactly one value, got {count}")]
    #[diagnostic(
        code(delib::evergreen::arity),
        help("Only AND and OR accept several values; wrap the others in one of them.")
    )]
    Arity { comparator: String, count: usize },

    #[error("unknown comparator: \"{name}\"")]
    #[diagnostic(
        code(delib::evergreen::unknown_comparator),
        help("Use one of EQUALS, GT, GTE, LT, LTE, NOT, AND, OR.")
    )]
    UnknownComparator { name: String },
}

/// Convenience alias for agent operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
