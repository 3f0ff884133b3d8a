//! Agent layer: the agenda and the scheduler loop that deliberates over it.
//!
//! The agent owns a frame graph and adds:
//! - **Agenda** (goals, plans flattened into steps, scored options)
//! - **Impasses** (detectors that block steps and spawn subgoals)
//! - **Arbitration** (option generation and effector-constrained selection)
//! - **Effectors** (scarce actuation resources reserved per signal)
//! - **Evergreens** (homeostatic goals re-injected while their condition fails)
//! - **Daemon** (tokio heartbeat actor, feature `daemon`)

pub mod agenda;
pub mod agent;
pub mod arbitration;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod effector;
pub mod error;
pub mod evergreen;
pub mod goal;
pub mod impasse;
pub mod operations;
pub mod plan;
pub mod scheduler;
pub mod snapshot;

pub use agenda::Agenda;
pub use agent::Agent;
pub use arbitration::{AgendaOption, EffectorAssignment, OptionId, OptionStatus};
#[cfg(feature = "daemon")]
pub use daemon::{AgentDaemon, AgentHandle, AgentMessage, ChannelOutput, DaemonConfig};
pub use effector::{
    Effector, EffectorId, EffectorOutcome, EffectorOutput, EffectorRegistry, EffectorStatus,
    QueuedOutput, run_job,
};
pub use error::{AgentError, AgentResult, EffectorError, EvergreenError};
pub use evergreen::{
    Comparator, EvergreenGoals, LtGoal, LtGoalStatus, Observable, ObservableValue,
};
pub use goal::{Goal, GoalId, GoalStatus};
pub use impasse::{Binding, DetectorRegistry, Impasse, ImpasseDetector, MissingRole, Resolution};
pub use operations::TraceAction;
pub use plan::{Plan, PlanId, PlanStatus, Step, StepId, StepStatus};
pub use scheduler::{TickSummary, process_agenda};
pub use snapshot::AgentSnapshot;
