// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # deliberator
//!
//! The deliberation core of a goal-directed agent. Given a hierarchy of
//! active goals, every heartbeat the agent detects planning impasses, turns
//! the next step of each plan into a scored option, arbitrates options over
//! scarce effectors, dispatches the winners and reconciles completion state.
//!
//! ## Architecture
//!
//! - **Frame graph** (`graph`): concepts and instances with a petgraph is-a index
//! - **Templates** (`template`): TOML knowledge packs expanded into goal instances
//! - **Signals** (`signal`): timestamped, scoped wrappers around input frames
//! - **Dispatch** (`dispatch`): operations on concepts, executables, reports
//! - **World state** (`states`): the oracle deciding whether an event holds
//! - **Agent** (`agent`): agenda, impasses, arbitration, scheduler, evergreens,
//!   effectors and the tokio heartbeat actor
//!
//! ## Library usage
//!
//! ```no_run
//! use deliberator::agent::Agent;
//! use deliberator::config::AgentConfig;
//!
//! let mut agent = Agent::new("ROBOT", AgentConfig::default()).unwrap();
//! agent.load_pack_str(r#"
//!     [concepts]
//!     HOLD = ["EVENT"]
//!
//!     [[goals]]
//!     name = "TAKE-OBJECT"
//!
//!     [[goals.plans]]
//!     concept = "HOLD"
//! "#).unwrap();
//! agent.add_goal_instance("TAKE-OBJECT", &[]).unwrap();
//! let summary = agent.tick().unwrap();
//! println!("{} options generated", summary.options_generated);
//! ```

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod signal;
pub mod states;
pub mod symbol;
pub mod template;
