//! Rich diagnostic error types for the deliberation core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so a host knows exactly what went wrong
//! and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate's core (non-agent) subsystems.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum DelibError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Symbol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SymbolError {
    #[error("symbol allocator exhausted: cannot allocate more than u64::MAX symbols")]
    #[diagnostic(
        code(delib::symbol::exhausted),
        help(
            "The identifier space is exhausted. This requires 2^64 allocations \
             and points at an allocation loop."
        )
    )]
    AllocatorExhausted,
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] SymbolError),

    #[error("frame not found: {frame_id}")]
    #[diagnostic(
        code(delib::graph::frame_not_found),
        help(
            "The identifier does not name a frame in this graph. Frames are never \
             removed, so the id was either never allocated here or belongs to \
             another agent's graph."
        )
    )]
    FrameNotFound { frame_id: u64 },

    #[error("concept not found: \"{label}\"")]
    #[diagnostic(
        code(delib::graph::concept_not_found),
        help("Declare the concept first (e.g. in the knowledge pack's [concepts] table).")
    )]
    ConceptNotFound { label: String },

    #[error("slot {slot} on {frame_id} expected a {expected} filler")]
    #[diagnostic(
        code(delib::graph::filler_type),
        help("Check the knowledge that populated this slot; the filler has the wrong type.")
    )]
    FillerType {
        frame_id: u64,
        slot: String,
        expected: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Signal errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SignalError {
    #[error("signal not found: {signal_id}")]
    #[diagnostic(
        code(delib::signal::not_found),
        help("Signals are append-only; this id was never built by this agent's signal log.")
    )]
    NotFound { signal_id: u64 },

    #[error("signal {signal_id} has no ontological root (root frame \"{root}\")")]
    #[diagnostic(
        code(delib::signal::no_root_concept),
        help(
            "The signal's root frame is neither a concept nor an instance of one. \
             Give the root frame a parent concept before submitting it."
        )
    )]
    NoRootConcept { signal_id: u64, root: String },
}

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TemplateError {
    #[error("goal template not found: {template}")]
    #[diagnostic(
        code(delib::template::not_found),
        help("Load a knowledge pack declaring this goal before instantiating it.")
    )]
    NotFound { template: String },

    #[error("duplicate goal template: \"{name}\"")]
    #[diagnostic(
        code(delib::template::duplicate),
        help("Goal template names are unique across all loaded knowledge packs.")
    )]
    Duplicate { name: String },

    #[error("goal template \"{name}\" declares no plans")]
    #[diagnostic(
        code(delib::template::no_plans),
        help("Every goal template needs at least one [[goals.plans]] entry.")
    )]
    NoPlans { name: String },

    #[error("{field} of goal template \"{name}\" out of range: {value}")]
    #[diagnostic(
        code(delib::template::out_of_range),
        help("Priorities and costs are fractions in [0, 1].")
    )]
    OutOfRange {
        name: String,
        field: &'static str,
        value: f64,
    },

    #[error("invalid knowledge pack: {message}")]
    #[diagnostic(
        code(delib::template::parse),
        help("The knowledge pack is not valid TOML or does not match the pack schema.")
    )]
    Parse { message: String },

    #[error("I/O error reading knowledge pack: {source}")]
    #[diagnostic(
        code(delib::template::io),
        help("Check that the pack file exists and is readable.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid agent config: {message}")]
    #[diagnostic(
        code(delib::config::parse),
        help("The config file is not valid TOML or contains unknown keys.")
    )]
    Parse { message: String },

    #[error("invalid value for {key}: {message}")]
    #[diagnostic(
        code(delib::config::invalid_value),
        help("Weights must be finite numbers and the heartbeat must be positive.")
    )]
    InvalidValue { key: &'static str, message: String },

    #[error("I/O error reading config: {source}")]
    #[diagnostic(
        code(delib::config::io),
        help("Check that the config file exists and is readable.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for core operations.
pub type DelibResult<T> = std::result::Result<T, DelibError>;
