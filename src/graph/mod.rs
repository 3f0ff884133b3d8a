//! Frame graph: the node store the agenda operates over.
//!
//! Every concept and every instance is a [`Frame`]: a label, a scope, a list
//! of ontological parents and a set of named slots holding [`Filler`]s. The
//! is-a hierarchy is indexed with petgraph so subtype checks and
//! ancestor/descendant walks are cycle-safe.

pub mod index;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::symbol::SymbolId;

pub use index::{FrameGraph, GraphResult};

/// Well-known slot names.
pub mod slot {
    pub const AGENT: &str = "AGENT";
    pub const THEME: &str = "THEME";
    pub const PHASE: &str = "PHASE";
    pub const PRIORITY: &str = "PRIORITY";
    pub const COST: &str = "COST";
    pub const HAS_PLAN: &str = "HAS-PLAN";
    pub const HAS_EVENT_AS_PART: &str = "HAS-EVENT-AS-PART";
    pub const HAS_IMPASSE: &str = "HAS-IMPASSE";
    pub const HAS_RESOLUTION: &str = "HAS-RESOLUTION";
    pub const HAS_GOAL: &str = "HAS-GOAL";
    pub const HAS_BINDING: &str = "HAS-BINDING";
    pub const HAS_VARMAP: &str = "HAS-VARMAP";
    pub const BIND_LOCAL: &str = "BIND-LOCAL";
    pub const BIND_TO: &str = "BIND-TO";
    pub const DEFINED: &str = "DEFINED";
    pub const REALIZED: &str = "REALIZED";
    pub const DETECT: &str = "DETECT";
    pub const NAME: &str = "NAME";
    pub const SUBGOAL_OF: &str = "SUBGOAL-OF";
    pub const INSTANCE_OF: &str = "INSTANCE-OF";
}

/// Well-known concept labels seeded into every agent's ontology.
pub mod concept {
    pub const ALL: &str = "ALL";
    pub const EVENT: &str = "EVENT";
    pub const EFFECT: &str = "EFFECT";
    pub const OBJECT: &str = "OBJECT";
    pub const AGENT: &str = "AGENT";
    pub const GOAL: &str = "GOAL";
    pub const EFFECTOR: &str = "EFFECTOR";
    pub const IMPASSE: &str = "IMPASSE";
    pub const RESOLUTION: &str = "RESOLUTION";
    pub const BINDING: &str = "BINDING";
    pub const VARMAP: &str = "VARMAP";
    pub const OPTION: &str = "OPTION";
    pub const SIGNAL: &str = "SIGNAL";
    pub const ADD_GOAL_INSTANCE: &str = "ADD-GOAL-INSTANCE";
    pub const RELEASE_EFFECTOR: &str = "RELEASE-EFFECTOR";
}

/// Phase label marking an event as ended.
pub const PHASE_END: &str = "END";

/// A named partition of the graph (`ONT`, `EXE`, `MMR#3`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope(String);

impl Scope {
    /// The ontology scope: frames here are concepts, everything else is an instance.
    pub const ONTOLOGY: &'static str = "ONT";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn ontology() -> Self {
        Self::new(Self::ONTOLOGY)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_ontology(&self) -> bool {
        self.0 == Self::ONTOLOGY
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value stored in a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Filler {
    Frame(SymbolId),
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Filler {
    pub fn as_frame(&self) -> Option<SymbolId> {
        match self {
            Self::Frame(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Filler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(id) => write!(f, "{id}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<SymbolId> for Filler {
    fn from(id: SymbolId) -> Self {
        Self::Frame(id)
    }
}

impl From<f64> for Filler {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Filler {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Filler {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

impl From<String> for Filler {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A node record: concept or instance.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub id: SymbolId,
    /// Human-readable label (`HOLD` for a concept, `HOLD.12` for an instance).
    pub label: String,
    pub scope: Scope,
    /// Direct ontological parents.
    pub parents: Vec<SymbolId>,
    pub(crate) slots: BTreeMap<String, Vec<Filler>>,
}

impl Frame {
    /// Fillers of a slot (empty if the slot is unset).
    pub fn fillers(&self, slot: &str) -> &[Filler] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the slot carries at least one filler.
    pub fn has(&self, slot: &str) -> bool {
        !self.fillers(slot).is_empty()
    }

    /// Names of all populated slots.
    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter(|(_, fillers)| !fillers.is_empty())
            .map(|(name, _)| name.as_str())
    }
}
