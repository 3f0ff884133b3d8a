//! World-state oracle: does the state an event brings about hold right now?
//!
//! Cleanup asks the oracle about every unfinished step. Hosts with real
//! perception plug in their own [`WorldStateOracle`]; [`PhaseOracle`] is the
//! reference implementation, reading completion from `PHASE` slots.

use crate::graph::{Filler, FrameGraph, PHASE_END, concept, slot};
use crate::symbol::SymbolId;

/// Decides whether an event's expected world state is observed.
pub trait WorldStateOracle: Send + Sync {
    fn holds(&self, graph: &FrameGraph, event: SymbolId) -> bool;
}

/// Reference oracle driven by event phases.
///
/// An EVENT holds when its own `PHASE` is `END`, or when another ended
/// instance of one of its parent concepts carries every case-role filler the
/// event carries (equal frames, or a more specific frame). EFFECT frames are
/// never perceived.
#[derive(Debug, Clone)]
pub struct PhaseOracle {
    case_roles: Vec<String>,
}

impl PhaseOracle {
    pub fn new(case_roles: Vec<String>) -> Self {
        Self { case_roles }
    }

    fn ended(graph: &FrameGraph, id: SymbolId) -> bool {
        graph.text(id, slot::PHASE) == Some(PHASE_END)
    }

    fn filler_matches(graph: &FrameGraph, expected: &Filler, observed: &Filler) -> bool {
        match (expected, observed) {
            (Filler::Frame(e), Filler::Frame(o)) => graph.is_a(*o, *e),
            (e, o) => e == o,
        }
    }

    /// Whether `observed` carries every case-role filler of `event`.
    fn roles_covered(&self, graph: &FrameGraph, event: SymbolId, observed: SymbolId) -> bool {
        self.case_roles.iter().all(|role| {
            let seen = graph.fillers(observed, role);
            graph
                .fillers(event, role)
                .iter()
                .all(|expected| seen.iter().any(|o| Self::filler_matches(graph, expected, o)))
        })
    }
}

impl WorldStateOracle for PhaseOracle {
    fn holds(&self, graph: &FrameGraph, event: SymbolId) -> bool {
        if graph.is_a_label(event, concept::EFFECT) {
            return false;
        }
        if Self::ended(graph, event) {
            return true;
        }
        let Some(frame) = graph.frame(event) else {
            return false;
        };
        frame.parents.iter().any(|parent| {
            graph.descendants(*parent).into_iter().any(|other| {
                other != event
                    && graph.frame(other).is_some_and(|f| !f.scope.is_ontology())
                    && Self::ended(graph, other)
                    && self.roles_covered(graph, event, other)
            })
        })
    }
}
