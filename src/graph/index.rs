//! In-memory frame store with a petgraph is-a index.
//!
//! Frames live in a `HashMap` keyed by [`SymbolId`]; the ontological
//! hierarchy is mirrored into a `DiGraph` (child → parent edges) so that
//! ancestor and descendant walks are plain breadth-first traversals.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};

use crate::error::GraphError;
use crate::symbol::{AtomicSymbolAllocator, SymbolId};

use super::{Filler, Frame, Scope};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Concepts and instances, plus the is-a taxonomy connecting them.
pub struct FrameGraph {
    allocator: AtomicSymbolAllocator,
    frames: HashMap<SymbolId, Frame>,
    /// Concept label → frame id (ontology scope only).
    concepts: HashMap<String, SymbolId>,
    /// Directed is-a graph: edge child → parent.
    taxonomy: DiGraph<SymbolId, ()>,
    /// SymbolId → NodeIndex mapping for O(1) node lookups.
    node_index: HashMap<SymbolId, NodeIndex>,
    /// Last allocated counter per scope header.
    scope_counters: HashMap<String, u64>,
}

impl FrameGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            allocator: AtomicSymbolAllocator::new(),
            frames: HashMap::new(),
            concepts: HashMap::new(),
            taxonomy: DiGraph::new(),
            node_index: HashMap::new(),
            scope_counters: HashMap::new(),
        }
    }

    fn ensure_node(&mut self, symbol: SymbolId) -> NodeIndex {
        if let Some(idx) = self.node_index.get(&symbol) {
            return *idx;
        }
        let idx = self.taxonomy.add_node(symbol);
        self.node_index.insert(symbol, idx);
        idx
    }

    /// Create a frame with the given label, scope and parents.
    ///
    /// Parents must already exist. Concepts created this way are indexed by
    /// label; a second concept with the same label shadows the first.
    pub fn create_frame(
        &mut self,
        label: impl Into<String>,
        scope: Scope,
        parents: &[SymbolId],
    ) -> GraphResult<SymbolId> {
        for parent in parents {
            self.get(*parent)?;
        }
        let id = self.allocator.next_id()?;
        let label = label.into();
        if scope.is_ontology() {
            self.concepts.insert(label.clone(), id);
        }
        self.frames.insert(
            id,
            Frame {
                id,
                label,
                scope,
                parents: Vec::new(),
                slots: BTreeMap::new(),
            },
        );
        for parent in parents {
            self.add_parent(id, *parent)?;
        }
        Ok(id)
    }

    /// Resolve a concept by label, creating it (parentless) if absent.
    pub fn concept(&mut self, label: &str) -> GraphResult<SymbolId> {
        match self.concepts.get(label) {
            Some(id) => Ok(*id),
            None => self.create_frame(label, Scope::ontology(), &[]),
        }
    }

    /// Resolve a concept by label, creating it under `parents` if absent.
    ///
    /// An existing concept gains any parents it does not have yet.
    pub fn concept_under(&mut self, label: &str, parents: &[SymbolId]) -> GraphResult<SymbolId> {
        let id = self.concept(label)?;
        for parent in parents {
            self.add_parent(id, *parent)?;
        }
        Ok(id)
    }

    /// Look up a concept by label without creating it.
    pub fn lookup_concept(&self, label: &str) -> Option<SymbolId> {
        self.concepts.get(label).copied()
    }

    /// Look up a concept by label, failing if it is not declared.
    pub fn require_concept(&self, label: &str) -> GraphResult<SymbolId> {
        self.lookup_concept(label)
            .ok_or_else(|| GraphError::ConceptNotFound {
                label: label.into(),
            })
    }

    /// Create a fresh instance of `concept` in `scope`, labelled `CONCEPT.n`.
    pub fn instance_of(&mut self, concept: SymbolId, scope: Scope) -> GraphResult<SymbolId> {
        let base = self.get(concept)?.label.clone();
        let n = self.allocator.peek_next();
        self.create_frame(format!("{base}.{n}"), scope, &[concept])
    }

    /// Add an is-a edge. Adding an existing parent is a no-op.
    pub fn add_parent(&mut self, child: SymbolId, parent: SymbolId) -> GraphResult<()> {
        self.get(parent)?;
        let frame = self.get_mut(child)?;
        if frame.parents.contains(&parent) {
            return Ok(());
        }
        frame.parents.push(parent);
        let c = self.ensure_node(child);
        let p = self.ensure_node(parent);
        self.taxonomy.add_edge(c, p, ());
        Ok(())
    }

    /// Get a frame by id.
    pub fn frame(&self, id: SymbolId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    /// Get a frame by id, failing if it does not exist.
    pub fn get(&self, id: SymbolId) -> GraphResult<&Frame> {
        self.frames
            .get(&id)
            .ok_or(GraphError::FrameNotFound { frame_id: id.get() })
    }

    fn get_mut(&mut self, id: SymbolId) -> GraphResult<&mut Frame> {
        self.frames
            .get_mut(&id)
            .ok_or(GraphError::FrameNotFound { frame_id: id.get() })
    }

    /// Label of a frame, or its id when unknown. Meant for logs.
    pub fn label(&self, id: SymbolId) -> String {
        self.frames
            .get(&id)
            .map(|f| f.label.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Fillers of `slot` on `id`; empty when either is missing.
    pub fn fillers(&self, id: SymbolId, slot: &str) -> &[Filler] {
        self.frames.get(&id).map(|f| f.fillers(slot)).unwrap_or(&[])
    }

    /// The frame fillers of `slot`, ignoring literal fillers.
    pub fn frame_fillers(&self, id: SymbolId, slot: &str) -> Vec<SymbolId> {
        self.fillers(id, slot)
            .iter()
            .filter_map(Filler::as_frame)
            .collect()
    }

    /// First frame filler of `slot`.
    pub fn first_frame(&self, id: SymbolId, slot: &str) -> Option<SymbolId> {
        self.fillers(id, slot).iter().find_map(Filler::as_frame)
    }

    /// First numeric filler of `slot`.
    pub fn number(&self, id: SymbolId, slot: &str) -> Option<f64> {
        self.fillers(id, slot).iter().find_map(Filler::as_number)
    }

    /// First text filler of `slot`.
    pub fn text(&self, id: SymbolId, slot: &str) -> Option<&str> {
        self.fillers(id, slot).iter().find_map(Filler::as_text)
    }

    /// Replace the fillers of a slot.
    pub fn set(&mut self, id: SymbolId, slot: &str, fillers: Vec<Filler>) -> GraphResult<()> {
        self.get_mut(id)?.slots.insert(slot.into(), fillers);
        Ok(())
    }

    /// Replace a slot with a single filler.
    pub fn set_one(&mut self, id: SymbolId, slot: &str, filler: impl Into<Filler>) -> GraphResult<()> {
        self.set(id, slot, vec![filler.into()])
    }

    /// Append a filler to a slot.
    pub fn push(&mut self, id: SymbolId, slot: &str, filler: impl Into<Filler>) -> GraphResult<()> {
        self.get_mut(id)?
            .slots
            .entry(slot.into())
            .or_default()
            .push(filler.into());
        Ok(())
    }

    /// All ancestors of `id` in breadth-first order, excluding `id` itself.
    pub fn ancestors(&self, id: SymbolId) -> Vec<SymbolId> {
        let Some(&start) = self.node_index.get(&id) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.taxonomy, start);
        let mut out = Vec::new();
        while let Some(nx) = bfs.next(&self.taxonomy) {
            if nx != start {
                out.push(self.taxonomy[nx]);
            }
        }
        out
    }

    /// All descendants of `id` (subconcepts and instances), breadth-first,
    /// excluding `id` itself.
    pub fn descendants(&self, id: SymbolId) -> Vec<SymbolId> {
        let Some(&start) = self.node_index.get(&id) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.taxonomy);
        let mut bfs = Bfs::new(reversed, start);
        let mut out = Vec::new();
        while let Some(nx) = bfs.next(reversed) {
            if nx != start {
                out.push(self.taxonomy[nx]);
            }
        }
        out
    }

    /// Whether `id` is `ancestor` or descends from it.
    pub fn is_a(&self, id: SymbolId, ancestor: SymbolId) -> bool {
        id == ancestor || self.ancestors(id).contains(&ancestor)
    }

    /// Whether `id` is-a the concept with the given label.
    pub fn is_a_label(&self, id: SymbolId, label: &str) -> bool {
        self.lookup_concept(label)
            .is_some_and(|concept| self.is_a(id, concept))
    }

    /// The nearest ontology frame of `id`: itself for a concept, otherwise
    /// the first concept among its ancestors.
    pub fn root_concept(&self, id: SymbolId) -> Option<SymbolId> {
        let frame = self.frames.get(&id)?;
        if frame.scope.is_ontology() {
            return Some(id);
        }
        self.ancestors(id).into_iter().find(|a| {
            self.frames
                .get(a)
                .is_some_and(|f| f.scope.is_ontology())
        })
    }

    /// Allocate the next scope for a header: `HEADER#1`, `HEADER#2`, ...
    pub fn next_scope(&mut self, header: &str) -> Scope {
        let counter = self.scope_counters.entry(header.into()).or_insert(0);
        *counter += 1;
        Scope::new(format!("{header}#{counter}"))
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the graph holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for FrameGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGraph")
            .field("frames", &self.frames.len())
            .field("concepts", &self.concepts.len())
            .field("taxonomy_edges", &self.taxonomy.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> (FrameGraph, SymbolId, SymbolId, SymbolId) {
        let mut g = FrameGraph::new();
        let all = g.concept("ALL").unwrap();
        let event = g.concept_under("EVENT", &[all]).unwrap();
        let hold = g.concept_under("HOLD", &[event]).unwrap();
        (g, all, event, hold)
    }

    #[test]
    fn concept_resolves_or_creates() {
        let mut g = FrameGraph::new();
        let a = g.concept("HAND").unwrap();
        let b = g.concept("HAND").unwrap();
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
        assert!(g.lookup_concept("WHEEL").is_none());
        assert!(matches!(
            g.require_concept("WHEEL"),
            Err(GraphError::ConceptNotFound { .. })
        ));
    }

    #[test]
    fn ancestors_are_breadth_first() {
        let (g, all, event, hold) = taxonomy();
        assert_eq!(g.ancestors(hold), vec![event, all]);
        assert!(g.is_a(hold, all));
        assert!(g.is_a(hold, hold));
        assert!(!g.is_a(all, hold));
        assert!(g.is_a_label(hold, "EVENT"));
    }

    #[test]
    fn instances_descend_from_their_concept() {
        let (mut g, _, event, hold) = taxonomy();
        let inst = g.instance_of(hold, Scope::new("EXE")).unwrap();
        assert!(g.get(inst).unwrap().label.starts_with("HOLD."));
        assert!(g.descendants(event).contains(&inst));
        assert_eq!(g.root_concept(inst), Some(hold));
        assert_eq!(g.root_concept(hold), Some(hold));
    }

    #[test]
    fn taxonomy_cycles_terminate() {
        let (mut g, all, _, hold) = taxonomy();
        g.add_parent(all, hold).unwrap();
        let anc = g.ancestors(hold);
        assert_eq!(anc.len(), 2);
    }

    #[test]
    fn slots_set_and_push() {
        let (mut g, _, _, hold) = taxonomy();
        let inst = g.instance_of(hold, Scope::new("EXE")).unwrap();
        g.set_one(inst, "PHASE", "END").unwrap();
        g.push(inst, "THEME", hold).unwrap();
        g.push(inst, "THEME", 3.0).unwrap();
        assert_eq!(g.text(inst, "PHASE"), Some("END"));
        assert_eq!(g.frame_fillers(inst, "THEME"), vec![hold]);
        assert_eq!(g.number(inst, "THEME"), Some(3.0));
        assert!(g.fillers(inst, "AGENT").is_empty());

        let missing = SymbolId::new(9999).unwrap();
        assert!(matches!(
            g.set_one(missing, "PHASE", "END"),
            Err(GraphError::FrameNotFound { frame_id: 9999 })
        ));
    }

    #[test]
    fn next_scope_counts_per_header() {
        let mut g = FrameGraph::new();
        assert_eq!(g.next_scope("MMR").name(), "MMR#1");
        assert_eq!(g.next_scope("MMR").name(), "MMR#2");
        assert_eq!(g.next_scope("EXE").name(), "EXE#1");
    }
}
