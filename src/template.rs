//! Goal templates and knowledge packs.
//!
//! A knowledge pack is a TOML document declaring concepts and goal
//! templates. Templates are registered with an [`Instantiate`]
//! implementation, which expands them into fresh goal instance subtrees:
//!
//! ```text
//! GOAL instance ── HAS-PLAN ──> plan event ── HAS-EVENT-AS-PART ──> step events
//!      │                              │
//!      └─ HAS-VARMAP ──> VARMAP       └─ HAS-IMPASSE ──> IMPASSE ── HAS-RESOLUTION ──> RESOLUTION
//!         (DEFINED, REALIZED)                                                    └─ HAS-BINDING
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DelibResult, TemplateError};
use crate::graph::{Filler, FrameGraph, Scope, concept, slot};
use crate::symbol::SymbolId;

/// Result type for template operations.
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

fn half() -> f64 {
    0.5
}

/// A TOML knowledge pack.
///
/// `concepts` and `goals` feed the template library. `operations`,
/// `effectors` and `evergreens` describe the agent's body and standing
/// goals and are applied by the agent that loads the pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnowledgePack {
    /// Concept label → parent labels.
    #[serde(default)]
    pub concepts: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub goals: Vec<GoalTemplate>,
    #[serde(default)]
    pub operations: Vec<OperationDecl>,
    #[serde(default)]
    pub effectors: Vec<EffectorDecl>,
    #[serde(default)]
    pub evergreens: Vec<EvergreenDecl>,
}

impl KnowledgePack {
    pub fn from_toml_str(text: &str) -> TemplateResult<Self> {
        toml::from_str(text).map_err(|e| TemplateError::Parse {
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> TemplateResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io { source })?;
        Self::from_toml_str(&text)
    }

    /// Create (or extend) every declared concept in the graph.
    pub fn declare_concepts(&self, graph: &mut FrameGraph) -> DelibResult<()> {
        for (name, parents) in &self.concepts {
            let mut ids = Vec::with_capacity(parents.len());
            for parent in parents {
                ids.push(graph.concept(parent)?);
            }
            graph.concept_under(name, &ids)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalTemplate {
    pub name: String,
    #[serde(default = "half")]
    pub priority: f64,
    /// Variables a caller may bind at instantiation.
    #[serde(default)]
    pub variables: Vec<String>,
    pub plans: Vec<EventTemplate>,
}

impl GoalTemplate {
    pub fn validate(&self) -> TemplateResult<()> {
        if self.plans.is_empty() {
            return Err(TemplateError::NoPlans {
                name: self.name.clone(),
            });
        }
        check_fraction(&self.name, "priority", self.priority)?;
        for plan in &self.plans {
            check_fraction(&self.name, "cost", plan.cost)?;
        }
        Ok(())
    }

    /// Goal templates named by impasse resolutions anywhere in the plans.
    pub fn resolution_goals(&self) -> Vec<&str> {
        self.plans.iter().flat_map(|plan| plan.resolution_goals()).collect()
    }
}

fn check_fraction(name: &str, field: &'static str, value: f64) -> TemplateResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TemplateError::OutOfRange {
            name: name.into(),
            field,
            value,
        })
    }
}

/// An event in a plan. Top-level events are plans; nested ones are parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventTemplate {
    pub concept: String,
    /// Plan cost; ignored on nested parts.
    #[serde(default = "half")]
    pub cost: f64,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleValue>,
    #[serde(default)]
    pub parts: Vec<EventTemplate>,
    #[serde(default)]
    pub impasses: Vec<ImpasseTemplate>,
}

impl EventTemplate {
    fn resolution_goals(&self) -> Vec<&str> {
        let mut goals: Vec<&str> = self
            .impasses
            .iter()
            .flat_map(|i| i.resolutions.iter().map(|r| r.goal.as_str()))
            .collect();
        for part in &self.parts {
            goals.extend(part.resolution_goals());
        }
        goals
    }
}

/// A role filler: `$var` reads a goal variable, other strings name concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImpasseTemplate {
    pub name: String,
    /// Detector kind, resolved through the agent's detector registry.
    pub detector: String,
    #[serde(default)]
    pub resolutions: Vec<ResolutionTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionTemplate {
    /// Goal template to instantiate.
    pub goal: String,
    /// Variable of the blocked step's goal → variable of the new goal.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

/// Attach an operation kind to a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDecl {
    pub concept: String,
    pub kind: String,
    /// Effector type label the operation needs.
    #[serde(default)]
    pub requires: Option<String>,
}

/// A concrete effector of some effector type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EffectorDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub effector_type: String,
    /// Action kind run for every job.
    pub action: String,
    #[serde(default)]
    pub interrupt: Option<String>,
}

/// A standing condition on `subject.slot`.
///
/// Text values are compared as text, not as concept references. Under `AND`
/// and `OR`, a value may itself be a `{ comparator, values }` table checked
/// against the same slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvergreenDecl {
    #[serde(default)]
    pub name: Option<String>,
    /// Concept label of the observed frame.
    pub subject: String,
    pub slot: String,
    pub comparator: String,
    pub values: Vec<EvergreenValue>,
    /// Goal template injected while the condition fails.
    pub resolution: String,
}

/// One value of an evergreen condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvergreenValue {
    Literal(RoleValue),
    Nested(NestedCondition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedCondition {
    pub comparator: String,
    pub values: Vec<EvergreenValue>,
}

impl RoleValue {
    /// The value as a literal filler: text stays text.
    pub fn literal(&self) -> Filler {
        match self {
            Self::Bool(b) => Filler::Bool(*b),
            Self::Number(n) => Filler::Number(*n),
            Self::Text(t) => Filler::Text(t.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Instantiate
// ---------------------------------------------------------------------------

/// Expands goal templates into goal instances.
pub trait Instantiate: Send + Sync {
    /// Register a template, returning its concept frame.
    fn register(&mut self, graph: &mut FrameGraph, template: GoalTemplate) -> DelibResult<SymbolId>;

    /// Instantiate `template` in `scope`, binding the given variables.
    ///
    /// Returns the new goal instance frame.
    fn instantiate(
        &self,
        graph: &mut FrameGraph,
        template: &str,
        scope: Scope,
        bindings: &[(String, Filler)],
    ) -> DelibResult<SymbolId>;

    /// Concept frame of a registered template.
    fn template_concept(&self, template: &str) -> Option<SymbolId>;

    /// Declare a pack's concepts and register its goal templates.
    ///
    /// Returns the number of templates registered.
    fn load_pack(&mut self, graph: &mut FrameGraph, pack: &KnowledgePack) -> DelibResult<usize> {
        pack.declare_concepts(graph)?;
        for goal in &pack.goals {
            self.register(graph, goal.clone())?;
        }
        Ok(pack.goals.len())
    }
}

/// In-memory template library fed from knowledge packs.
#[derive(Debug, Default)]
pub struct TemplateLibrary {
    templates: HashMap<String, (SymbolId, GoalTemplate)>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl Instantiate for TemplateLibrary {
    fn register(&mut self, graph: &mut FrameGraph, template: GoalTemplate) -> DelibResult<SymbolId> {
        template.validate()?;
        if self.templates.contains_key(&template.name) {
            return Err(TemplateError::Duplicate {
                name: template.name,
            }
            .into());
        }
        let goal = graph.concept(concept::GOAL)?;
        let id = graph.concept_under(&template.name, &[goal])?;
        tracing::debug!(template = %template.name, concept = %id, "goal template registered");
        self.templates.insert(template.name.clone(), (id, template));
        Ok(id)
    }

    fn instantiate(
        &self,
        graph: &mut FrameGraph,
        template: &str,
        scope: Scope,
        bindings: &[(String, Filler)],
    ) -> DelibResult<SymbolId> {
        let (concept_id, tpl) =
            self.templates
                .get(template)
                .ok_or_else(|| TemplateError::NotFound {
                    template: template.into(),
                })?;

        let goal = graph.instance_of(*concept_id, scope.clone())?;
        graph.set_one(goal, slot::PRIORITY, tpl.priority)?;

        let mut realized: HashMap<&str, Filler> = HashMap::new();
        let varmap = graph.concept(concept::VARMAP)?;
        for var in &tpl.variables {
            let entry = graph.instance_of(varmap, scope.clone())?;
            graph.set_one(entry, slot::DEFINED, var.as_str())?;
            if let Some((_, filler)) = bindings.iter().find(|(name, _)| name == var) {
                graph.set_one(entry, slot::REALIZED, filler.clone())?;
                realized.insert(var.as_str(), filler.clone());
            }
            graph.push(goal, slot::HAS_VARMAP, entry)?;
        }
        for (name, _) in bindings {
            if !tpl.variables.contains(name) {
                tracing::warn!(template, variable = %name, "binding for undeclared variable ignored");
            }
        }

        let mut expander = Expander {
            graph,
            scope: &scope,
            realized: &realized,
        };
        for plan in &tpl.plans {
            let event = expander.event(plan)?;
            expander.graph.set_one(event, slot::COST, plan.cost)?;
            expander.graph.push(goal, slot::HAS_PLAN, event)?;
        }

        tracing::debug!(template, goal = %goal, %scope, "goal instantiated");
        Ok(goal)
    }

    fn template_concept(&self, template: &str) -> Option<SymbolId> {
        self.templates.get(template).map(|(id, _)| *id)
    }
}

/// Walks an event template tree, creating instance frames.
struct Expander<'a> {
    graph: &'a mut FrameGraph,
    scope: &'a Scope,
    realized: &'a HashMap<&'a str, Filler>,
}

impl Expander<'_> {
    fn event(&mut self, tpl: &EventTemplate) -> DelibResult<SymbolId> {
        let concept_id = match self.graph.lookup_concept(&tpl.concept) {
            Some(id) => id,
            None => {
                let event = self.graph.concept(concept::EVENT)?;
                self.graph.concept_under(&tpl.concept, &[event])?
            }
        };
        let event = self.graph.instance_of(concept_id, self.scope.clone())?;

        for (role, value) in &tpl.roles {
            let filler = match value {
                RoleValue::Text(text) => match text.strip_prefix('$') {
                    Some(var) => match self.realized.get(var) {
                        Some(filler) => filler.clone(),
                        None => continue,
                    },
                    None => Filler::Frame(self.graph.concept(text)?),
                },
                RoleValue::Number(n) => Filler::Number(*n),
                RoleValue::Bool(b) => Filler::Bool(*b),
            };
            self.graph.push(event, role, filler)?;
        }

        for part in &tpl.parts {
            let child = self.event(part)?;
            self.graph.push(event, slot::HAS_EVENT_AS_PART, child)?;
        }

        for impasse in &tpl.impasses {
            let frame = self.impasse(impasse)?;
            self.graph.push(event, slot::HAS_IMPASSE, frame)?;
        }
        Ok(event)
    }

    fn impasse(&mut self, tpl: &ImpasseTemplate) -> DelibResult<SymbolId> {
        let impasse_concept = self.graph.concept(concept::IMPASSE)?;
        let resolution_concept = self.graph.concept(concept::RESOLUTION)?;
        let binding_concept = self.graph.concept(concept::BINDING)?;

        let impasse = self.graph.instance_of(impasse_concept, self.scope.clone())?;
        self.graph.set_one(impasse, slot::NAME, tpl.name.as_str())?;
        self.graph.set_one(impasse, slot::DETECT, tpl.detector.as_str())?;
        for res in &tpl.resolutions {
            let resolution = self.graph.instance_of(resolution_concept, self.scope.clone())?;
            self.graph.set_one(resolution, slot::HAS_GOAL, res.goal.as_str())?;
            for (local, to) in &res.bindings {
                let binding = self.graph.instance_of(binding_concept, self.scope.clone())?;
                self.graph.set_one(binding, slot::BIND_LOCAL, local.as_str())?;
                self.graph.set_one(binding, slot::BIND_TO, to.as_str())?;
                self.graph.push(resolution, slot::HAS_BINDING, binding)?;
            }
            self.graph.push(impasse, slot::HAS_RESOLUTION, resolution)?;
        }
        Ok(impasse)
    }
}
