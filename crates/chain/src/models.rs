//! Core planning models.
//!
//! An [`EngineDescriptor`] is what the resolver consumes; an
//! [`ExecutionPlan`] is what it produces. Both serialise to JSON so plans can
//! be printed by the CLI and descriptors loaded from a setup file.

use std::collections::{BTreeMap, BTreeSet};

use engines::{EnhancementEngine, EnhancementProperties, ORDERING_DEFAULT};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EngineDescriptor
// ---------------------------------------------------------------------------

/// Planning view of one enhancement engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    /// Unique name of the engine within a chain.
    pub name: String,
    /// Lower runs earlier among engines of the same phase.
    #[serde(default)]
    pub ordering: i32,
    /// Engines that must run strictly before this one.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl EngineDescriptor {
    /// Descriptor with the default ordering and no dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordering: ORDERING_DEFAULT,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_ordering(mut self, ordering: i32) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    /// Snapshot the planning metadata of a live engine.
    pub fn of(engine: &dyn EnhancementEngine) -> Self {
        Self {
            name: engine.name().to_owned(),
            ordering: engine.ordering(),
            dependencies: engine.dependencies().into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionNode / Phase
// ---------------------------------------------------------------------------

/// One engine invocation in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub engine: String,
    /// Failure of an optional node does not abort the chain.
    pub optional: bool,
    pub ordering: i32,
    /// Engines of this plan that must complete first.
    pub depends_on: BTreeSet<String>,
    /// Properties configured on this engine's chain entry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: EnhancementProperties,
}

/// Nodes without ordering constraints between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub index: usize,
    /// Sorted by `(ordering, engine)`.
    pub nodes: Vec<ExecutionNode>,
}

/// An engine the chain asks for but which is not active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingEngine {
    pub engine: String,
    pub optional: bool,
}

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// Strictly ordered phases computed for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub chain: String,
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingEngine>,
    /// Chain-wide properties, shared by every node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: EnhancementProperties,
}

impl ExecutionPlan {
    /// All nodes in deterministic execution order.
    pub fn nodes(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.phases.iter().flat_map(|p| p.nodes.iter())
    }

    /// Engine names in deterministic execution order.
    pub fn flatten(&self) -> Vec<&str> {
        self.nodes().map(|n| n.engine.as_str()).collect()
    }

    /// Names of the engines contributing to this plan.
    pub fn engine_names(&self) -> BTreeSet<String> {
        self.nodes().map(|n| n.engine.clone()).collect()
    }

    pub fn node(&self, engine: &str) -> Option<&ExecutionNode> {
        self.nodes().find(|n| n.engine == engine)
    }

    pub fn phase_of(&self, engine: &str) -> Option<usize> {
        self.phases
            .iter()
            .find(|p| p.nodes.iter().any(|n| n.engine == engine))
            .map(|p| p.index)
    }

    /// Number of execution nodes.
    pub fn len(&self) -> usize {
        self.phases.iter().map(|p| p.nodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Properties seen by `engine`: the chain properties, overridden key by
    /// key by those of the engine's entry.
    pub fn enhancement_properties(&self, engine: &str) -> EnhancementProperties {
        let mut properties = self.properties.clone();
        if let Some(node) = self.node(engine) {
            properties.extend(node.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        properties
    }

    /// Nodes that may run once `completed` have finished: not completed
    /// themselves and with every dependency completed.
    pub fn executable<'a>(&'a self, completed: &BTreeSet<String>) -> Vec<&'a ExecutionNode> {
        self.nodes()
            .filter(|n| !completed.contains(&n.engine))
            .filter(|n| n.depends_on.iter().all(|d| completed.contains(d)))
            .collect()
    }
}
