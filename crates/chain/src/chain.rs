//! `Chain`: a named, lazily planned view over a dynamic engine set.
//!
//! The plan is computed on first read and cached until an engine event
//! invalidates it. Check, compute and store happen under one mutex so
//! concurrent readers never recompute twice or see a half-built plan.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use engines::EnhancementProperties;
use tracing::{debug, info, instrument};

use crate::config::{ChainConfig, EngineSelection};
use crate::error::{ChainError, ConfigError};
use crate::models::ExecutionPlan;
use crate::resolver::resolve_plan;
use crate::source::{EngineListener, EngineSource};

#[derive(Clone)]
struct Planned {
    plan: Arc<ExecutionPlan>,
    engines: BTreeSet<String>,
}

enum State {
    /// `None` until the next read recomputes the plan.
    Active(Option<Planned>),
    Closed,
}

/// A named provider of an execution plan.
pub struct Chain {
    name: String,
    selection: EngineSelection,
    properties: EnhancementProperties,
    source: Arc<dyn EngineSource>,
    state: Mutex<State>,
    computations: AtomicUsize,
}

impl Chain {
    /// Create a chain; its plan is computed on first read.
    pub fn new(
        name: impl Into<String>,
        selection: EngineSelection,
        source: Arc<dyn EngineSource>,
    ) -> Self {
        Self {
            name: name.into(),
            selection,
            properties: EnhancementProperties::new(),
            source,
            state: Mutex::new(State::Active(None)),
            computations: AtomicUsize::new(0),
        }
    }

    /// Chain over every engine `source` reports as active.
    pub fn all_active(name: impl Into<String>, source: Arc<dyn EngineSource>) -> Self {
        Self::new(name, EngineSelection::AllActive, source)
    }

    /// Build a chain from its configuration. The `enabled` flag and ranking
    /// are the [`ChainManager`](crate::ChainManager)'s concern.
    pub fn from_config(
        config: &ChainConfig,
        source: Arc<dyn EngineSource>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(config.name.clone(), config.selection()?, source)
            .with_properties(config.properties.clone()))
    }

    /// Set the chain-wide enhancement properties carried by every plan.
    pub fn with_properties(mut self, properties: EnhancementProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selection(&self) -> &EngineSelection {
        &self.selection
    }

    pub fn properties(&self) -> &EnhancementProperties {
        &self.properties
    }

    /// The current execution plan; the same `Arc` is returned until the
    /// engine set changes.
    ///
    /// # Errors
    /// - [`ChainError::Closed`] once [`Chain::close`] was called.
    /// - [`ChainError::Unavailable`] if no selected engine is active.
    /// - [`ChainError::Plan`] if the engine configuration cannot be planned.
    pub fn execution_plan(&self) -> Result<Arc<ExecutionPlan>, ChainError> {
        Ok(self.planned()?.plan)
    }

    /// Names of the engines contributing to the current plan.
    pub fn engines(&self) -> Result<BTreeSet<String>, ChainError> {
        Ok(self.planned()?.engines)
    }

    /// How many times the plan was computed.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), State::Closed)
    }

    /// Drop all cached state. Every later read fails with
    /// [`ChainError::Closed`].
    pub fn close(&self) {
        *self.lock() = State::Closed;
        info!(chain = %self.name, "chain closed");
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn planned(&self) -> Result<Planned, ChainError> {
        let mut state = self.lock();
        match &mut *state {
            State::Closed => Err(ChainError::Closed { chain: self.name.clone() }),
            State::Active(Some(planned)) => Ok(planned.clone()),
            State::Active(cache) => {
                let planned = self.compute()?;
                *cache = Some(planned.clone());
                Ok(planned)
            }
        }
    }

    #[instrument(skip(self), fields(chain = %self.name))]
    fn compute(&self) -> Result<Planned, ChainError> {
        self.computations.fetch_add(1, Ordering::Relaxed);

        let selected = self.selection.select(self.source.active_engines());
        let mut plan =
            resolve_plan(&self.name, &selected.engines, &selected.optional, &selected.missing)
                .map_err(|e| ChainError::from_plan(&self.name, e))?;

        plan.properties = self.properties.clone();
        for node in plan.phases.iter_mut().flat_map(|p| p.nodes.iter_mut()) {
            if let Some(properties) = selected.properties.get(&node.engine) {
                node.properties = properties.clone();
            }
        }

        info!(
            "plan computed: {} engines in {} phases {:?}",
            plan.len(),
            plan.phases.len(),
            plan.flatten()
        );

        Ok(Planned {
            engines: plan.engine_names(),
            plan: Arc::new(plan),
        })
    }

    fn invalidate(&self, name: &str, event: &str) {
        if let State::Active(cache) = &mut *self.lock() {
            if cache.take().is_some() {
                debug!(chain = %self.name, engine = name, "engine {event}, plan invalidated");
            }
        }
    }

    pub fn on_engine_added(&self, name: &str) {
        self.invalidate(name, "added");
    }

    pub fn on_engine_removed(&self, name: &str) {
        self.invalidate(name, "removed");
    }

    pub fn on_engine_modified(&self, name: &str) {
        self.invalidate(name, "modified");
    }
}

impl EngineListener for Chain {
    fn on_engine_added(&self, name: &str) {
        Chain::on_engine_added(self, name);
    }

    fn on_engine_removed(&self, name: &str) {
        Chain::on_engine_removed(self, name);
    }

    fn on_engine_modified(&self, name: &str) {
        Chain::on_engine_modified(self, name);
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("selection", &self.selection)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineRef;
    use crate::error::PlanError;
    use crate::models::EngineDescriptor;
    use crate::source::EngineRegistry;
    use engines::mock::MockEngine;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::thread;

    fn registry_with(engines: Vec<MockEngine>) -> Arc<EngineRegistry> {
        let registry = Arc::new(EngineRegistry::new());
        for e in engines {
            registry.register(Arc::new(e));
        }
        registry
    }

    fn mock(name: &str) -> MockEngine {
        MockEngine::returning(name, json!({}))
    }

    fn subscribed(registry: &Arc<EngineRegistry>, chain: Chain) -> Arc<Chain> {
        let chain = Arc::new(chain);
        let listener: Arc<dyn EngineListener> = chain.clone();
        registry.subscribe(&listener);
        chain
    }

    #[test]
    fn cached_plan_is_returned_without_recomputation() {
        let registry = registry_with(vec![mock("a"), mock("b")]);
        let chain = Chain::all_active("default", registry);

        let first = chain.execution_plan().unwrap();
        let second = chain.execution_plan().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(chain.computations(), 1);
        assert_eq!(chain.engines().unwrap().len(), 2);
        assert_eq!(chain.computations(), 1);
    }

    #[test]
    fn added_engine_appears_after_invalidation() {
        let registry = registry_with(vec![mock("a")]);
        let chain = subscribed(&registry, Chain::all_active("default", registry.clone()));

        let before = chain.execution_plan().unwrap();
        assert_eq!(before.flatten(), vec!["a"]);

        registry.register(Arc::new(mock("x").after(["a"])));

        let after = chain.execution_plan().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.flatten(), vec!["a", "x"]);
        assert!(chain.engines().unwrap().contains("x"));
        assert_eq!(chain.computations(), 2);
    }

    #[test]
    fn invalidation_does_not_recompute_eagerly() {
        let registry = registry_with(vec![mock("a")]);
        let chain = Chain::all_active("default", registry);
        chain.execution_plan().unwrap();

        chain.on_engine_added("b");
        chain.on_engine_modified("a");
        chain.on_engine_removed("b");
        assert_eq!(chain.computations(), 1);

        chain.execution_plan().unwrap();
        assert_eq!(chain.computations(), 2);
    }

    #[test]
    fn no_active_engines_makes_chain_unavailable() {
        let registry = Arc::new(EngineRegistry::new());
        let chain = Chain::all_active("empty", registry);
        assert_eq!(
            chain.execution_plan(),
            Err(ChainError::Unavailable { chain: "empty".into() })
        );
        assert!(matches!(chain.engines(), Err(ChainError::Unavailable { .. })));
    }

    #[test]
    fn unavailable_chain_recovers_when_an_engine_registers() {
        let registry = Arc::new(EngineRegistry::new());
        let chain = subscribed(&registry, Chain::all_active("late", registry.clone()));
        assert!(chain.execution_plan().is_err());

        registry.register(Arc::new(mock("a")));
        assert_eq!(chain.execution_plan().unwrap().flatten(), vec!["a"]);
    }

    #[test]
    fn configuration_errors_propagate_unchanged() {
        let source: Arc<dyn EngineSource> = Arc::new(vec![
            EngineDescriptor::new("a").depends_on(["b"]),
            EngineDescriptor::new("b").depends_on(["a"]),
        ]);
        let chain = Chain::all_active("cyclic", source);

        match chain.execution_plan() {
            Err(ChainError::Plan { chain, source: PlanError::CyclicDependency { engines } }) => {
                assert_eq!(chain, "cyclic");
                assert_eq!(engines, vec!["a", "b"]);
            }
            other => panic!("expected cyclic dependency, got {other:?}"),
        }
    }

    #[test]
    fn closed_chain_fails_and_ignores_events() {
        let registry = registry_with(vec![mock("a")]);
        let chain = Chain::all_active("default", registry);
        chain.execution_plan().unwrap();

        chain.close();
        chain.on_engine_added("b");

        assert!(chain.is_closed());
        assert_eq!(chain.execution_plan(), Err(ChainError::Closed { chain: "default".into() }));
        assert_eq!(chain.engines(), Err(ChainError::Closed { chain: "default".into() }));
        assert_eq!(chain.computations(), 1);
    }

    #[test]
    fn listed_chain_plans_only_its_engines() {
        let registry = registry_with(vec![mock("tika"), mock("ner"), mock("unlisted")]);
        let chain = Chain::new(
            "listed",
            EngineSelection::Listed(vec![
                EngineRef::parse("ner;dependsOn=tika").unwrap(),
                EngineRef::required("tika"),
                EngineRef::optional("dates"),
            ]),
            registry,
        );

        let plan = chain.execution_plan().unwrap();
        assert_eq!(plan.flatten(), vec!["tika", "ner"]);
        assert_eq!(plan.missing.len(), 1);
        assert!(plan.missing[0].optional);
    }

    #[test]
    fn listed_chain_with_no_active_engine_is_unavailable() {
        let registry = registry_with(vec![mock("other")]);
        let chain = Chain::new(
            "listed",
            EngineSelection::Listed(vec![EngineRef::required("tika")]),
            registry,
        );
        assert!(matches!(chain.execution_plan(), Err(ChainError::Unavailable { .. })));
    }

    #[test]
    fn concurrent_readers_share_one_computation() {
        let registry = registry_with((0..20).map(|i| mock(&format!("e{i:02}"))).collect());
        let chain = Arc::new(Chain::all_active("default", registry));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let chain = chain.clone();
                thread::spawn(move || chain.execution_plan().unwrap())
            })
            .collect();
        let plans: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(chain.computations(), 1);
        assert!(plans.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn listed_chain_rejects_duplicate_engine_names() {
        let source: Arc<dyn EngineSource> = Arc::new(vec![
            EngineDescriptor::new("a").with_ordering(1),
            EngineDescriptor::new("a").with_ordering(2),
        ]);
        let all = Chain::all_active("all", source.clone());
        let listed = Chain::new(
            "listed",
            EngineSelection::Listed(vec![EngineRef::required("a")]),
            source,
        );

        for chain in [&all, &listed] {
            assert!(matches!(
                chain.execution_plan(),
                Err(ChainError::Plan { source: PlanError::DuplicateEngine(name), .. }) if name == "a"
            ));
        }
    }

    #[test]
    fn configured_properties_are_attached_to_the_plan() {
        let registry = registry_with(vec![mock("tika"), mock("ner")]);
        let config = ChainConfig {
            engines: vec!["tika".into(), "ner;dependsOn=tika;lang=de".into()],
            properties: BTreeMap::from([("lang".to_string(), vec!["en".to_string()])]),
            ..ChainConfig::all_active("props")
        };
        let chain = Chain::from_config(&config, registry).unwrap();

        let plan = chain.execution_plan().unwrap();
        assert_eq!(plan.properties, config.properties);
        assert!(plan.node("tika").unwrap().properties.is_empty());
        assert_eq!(plan.node("ner").unwrap().properties["lang"], vec!["de"]);
        assert_eq!(plan.enhancement_properties("tika")["lang"], vec!["en"]);
        assert_eq!(plan.enhancement_properties("ner")["lang"], vec!["de"]);
    }

    #[test]
    fn from_config_rejects_bad_entries() {
        let config = ChainConfig {
            engines: vec!["a;bogus".into()],
            ..ChainConfig::all_active("bad")
        };
        let source: Arc<dyn EngineSource> = Arc::new(Vec::<EngineDescriptor>::new());
        assert!(matches!(
            Chain::from_config(&config, source),
            Err(ConfigError::UnknownParameter { .. })
        ));
    }
}
