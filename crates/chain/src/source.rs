//! Where chains get their engines from.
//!
//! A [`Chain`](crate::Chain) only sees an [`EngineSource`]: a provider of the
//! currently active engine descriptors. [`EngineRegistry`] is the live
//! implementation; it also holds the engine objects the runner invokes and
//! tells subscribed listeners about every change.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use engines::EnhancementEngine;
use tracing::{debug, info};

use crate::models::EngineDescriptor;

/// Snapshot provider for the active engines.
pub trait EngineSource: Send + Sync {
    /// Descriptors of the engines active right now.
    fn active_engines(&self) -> Vec<EngineDescriptor>;
}

/// A fixed engine set.
impl EngineSource for Vec<EngineDescriptor> {
    fn active_engines(&self) -> Vec<EngineDescriptor> {
        self.clone()
    }
}

/// Receives engine lifecycle events.
pub trait EngineListener: Send + Sync {
    fn on_engine_added(&self, name: &str);
    fn on_engine_removed(&self, name: &str);
    fn on_engine_modified(&self, name: &str);
}

#[derive(Clone, Copy)]
enum EngineEvent {
    Added,
    Removed,
    Modified,
}

/// Live, in-memory registry of enhancement engines keyed by name.
#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<BTreeMap<String, Arc<dyn EnhancementEngine>>>,
    listeners: RwLock<Vec<Weak<dyn EngineListener>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine, replacing any engine of the same name.
    ///
    /// Replacing an engine is reported to listeners as a modification.
    pub fn register(&self, engine: Arc<dyn EnhancementEngine>) {
        let name = engine.name().to_owned();
        let replaced = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), engine)
            .is_some();

        if replaced {
            info!("engine '{}' replaced", name);
            self.notify(&name, EngineEvent::Modified);
        } else {
            info!("engine '{}' registered", name);
            self.notify(&name, EngineEvent::Added);
        }
    }

    /// Remove an engine. Returns it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn EnhancementEngine>> {
        let removed = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        if removed.is_some() {
            info!("engine '{}' unregistered", name);
            self.notify(name, EngineEvent::Removed);
        }
        removed
    }

    /// Report that a registered engine changed its planning metadata.
    pub fn modified(&self, name: &str) {
        if self.get(name).is_some() {
            self.notify(name, EngineEvent::Modified);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EnhancementEngine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names of the registered engines, sorted.
    pub fn names(&self) -> Vec<String> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Subscribe to engine events. The registry only keeps a weak reference,
    /// so dropping the listener unsubscribes it.
    pub fn subscribe(&self, listener: &Arc<dyn EngineListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(listener));
    }

    fn notify(&self, name: &str, event: EngineEvent) {
        // Upgrade under the lock, call outside it.
        let live: Vec<Arc<dyn EngineListener>> = {
            let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        debug!("notifying {} listener(s) about engine '{}'", live.len(), name);

        for listener in live {
            match event {
                EngineEvent::Added => listener.on_engine_added(name),
                EngineEvent::Removed => listener.on_engine_removed(name),
                EngineEvent::Modified => listener.on_engine_modified(name),
            }
        }
    }
}

impl EngineSource for EngineRegistry {
    fn active_engines(&self) -> Vec<EngineDescriptor> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| EngineDescriptor::of(e.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engines::mock::MockEngine;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl EngineListener for Recorder {
        fn on_engine_added(&self, name: &str) {
            self.events.lock().unwrap().push(format!("added:{name}"));
        }
        fn on_engine_removed(&self, name: &str) {
            self.events.lock().unwrap().push(format!("removed:{name}"));
        }
        fn on_engine_modified(&self, name: &str) {
            self.events.lock().unwrap().push(format!("modified:{name}"));
        }
    }

    fn mock(name: &str) -> Arc<dyn EnhancementEngine> {
        Arc::new(MockEngine::returning(name, json!({})))
    }

    #[test]
    fn snapshot_reflects_registered_engines() {
        let registry = EngineRegistry::new();
        registry.register(Arc::new(
            MockEngine::returning("ner", json!({})).ordered(4).after(["langid"]),
        ));
        registry.register(mock("langid"));

        let snapshot = registry.active_engines();
        assert_eq!(snapshot.len(), 2);
        let ner = snapshot.iter().find(|d| d.name == "ner").unwrap();
        assert_eq!(ner.ordering, 4);
        assert!(ner.dependencies.contains("langid"));
        assert_eq!(registry.names(), vec!["langid", "ner"]);
    }

    #[test]
    fn listeners_receive_every_event() {
        let registry = EngineRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn EngineListener> = recorder.clone();
        registry.subscribe(&listener);

        registry.register(mock("a"));
        registry.register(mock("a"));
        registry.modified("a");
        registry.modified("unknown");
        registry.unregister("a");
        registry.unregister("a");

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["added:a", "modified:a", "modified:a", "removed:a"]
        );
    }

    #[test]
    fn dropped_listeners_are_forgotten() {
        let registry = EngineRegistry::new();
        let listener: Arc<dyn EngineListener> = Arc::new(Recorder::default());
        registry.subscribe(&listener);
        drop(listener);

        registry.register(mock("a"));
        assert!(registry.listeners.read().unwrap().is_empty());
    }

    #[test]
    fn static_descriptor_list_is_a_source() {
        let source: Vec<EngineDescriptor> = vec![EngineDescriptor::new("x")];
        assert_eq!(source.active_engines(), vec![EngineDescriptor::new("x")]);
    }
}
