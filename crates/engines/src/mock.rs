//! `MockEngine`: a test double for `EnhancementEngine`.
//!
//! Useful in unit and integration tests where a real engine implementation
//! is either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::{
    traits::ORDERING_DEFAULT, ContentItem, EngineError, EnhancementContext, EnhancementEngine,
    EnhancementProperties,
};

/// Behaviour injected into `MockEngine` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Retryable` error this many times, then return the value.
    FlakyThenReturn(usize, Value),
    /// Fail with a `Fatal` error.
    FailFatal(String),
}

/// What one `enhance` call was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Names of the enhancements visible to the call, sorted.
    pub enhancements: Vec<String>,
    pub properties: EnhancementProperties,
}

/// A mock engine that records every call it receives and returns a
/// programmer-specified result.
pub struct MockEngine {
    /// Engine name.
    pub name: String,
    pub ordering: i32,
    pub dependencies: Vec<String>,
    /// Answer given by `can_enhance`.
    pub accepts: bool,
    /// What the engine will do when `enhance` is called.
    pub behaviour: MockBehaviour,
    /// Every call received, in call order.
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockEngine {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            ordering: ORDERING_DEFAULT,
            dependencies: Vec::new(),
            accepts: true,
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock that fails `failures` times before succeeding.
    pub fn flaky(name: impl Into<String>, failures: usize, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::FlakyThenReturn(failures, value))
    }

    /// Set the ordering hint.
    pub fn ordered(mut self, ordering: i32) -> Self {
        self.ordering = ordering;
        self
    }

    /// Declare engines that must run before this one.
    pub fn after<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Make `can_enhance` return `false`.
    pub fn rejecting(mut self) -> Self {
        self.accepts = false;
        self
    }

    /// Number of times this engine has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Enhancement names seen by the `n`-th call.
    pub fn seen(&self, call: usize) -> Option<Vec<String>> {
        self.calls.lock().unwrap().get(call).map(|c| c.enhancements.clone())
    }

    /// Enhancement properties given to the `n`-th call.
    pub fn properties_seen(&self, call: usize) -> Option<EnhancementProperties> {
        self.calls.lock().unwrap().get(call).map(|c| c.properties.clone())
    }
}

#[async_trait]
impl EnhancementEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordering(&self) -> i32 {
        self.ordering
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn can_enhance(&self, _item: &ContentItem) -> bool {
        self.accepts
    }

    async fn enhance(
        &self,
        _item: &ContentItem,
        ctx: &EnhancementContext,
    ) -> Result<Value, EngineError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(MockCall {
                enhancements: ctx.enhancements.keys().cloned().collect(),
                properties: ctx.properties.clone(),
            });
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(tagged(&self.name, v)),
            MockBehaviour::FlakyThenReturn(failures, v) => {
                if call <= *failures {
                    Err(EngineError::Retryable(format!("attempt {call} failed")))
                } else {
                    Ok(tagged(&self.name, v))
                }
            }
            MockBehaviour::FailRetryable(msg) => Err(EngineError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(EngineError::Fatal(msg.clone())),
        }
    }
}

/// Merge the engine's own value with an `engine` field so tests can trace
/// which engine produced an enhancement.
fn tagged(name: &str, v: &Value) -> Value {
    let mut out = json!({ "engine": name });
    if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
        for (k, val) in v_obj {
            out_obj.insert(k.clone(), val.clone());
        }
    }
    out
}
