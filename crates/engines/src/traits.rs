//! The `EnhancementEngine` trait: the contract every engine must fulfil.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::EngineError;

/// Ordering hint used by engines that do not declare one.
pub const ORDERING_DEFAULT: i32 = 0;

/// Enhancement properties: multi-valued settings keyed by name, configured
/// per chain and per engine entry of a chain.
pub type EnhancementProperties = BTreeMap<String, Vec<String>>;

/// The content being enhanced by a chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub mime_type: String,
    pub content: String,
}

impl ContentItem {
    /// Create a content item with a fresh random ID.
    pub fn new(mime_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    /// Convenience constructor for `text/plain` content.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new("text/plain", content)
    }
}

/// Shared context passed to every engine during a chain run.
///
/// Defined here (in the engines crate) so both the chain crate and the
/// individual engine implementations can import it without a circular
/// dependency.
#[derive(Debug, Clone)]
pub struct EnhancementContext {
    /// Name of the chain being executed.
    pub chain: String,
    /// ID of the current chain execution.
    pub execution_id: Uuid,
    /// Enhancements produced so far, keyed by engine name.
    pub enhancements: BTreeMap<String, Value>,
    /// Chain properties overlaid with the properties of this engine's entry.
    pub properties: EnhancementProperties,
}

/// The core engine trait.
#[async_trait]
pub trait EnhancementEngine: Send + Sync {
    /// Unique name of the engine. Chains reference engines by this name.
    fn name(&self) -> &str;

    /// Ordering hint; lower values run earlier among independent engines.
    fn ordering(&self) -> i32 {
        ORDERING_DEFAULT
    }

    /// Engines that must have run before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this engine is able to process the given item. Engines that
    /// return `false` are skipped.
    fn can_enhance(&self, _item: &ContentItem) -> bool {
        true
    }

    /// Enhance `item` and return this engine's enhancement as JSON.
    async fn enhance(
        &self,
        item: &ContentItem,
        ctx: &EnhancementContext,
    ) -> Result<Value, EngineError>;
}
