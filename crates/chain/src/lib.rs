//! `chain` crate: execution planning for enhancement chains.
//!
//! Engine descriptors are resolved into an [`ExecutionPlan`] of ordered
//! phases; a [`Chain`] caches that plan over a live [`EngineSource`], and
//! the [`ChainRunner`] walks it, recording [`ExecutionMetadata`].

pub mod models;
pub mod error;
pub mod resolver;
pub mod source;
pub mod config;
pub mod chain;
pub mod manager;
pub mod metadata;
pub mod runner;

pub use models::{EngineDescriptor, ExecutionNode, ExecutionPlan, MissingEngine, Phase};
pub use error::{ChainError, ConfigError, EngineFailure, PlanError, RunError};
pub use resolver::resolve_plan;
pub use source::{EngineListener, EngineRegistry, EngineSource};
pub use config::{ChainConfig, ChainSetup, EngineRef, EngineSelection};
pub use chain::Chain;
pub use manager::{ChainManager, DEFAULT_CHAIN_NAME};
pub use metadata::{EngineExecution, ExecutionMetadata, ExecutionStatus};
pub use runner::{ChainRunner, ExecutionResult, RunnerConfig};

pub use engines::EnhancementProperties;
