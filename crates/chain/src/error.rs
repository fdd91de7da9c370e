//! Chain-level error types.

use thiserror::Error;

use crate::metadata::ExecutionMetadata;

/// Errors produced while resolving an execution plan.
///
/// All variants are deterministic functions of the input: retrying without
/// changing the engine set or its configuration yields the same error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// No engines were supplied.
    #[error("no active engines available")]
    EmptyEngineSet,

    /// A descriptor has an empty name.
    #[error("engine name must not be empty")]
    EmptyEngineName,

    /// Two or more descriptors share the same name.
    #[error("duplicate engine: '{0}'")]
    DuplicateEngine(String),

    /// A descriptor lists itself as a dependency.
    #[error("engine '{0}' depends on itself")]
    SelfDependency(String),

    /// A dependency is neither present, optional nor known to be missing.
    #[error("engine '{engine}' depends on unknown engine '{dependency}'")]
    UnresolvableDependency { engine: String, dependency: String },

    /// Phase assignment made no progress; `engines` were left unassigned.
    #[error("cyclic dependency between engines {engines:?}")]
    CyclicDependency { engines: Vec<String> },
}

/// Errors surfaced by a [`Chain`](crate::Chain).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// The chain currently has no active engines.
    #[error("chain '{chain}' currently has no active engines")]
    Unavailable { chain: String },

    /// The chain was closed and can no longer produce plans.
    #[error("chain '{chain}' is closed")]
    Closed { chain: String },

    /// The chain's engine configuration cannot be planned.
    #[error("chain '{chain}' cannot be planned: {source}")]
    Plan {
        chain: String,
        #[source]
        source: PlanError,
    },
}

impl ChainError {
    pub(crate) fn from_plan(chain: &str, err: PlanError) -> Self {
        match err {
            PlanError::EmptyEngineSet => ChainError::Unavailable { chain: chain.to_owned() },
            source => ChainError::Plan { chain: chain.to_owned(), source },
        }
    }
}

/// Errors in chain configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chain name must not be empty")]
    EmptyChainName,

    #[error("engine entry '{0}' has an empty engine name")]
    EmptyEngineName(String),

    #[error("engine entry '{entry}' has unknown parameter '{parameter}'")]
    UnknownParameter { entry: String, parameter: String },

    #[error("engine '{0}' is listed more than once")]
    DuplicateEngine(String),

    #[error("invalid chain setup: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Why a single engine execution failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineFailure {
    /// The engine failed with a fatal error.
    #[error("failed fatally: {0}")]
    Fatal(String),

    /// The engine's retryable error was exhausted.
    #[error("exceeded retry limit after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// The engine is part of the plan but not registered.
    #[error("engine is not active")]
    NotActive,
}

/// Errors produced by the [`ChainRunner`](crate::ChainRunner).
#[derive(Debug, Error)]
pub enum RunError {
    /// No plan could be obtained from the chain.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A required engine failed; the whole chain execution is aborted.
    #[error("required engine '{engine}' {reason}")]
    EngineFailed {
        engine: String,
        reason: EngineFailure,
        /// Per-engine statuses at the time the chain was aborted.
        metadata: Box<ExecutionMetadata>,
    },
}
