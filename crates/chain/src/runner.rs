//! Chain execution.
//!
//! `ChainRunner` walks a chain's execution plan:
//! 1. Fails the run up front if a required engine is missing.
//! 2. Runs phases in order and the engines of a phase in plan order. All
//!    engines of a phase see the enhancements of earlier phases only, plus
//!    the enhancement properties of their plan node.
//! 3. Handles `EngineError::Retryable` (up to `max_retries`) and
//!    `EngineError::Fatal` (fail immediately).
//! 4. Keeps going after an optional engine fails; aborts the run when a
//!    required engine fails.
//! 5. Records every engine's status in `ExecutionMetadata`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use engines::{ContentItem, EngineError, EnhancementContext, EnhancementEngine};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::Chain;
use crate::error::{EngineFailure, RunError};
use crate::metadata::{ExecutionMetadata, ExecutionStatus};
use crate::source::EngineRegistry;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of times a retryable engine failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Upper bound for a single back-off delay.
    pub max_retry_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl RunnerConfig {
    /// Delay before retry number `attempt` (1-based):
    /// `retry_base_delay * 2^(attempt - 1)`, capped at `max_retry_delay`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.retry_base_delay.checked_mul(factor))
            .map_or(self.max_retry_delay, |delay| delay.min(self.max_retry_delay))
    }
}

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

/// The result of running a chain to completion.
#[derive(Debug)]
pub struct ExecutionResult {
    pub metadata: ExecutionMetadata,
    /// Enhancements of the engines that completed, keyed by engine name.
    pub enhancements: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// ChainRunner
// ---------------------------------------------------------------------------

/// Runs content items through chains, invoking engines from a registry.
pub struct ChainRunner {
    registry: Arc<EngineRegistry>,
    config: RunnerConfig,
}

impl ChainRunner {
    pub fn new(registry: Arc<EngineRegistry>, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// Run `item` through `chain`.
    ///
    /// # Errors
    /// [`RunError::Chain`] if the chain has no plan, [`RunError::EngineFailed`]
    /// if a required engine is missing or fails.
    #[instrument(skip(self, chain, item), fields(chain = %chain.name(), item = %item.id))]
    pub async fn run(&self, chain: &Chain, item: &ContentItem) -> Result<ExecutionResult, RunError> {
        let plan = chain.execution_plan()?;
        let mut metadata = ExecutionMetadata::for_plan(&plan);
        metadata.start();

        for missing in &plan.missing {
            if missing.optional {
                metadata.set_skipped(&missing.engine, "optional engine is not active");
            } else {
                error!("required engine '{}' is not active", missing.engine);
                metadata.set_failed(&missing.engine, "required engine is not active");
                return Err(abort(metadata, &missing.engine, EngineFailure::NotActive));
            }
        }

        let mut enhancements: BTreeMap<String, Value> = BTreeMap::new();

        for phase in &plan.phases {
            debug!("phase {} with {} engine(s)", phase.index, phase.nodes.len());

            let mut produced: Vec<(String, Value)> = Vec::with_capacity(phase.nodes.len());

            for node in &phase.nodes {
                let name = node.engine.as_str();

                let outcome = match self.registry.get(name) {
                    None => Err(EngineFailure::NotActive),
                    Some(engine) if !engine.can_enhance(item) => {
                        debug!("engine '{}' cannot enhance item, skipped", name);
                        metadata.set_skipped(name, "engine cannot enhance the content item");
                        continue;
                    }
                    Some(engine) => {
                        let ctx = EnhancementContext {
                            chain: plan.chain.clone(),
                            execution_id: metadata.execution_id,
                            enhancements: enhancements.clone(),
                            properties: plan.enhancement_properties(name),
                        };
                        metadata.set_in_progress(name);
                        self.execute_with_retry(name, engine.as_ref(), item, &ctx).await
                    }
                };

                match outcome {
                    Ok(output) => {
                        info!("engine '{}' completed", name);
                        metadata.set_completed(name);
                        produced.push((name.to_owned(), output));
                    }
                    Err(failure) if node.optional => {
                        warn!("optional engine '{}' {}", name, failure);
                        metadata.set_failed(name, failure.to_string());
                    }
                    Err(failure) => {
                        error!("required engine '{}' {}", name, failure);
                        metadata.set_failed(name, failure.to_string());
                        return Err(abort(metadata, name, failure));
                    }
                }
            }

            enhancements.extend(produced);
        }

        metadata.finish(ExecutionStatus::Completed, None);
        info!(
            "chain '{}' execution {} completed",
            plan.chain, metadata.execution_id
        );

        Ok(ExecutionResult { metadata, enhancements })
    }

    // -----------------------------------------------------------------------
    // Internal: execute a single engine with retry logic.
    // -----------------------------------------------------------------------

    async fn execute_with_retry(
        &self,
        name: &str,
        engine: &dyn EnhancementEngine,
        item: &ContentItem,
        ctx: &EnhancementContext,
    ) -> Result<Value, EngineFailure> {
        let mut attempts = 0u32;

        loop {
            match engine.enhance(item, ctx).await {
                Ok(output) => return Ok(output),

                Err(EngineError::Fatal(msg)) => return Err(EngineFailure::Fatal(msg)),

                Err(EngineError::Retryable(msg)) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(EngineFailure::RetryExhausted { attempts, message: msg });
                    }

                    let delay = self.config.retry_delay(attempts);

                    warn!(
                        "engine '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                        name, attempts, self.config.max_retries, delay, msg
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Skip what has not run, mark the chain failed and build the error.
fn abort(mut metadata: ExecutionMetadata, engine: &str, reason: EngineFailure) -> RunError {
    metadata.skip_remaining("chain execution failed");
    metadata.finish(
        ExecutionStatus::Failed,
        Some(format!("required engine '{engine}' {reason}")),
    );
    RunError::EngineFailed {
        engine: engine.to_owned(),
        reason,
        metadata: Box::new(metadata),
    }
}
