//! Chain lookup by name.
//!
//! Several chains may share a name; the one with the highest ranking wins
//! and ties go to the chain registered first.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::chain::Chain;
use crate::config::ChainConfig;
use crate::error::ConfigError;
use crate::source::{EngineListener, EngineRegistry};

/// Name of the chain used when the caller does not ask for one.
pub const DEFAULT_CHAIN_NAME: &str = "default";

struct Registered {
    ranking: i32,
    seq: u64,
    chain: Arc<Chain>,
}

#[derive(Default)]
struct Chains {
    entries: Vec<Registered>,
    next_seq: u64,
}

/// Registry of active chains.
#[derive(Default)]
pub struct ChainManager {
    chains: RwLock<Chains>,
}

impl ChainManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the chain `config` describes over `registry`, subscribe it to
    /// engine events and register it. Disabled configurations are skipped.
    pub fn activate(
        &self,
        config: &ChainConfig,
        registry: &Arc<EngineRegistry>,
    ) -> Result<Option<Arc<Chain>>, ConfigError> {
        if !config.enabled {
            info!("chain '{}' is disabled, not activated", config.name);
            return Ok(None);
        }

        let chain = Arc::new(Chain::from_config(config, registry.clone())?);
        let listener: Arc<dyn EngineListener> = chain.clone();
        registry.subscribe(&listener);
        self.register(chain.clone(), config.ranking);
        Ok(Some(chain))
    }

    pub fn register(&self, chain: Arc<Chain>, ranking: i32) {
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
        let seq = chains.next_seq;
        chains.next_seq += 1;
        info!("chain '{}' registered with ranking {}", chain.name(), ranking);
        chains.entries.push(Registered { ranking, seq, chain });
    }

    /// Close and remove every chain called `name`. Returns how many were removed.
    pub fn deactivate(&self, name: &str) -> usize {
        let removed: Vec<Registered> = {
            let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
            let (removed, kept): (Vec<Registered>, Vec<Registered>) = std::mem::take(&mut chains.entries)
                .into_iter()
                .partition(|r| r.chain.name() == name);
            chains.entries = kept;
            removed
        };

        for r in &removed {
            r.chain.close();
        }
        if !removed.is_empty() {
            info!("chain '{}' deactivated", name);
        }
        removed.len()
    }

    /// The best-ranked chain called `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Chain>> {
        let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
        best(chains.entries.iter().filter(|r| r.chain.name() == name))
    }

    /// The `default` chain, or else the best-ranked chain of any name.
    pub fn default_chain(&self) -> Option<Arc<Chain>> {
        self.get(DEFAULT_CHAIN_NAME).or_else(|| {
            let chains = self.chains.read().unwrap_or_else(PoisonError::into_inner);
            best(chains.entries.iter())
        })
    }

    pub fn is_chain(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|r| r.chain.name().to_owned())
            .collect()
    }
}

fn best<'a>(candidates: impl Iterator<Item = &'a Registered>) -> Option<Arc<Chain>> {
    candidates
        .max_by(|a, b| a.ranking.cmp(&b.ranking).then_with(|| b.seq.cmp(&a.seq)))
        .map(|r| r.chain.clone())
}
