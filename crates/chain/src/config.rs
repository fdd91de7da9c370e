//! Chain configuration.
//!
//! A chain either uses every active engine or an explicit engine list. List
//! entries use the compact syntax
//!
//! ```text
//! name[;optional][;dependsOn=a,b][;key=value[,value]]...
//! ```
//!
//! e.g. `"ner;optional;dependsOn=langid,sentences;lang=en,de"`. Any other
//! `key=value` parameter becomes an enhancement property of that engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use engines::EnhancementProperties;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::EngineDescriptor;

// ---------------------------------------------------------------------------
// EngineRef
// ---------------------------------------------------------------------------

/// One engine entry of a listed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRef {
    pub name: String,
    pub optional: bool,
    /// Added to the dependencies the engine declares itself.
    pub depends_on: BTreeSet<String>,
    /// Enhancement properties for this engine only.
    pub properties: EnhancementProperties,
}

impl EngineRef {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            depends_on: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self { optional: true, ..Self::required(name) }
    }

    /// Parse one `name[;optional][;dependsOn=a,b][;key=value,...]` entry.
    ///
    /// A repeated property key collects the values of every occurrence.
    /// Bare words other than `optional` are rejected.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let mut parts = entry.split(';').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(ConfigError::EmptyEngineName(entry.to_owned()));
        }

        let mut engine = EngineRef::required(name);
        for param in parts.filter(|p| !p.is_empty()) {
            let (key, value) = match param.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v)),
                None => (param, None),
            };
            match (key, value) {
                ("optional", None) => engine.optional = true,
                ("optional", Some(v)) => engine.optional = v.trim().eq_ignore_ascii_case("true"),
                ("dependsOn", Some(v)) => engine.depends_on.extend(values(v)),
                (key, Some(v)) if !key.is_empty() => {
                    engine.properties.entry(key.to_owned()).or_default().extend(values(v))
                }
                _ => {
                    return Err(ConfigError::UnknownParameter {
                        entry: entry.to_owned(),
                        parameter: param.to_owned(),
                    })
                }
            }
        }
        Ok(engine)
    }
}

fn values(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

// ---------------------------------------------------------------------------
// EngineSelection
// ---------------------------------------------------------------------------

/// Which engines a chain plans over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSelection {
    /// Every active engine; nothing optional, nothing missing.
    AllActive,
    /// Only the listed engines.
    Listed(Vec<EngineRef>),
}

/// Inputs for one resolver call, derived from an engine snapshot.
#[derive(Debug, Default)]
pub(crate) struct Selected {
    pub engines: Vec<EngineDescriptor>,
    pub optional: BTreeSet<String>,
    pub missing: BTreeSet<String>,
    /// Entry properties by engine name.
    pub properties: BTreeMap<String, EnhancementProperties>,
}

impl EngineSelection {
    pub(crate) fn select(&self, active: Vec<EngineDescriptor>) -> Selected {
        match self {
            EngineSelection::AllActive => Selected { engines: active, ..Selected::default() },
            EngineSelection::Listed(refs) => {
                let mut selected = Selected::default();
                for r in refs {
                    if r.optional {
                        selected.optional.insert(r.name.clone());
                    }
                    if !r.properties.is_empty() {
                        selected.properties.insert(r.name.clone(), r.properties.clone());
                    }

                    // Every descriptor of that name goes through, so a
                    // duplicate still reaches the resolver and is rejected.
                    let before = selected.engines.len();
                    for descriptor in active.iter().filter(|d| d.name == r.name) {
                        let mut descriptor = descriptor.clone();
                        descriptor.dependencies.extend(r.depends_on.iter().cloned());
                        selected.engines.push(descriptor);
                    }
                    if selected.engines.len() == before {
                        selected.missing.insert(r.name.clone());
                    }
                }
                selected
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ChainConfig
// ---------------------------------------------------------------------------

fn enabled_by_default() -> bool {
    true
}

/// Key-value configuration of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Higher ranking wins when several chains share a name.
    #[serde(default)]
    pub ranking: i32,
    /// Engine entries; empty means "all active engines".
    #[serde(default)]
    pub engines: Vec<String>,
    /// Enhancement properties for every engine of the chain. Entry
    /// properties take precedence.
    #[serde(default)]
    pub properties: EnhancementProperties,
}

impl ChainConfig {
    /// Configuration of an enabled chain over all active engines.
    pub fn all_active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            ranking: 0,
            engines: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Parse the engine entries.
    ///
    /// # Errors
    /// [`ConfigError`] for an empty chain name, a malformed entry, or an
    /// engine listed twice.
    pub fn selection(&self) -> Result<EngineSelection, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyChainName);
        }
        if self.engines.is_empty() {
            return Ok(EngineSelection::AllActive);
        }

        let mut seen = HashSet::new();
        let mut refs = Vec::with_capacity(self.engines.len());
        for entry in &self.engines {
            let r = EngineRef::parse(entry)?;
            if !seen.insert(r.name.clone()) {
                return Err(ConfigError::DuplicateEngine(r.name));
            }
            refs.push(r);
        }
        Ok(EngineSelection::Listed(refs))
    }
}

// ---------------------------------------------------------------------------
// ChainSetup
// ---------------------------------------------------------------------------

/// A static engine set plus the chains planned over it, as loaded by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainSetup {
    #[serde(default)]
    pub engines: Vec<EngineDescriptor>,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl ChainSetup {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}
