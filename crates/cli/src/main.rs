//! `enhancer-chain` CLI entry-point.
//!
//! Available sub-commands:
//! - `plan`: print the execution plan of the chains in a setup file.
//! - `validate`: check that every enabled chain in a setup file can be planned.
//!
//! A setup file is JSON with an `engines` list (name, ordering,
//! dependencies) and an optional `chains` list; without chains a single
//! `default` chain over all engines is planned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use chain::{
    Chain, ChainConfig, ChainManager, ChainSetup, EngineSource, EnhancementProperties,
    ExecutionPlan, DEFAULT_CHAIN_NAME,
};

#[derive(Parser)]
#[command(
    name = "enhancer-chain",
    about = "Plan enhancement chains from engine ordering and dependencies",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the execution plan of every enabled chain.
    Plan {
        /// Path to the setup JSON file.
        path: PathBuf,
        /// Only plan the chain with this name.
        #[arg(long)]
        chain: Option<String>,
        /// Print plans as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Validate that every enabled chain can be planned.
    Validate {
        /// Path to the setup JSON file.
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Plan { path, chain, json } => {
            let manager = load(&path)?;
            let names = match chain {
                Some(name) if manager.is_chain(&name) => vec![name],
                Some(name) => bail!("no enabled chain named '{name}' in {}", path.display()),
                None => manager.names().into_iter().collect(),
            };

            for name in names {
                let Some(chain) = manager.get(&name) else { continue };
                let plan = chain.execution_plan()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(plan.as_ref())?);
                } else {
                    print_plan(&plan);
                }
            }
        }
        Command::Validate { path } => {
            let manager = load(&path)?;
            let mut failed = false;

            for name in manager.names() {
                let Some(chain) = manager.get(&name) else { continue };
                match chain.execution_plan() {
                    Ok(plan) => println!("✅ chain '{name}' is valid. Execution order: {:?}", plan.flatten()),
                    Err(e) => {
                        eprintln!("❌ {e}");
                        failed = true;
                    }
                }
            }

            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Read a setup file and register its enabled chains.
fn load(path: &Path) -> anyhow::Result<ChainManager> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let setup = ChainSetup::from_json(&content)
        .with_context(|| format!("invalid setup file {}", path.display()))?;
    info!("loaded {} engine(s) from {}", setup.engines.len(), path.display());

    let source: Arc<dyn EngineSource> = Arc::new(setup.engines);
    let configs = if setup.chains.is_empty() {
        vec![ChainConfig::all_active(DEFAULT_CHAIN_NAME)]
    } else {
        setup.chains
    };

    let manager = ChainManager::new();
    for config in &configs {
        if !config.enabled {
            debug!("skipping disabled chain '{}'", config.name);
            continue;
        }
        let chain = Chain::from_config(config, source.clone())
            .with_context(|| format!("invalid configuration for chain '{}'", config.name))?;
        manager.register(Arc::new(chain), config.ranking);
    }
    Ok(manager)
}

fn print_plan(plan: &ExecutionPlan) {
    println!(
        "chain '{}' ({} engines, {} phases)",
        plan.chain,
        plan.len(),
        plan.phases.len()
    );
    if !plan.properties.is_empty() {
        println!("  properties: {}", format_properties(&plan.properties));
    }
    for phase in &plan.phases {
        let nodes: Vec<String> = phase
            .nodes
            .iter()
            .map(|n| {
                let mut label = format!("{}({})", n.engine, n.ordering);
                if n.optional {
                    label.push_str(" [optional]");
                }
                if !n.properties.is_empty() {
                    label.push_str(&format!(" {{{}}}", format_properties(&n.properties)));
                }
                label
            })
            .collect();
        println!("  phase {}: {}", phase.index, nodes.join(", "));
    }
    for missing in &plan.missing {
        let kind = if missing.optional { "optional" } else { "required" };
        println!("  missing: {} ({kind})", missing.engine);
    }
}

fn format_properties(properties: &EnhancementProperties) -> String {
    properties
        .iter()
        .map(|(key, values)| format!("{key}={}", values.join(",")))
        .collect::<Vec<_>>()
        .join("; ")
}
