use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use defmap_core::{Config, CrateId};
use defmap_incremental::{
    CancellationToken, CrateGraphProvider, DefMapService, DefMapState, DefMapUpdater,
    ExplicitItemsBuilder, MemorySources, SharedCrateGraph, StructureModificationTracker,
    UpdateOutcome,
};
use defmap_workspace::{CrateGraph, WorkspaceManifest};

/// Deferred cycles tolerated before `diff` gives up
const MAX_DEFERRED_CYCLES: usize = 16;

/// DefMap - incremental crate module-structure maintenance
#[derive(Parser)]
#[command(name = "defmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: defmap.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build DefMaps for every crate of a workspace manifest
    Build {
        /// Path to the workspace manifest JSON
        manifest: PathBuf,
    },

    /// Build `before`, apply `after` as an edit and report what was rebuilt
    Diff {
        /// Workspace manifest before the edit
        before: PathBuf,

        /// Workspace manifest after the edit
        after: PathBuf,
    },

    /// Show the crate graph, or the rebuild closure of one crate
    Graph {
        /// Path to the workspace manifest JSON
        manifest: PathBuf,

        /// Crate whose dependents should be listed
        krate: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else if Path::new("defmap.toml").exists() {
        Config::from_file(Path::new("defmap.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Build { manifest } => build_command(&config, &manifest, cli.json),
        Commands::Diff { before, after } => diff_command(&config, &before, &after, cli.json),
        Commands::Graph { manifest, krate } => graph_command(&manifest, krate.as_deref(), cli.json),
    }
}

/// In-memory workspace with a wired-up updater
struct Session {
    service: Arc<DefMapService>,
    sources: Arc<MemorySources>,
    graphs: Arc<SharedCrateGraph>,
    structure: Arc<StructureModificationTracker>,
    updater: DefMapUpdater,
}

impl Session {
    fn load(manifest: &WorkspaceManifest, config: &Config) -> Result<Self> {
        let service = Arc::new(DefMapService::new());
        let sources = Arc::new(MemorySources::with_listener(Arc::clone(&service)));
        for (path, tree) in &manifest.files {
            sources.set_file(path.clone(), tree.clone());
        }

        let graph = manifest
            .into_graph(|path| sources.file_id(path))
            .context("Failed to build crate graph")?;
        let graphs = Arc::new(SharedCrateGraph::with_listener(graph, Arc::clone(&service)));
        let structure = Arc::new(StructureModificationTracker::new());

        let updater = DefMapUpdater::new(
            Arc::clone(&service),
            graphs.clone(),
            sources.clone(),
            Arc::new(ExplicitItemsBuilder),
        )
        .with_config(config.build.clone())
        .with_listener(structure.clone());

        Ok(Self {
            service,
            sources,
            graphs,
            structure,
            updater,
        })
    }

    /// Replace sources and graph with the contents of `manifest`
    fn apply(&self, before: &WorkspaceManifest, after: &WorkspaceManifest) -> Result<()> {
        for path in before.files.keys() {
            if !after.files.contains_key(path) {
                self.sources.delete_file(path);
            }
        }
        for (path, tree) in &after.files {
            if before.files.get(path) != Some(tree) {
                self.sources.set_file(path.clone(), tree.clone());
            }
        }

        if before.crates != after.crates {
            let graph = after
                .into_graph(|path| self.sources.file_id(path))
                .context("Failed to build crate graph")?;
            self.graphs.replace(graph);
        }
        Ok(())
    }

    fn update(&self) -> Result<UpdateOutcome> {
        let cancel = CancellationToken::new();
        for _ in 0..MAX_DEFERRED_CYCLES {
            let outcome = self.updater.update_all(&cancel)?;
            if outcome != UpdateOutcome::Deferred {
                return Ok(outcome);
            }
        }
        anyhow::bail!("Sources kept changing after {} update cycles", MAX_DEFERRED_CYCLES)
    }

    fn names(&self, ids: &[CrateId]) -> Vec<String> {
        let graph = self.graphs.crate_graph();
        ids.iter()
            .map(|id| {
                graph
                    .find_by_id(*id)
                    .map(|krate| krate.name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect()
    }
}

fn load_manifest(path: &Path) -> Result<WorkspaceManifest> {
    WorkspaceManifest::from_file(path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))
}

/// Build command - full DefMap build of one workspace
fn build_command(config: &Config, manifest_path: &Path, json: bool) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let session = Session::load(&manifest, config)?;
    let outcome = session.update()?;
    let graph = session.graphs.crate_graph();

    if json {
        let crates: Vec<_> = graph
            .top_sorted()
            .filter_map(|krate| {
                let id = krate.id?;
                let state = session.service.state(id);
                Some(serde_json::json!({
                    "name": krate.name,
                    "id": id,
                    "status": status_label(&state),
                    "def_map": state.def_map().map(|def_map| def_map.as_ref()),
                }))
            })
            .collect();
        let out = serde_json::json!({
            "built": outcome.rebuilt().len(),
            "crates": crates,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "DefMap Build".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    let mut failed = 0;
    for krate in graph.top_sorted() {
        let Some(id) = krate.id else {
            println!("  {} {} (no persistent id)", "-".dimmed(), krate.name);
            continue;
        };
        match session.service.state(id) {
            DefMapState::Built(def_map) => {
                println!(
                    "  {} {} ({} modules, {} files, {} missed)",
                    "✓".green(),
                    krate.name.bold(),
                    def_map.root.module_count(),
                    def_map.file_infos.len(),
                    def_map.missed_files.len()
                );
            }
            DefMapState::Failed => {
                failed += 1;
                println!("  {} {}", "✗".red(), krate.name.bold());
            }
            DefMapState::NotBuilt => {
                println!("  {} {}", "-".dimmed(), krate.name);
            }
        }
    }

    println!();
    println!(
        "Built {} crates, {} failed",
        outcome.rebuilt().len().to_string().green(),
        failed.to_string().red()
    );

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Diff command - replay an edit and show the rebuilt crates
fn diff_command(config: &Config, before_path: &Path, after_path: &Path, json: bool) -> Result<()> {
    let before = load_manifest(before_path)?;
    let after = load_manifest(after_path)?;

    let session = Session::load(&before, config)?;
    session.update()?;
    let signals = session.structure.modification_count();

    session.apply(&before, &after)?;
    let outcome = session.update()?;
    let rebuilt = session.names(outcome.rebuilt());
    let structure_changed = session.structure.modification_count() > signals;

    if json {
        let out = serde_json::json!({
            "rebuilt": rebuilt,
            "structure_changed": structure_changed,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if rebuilt.is_empty() {
        println!("{}", "✓ No DefMap changed".green());
        println!("The edit did not touch module structure.");
    } else {
        println!("{}", "Rebuilt crates (in dependency order):".bold());
        println!();
        for (i, name) in rebuilt.iter().enumerate() {
            println!("  {}. {}", i + 1, name.yellow());
        }
    }
    Ok(())
}

/// Graph command - crate order and dependents
fn graph_command(manifest_path: &Path, krate: Option<&str>, json: bool) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let sources = MemorySources::new();
    for (path, tree) in &manifest.files {
        sources.set_file(path.clone(), tree.clone());
    }
    let graph = manifest
        .into_graph(|path| sources.file_id(path))
        .context("Failed to build crate graph")?;

    match krate {
        Some(name) => print_closure(&graph, name, json),
        None => print_graph(&graph, json),
    }
}

fn print_graph(graph: &CrateGraph, json: bool) -> Result<()> {
    if json {
        let crates: Vec<_> = graph
            .top_sorted()
            .map(|krate| {
                let deps: Vec<&str> = graph.dependencies(krate).map(|(name, _)| name).collect();
                serde_json::json!({
                    "name": krate.name,
                    "id": krate.id,
                    "dependencies": deps,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&crates)?);
        return Ok(());
    }

    println!("{}", "Crates (in dependency order):".bold());
    println!();
    for krate in graph.top_sorted() {
        let deps: Vec<&str> = graph.dependencies(krate).map(|(name, _)| name).collect();
        if deps.is_empty() {
            println!("  {}", krate.name.green());
        } else {
            println!("  {} {} {}", krate.name.green(), "->".dimmed(), deps.join(", "));
        }
    }
    Ok(())
}

fn print_closure(graph: &CrateGraph, name: &str, json: bool) -> Result<()> {
    let krate = graph
        .find_by_name(name)
        .ok_or_else(|| anyhow::anyhow!("Crate '{}' not found in manifest", name))?;
    let id = krate
        .id
        .ok_or_else(|| anyhow::anyhow!("Crate '{}' has no persistent id", name))?;

    let closure = graph.with_reverse_dependencies(&HashSet::from([id]));
    let names: Vec<&str> = closure.iter().map(|krate| krate.name.as_str()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    println!("{} {}", "Crate:".bold(), name.green());
    println!("{} {}", "Rebuilt with it:".bold(), names.len().saturating_sub(1));
    println!();
    for (i, name) in names.iter().enumerate() {
        println!("  {}. {}", i + 1, name);
    }
    Ok(())
}

fn status_label(state: &DefMapState) -> &'static str {
    match state {
        DefMapState::NotBuilt => "not_built",
        DefMapState::Failed => "failed",
        DefMapState::Built(_) => "built",
    }
}
