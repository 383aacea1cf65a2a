#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use run_merge::config::{ConfigOverrides, MergeConfig};
use run_merge::engine::MergeOptions;
use run_merge::{MergeResult, merge_cmd};

#[derive(Parser, Debug)]
#[command(name = "run-merge")]
#[command(about = "Merge crash-and-resume segments of a tracked run into one run", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set RUN_MERGE_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Where the runs come from; every field falls back to the config file.
#[derive(Args, Debug, Clone)]
struct RunSelection {
    /// Path to merge config (defaults to merge-config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Entity (user or organization) owning the runs
    #[arg(long, env = "RUN_MERGE_ENTITY")]
    entity: Option<String>,
    /// Project holding the runs
    #[arg(long, env = "RUN_MERGE_PROJECT")]
    project: Option<String>,
    /// Run id to merge; repeat in resume order (or comma-separate in RUN_MERGE_RUNS)
    #[arg(long = "run", env = "RUN_MERGE_RUNS", value_delimiter = ',')]
    runs: Vec<String>,
    /// Root directory of the run store
    #[arg(long, env = "RUN_MERGE_STORE")]
    store: Option<PathBuf>,
}

/// Arguments of `merge`; also parsed on their own when no subcommand is given
/// so the environment still applies.
#[derive(Parser, Debug)]
#[command(name = "run-merge")]
struct MergeArgs {
    #[command(flatten)]
    selection: RunSelection,
    /// Name for the merged run (default: <last run name>-merged)
    #[arg(long)]
    name: Option<String>,
    /// Fetch and merge, but do not create a run
    #[arg(long)]
    dry_run: bool,
    /// Also write the merged history to this JSONL file
    #[arg(long)]
    export: Option<PathBuf>,
    /// Write machine-readable JSON report to this file
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the configured runs into a new run (default)
    Merge(MergeArgs),

    /// Print state, record count and step range of each configured run
    Inspect {
        #[command(flatten)]
        selection: RunSelection,
    },

    /// Print the configured runs in merge order
    List {
        #[command(flatten)]
        selection: RunSelection,
    },
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("RUN_MERGE_LOG").unwrap_or_else(|_| {
        if verbose { "run_merge=debug".to_string() } else { "run_merge=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn resolve_config(selection: RunSelection, name: Option<String>) -> MergeResult<MergeConfig> {
    let config = MergeConfig::load_or_default(selection.config.as_deref())?;
    Ok(config.with_overrides(ConfigOverrides {
        entity: selection.entity,
        project: selection.project,
        runs: selection.runs,
        store: selection.store,
        name,
    }))
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Merge(MergeArgs::parse_from(["run-merge"])));

    let result = match command {
        Commands::Merge(MergeArgs { selection, name, dry_run, export, json }) => {
            resolve_config(selection, name)
                .and_then(|config| merge_cmd::merge(config, MergeOptions { dry_run, export }, json))
                .map(|_| ())
        }
        Commands::Inspect { selection } => resolve_config(selection, None).and_then(merge_cmd::inspect),
        Commands::List { selection } => resolve_config(selection, None).and_then(merge_cmd::list),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
