//! Command-line surface (ambient, not part of the core pipeline contract —
//! SPEC_FULL treats the CLI as the local stand-in for whatever invokes the
//! library in production, e.g. a scheduled GitHub Actions workflow).
//!
//! `clap` derive style, `console`/`indicatif` output — grounded on
//! `cli::commands::mod.rs`'s `Cli`/`Commands` shape and `cli::commands::scrape`'s
//! styled summary lines, the same idiom `runner::run_pipeline` already uses
//! for its own progress reporting.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::{self, LoadOptions};
use crate::crawl_state::CrawlStateStore;
use crate::registry::SourceRegistry;
use crate::runner::{self, PipelineMode};

#[derive(Parser)]
#[command(name = "pipeline")]
#[command(about = "Autonomous content-acquisition pipeline")]
#[command(version)]
pub struct Cli {
    /// Data directory for the local store backend (ignored when running
    /// under GITHUB_ACTIONS, which targets the repository itself).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Explicit config file path (overrides auto-discovery).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is requested (read early, before the subcommand
/// parses, so `tracing_subscriber` can be configured before anything logs).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: change detection followed by acquisition.
    Run {
        /// Which phases to execute.
        #[arg(long, value_enum, default_value = "full")]
        mode: ModeArg,
        /// Simulate the run without writing to the registry, manifest, or store.
        #[arg(long)]
        dry_run: bool,
        /// Ignore `next_check_after` and treat every active source as due.
        #[arg(long)]
        force_fresh: bool,
    },
    /// Change-detection only: shorthand for `run --mode check`.
    Check {
        #[arg(long)]
        dry_run: bool,
    },
    /// Acquisition only: shorthand for `run --mode acquire`.
    Acquire {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force_fresh: bool,
    },
    /// Print a summary of the registry's current state.
    Status,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Full,
    Check,
    Acquire,
}

impl From<ModeArg> for PipelineMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Full => PipelineMode::Full,
            ModeArg::Check => PipelineMode::Check,
            ModeArg::Acquire => PipelineMode::Acquire,
        }
    }
}

/// Runs the parsed CLI to completion and returns the process exit code.
/// Rate-limited extraction batches are a library-level capability (the
/// LLM-based extractors themselves are an out-of-scope external
/// collaborator per spec.md's "out of scope" list) so this surface never
/// returns `extraction::EXIT_RATE_LIMITED`; only `extraction::run_extraction_batch`
/// callers need to translate that flag into exit code 42.
pub async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let (mode, dry_run, force_fresh) = match cli.command {
        Commands::Run {
            mode,
            dry_run,
            force_fresh,
        } => (mode.into(), dry_run, force_fresh),
        Commands::Check { dry_run } => (PipelineMode::Check, dry_run, false),
        Commands::Acquire {
            dry_run,
            force_fresh,
        } => (PipelineMode::Acquire, dry_run, force_fresh),
        Commands::Status => return status(cli.data_dir, cli.config).await,
    };

    let ctx = config::load(LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
        mode: Some(mode),
        dry_run,
        force_fresh,
    })
    .await?;

    let registry = SourceRegistry::new(ctx.store.clone());
    let crawl_states = CrawlStateStore::new(ctx.store.clone());

    let result = runner::run_pipeline(&ctx.http, &registry, &crawl_states, &ctx.store, &ctx.config)
        .await?;

    println!("{}", result.summary());
    Ok(0)
}

async fn status(data_dir: Option<PathBuf>, config_path: Option<PathBuf>) -> anyhow::Result<i32> {
    let ctx = config::load(LoadOptions {
        config_path,
        data_dir,
        ..Default::default()
    })
    .await?;

    let registry = SourceRegistry::new(ctx.store.clone());
    let sources = registry.list().await?;

    let pending_initial = sources.iter().filter(|s| s.last_content_hash.is_none()).count();
    let acquired = sources.len() - pending_initial;
    let failing = sources.iter().filter(|s| s.check_failures > 0).count();

    println!("{}", style("Registry status").bold());
    println!("  sources tracked:   {}", sources.len());
    println!("  pending initial:   {}", pending_initial);
    println!("  previously acquired: {}", acquired);
    println!("  with check failures: {}", failing);

    Ok(0)
}
