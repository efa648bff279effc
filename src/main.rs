//! # jetsam CLI Entry Point
//!
//! This is the main executable for the `jt` command-line tool.
//! It parses CLI arguments using clap and routes commands to the appropriate handlers.
//!
//! ## Command Structure
//!
//! - **Dependencies**: `update`, `deps`
//! - **Project**: `build`, `test`, `install`, `config`
//! - **Cache**: `cache path|ls|clean`
//! - **Shell**: `completion`

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use colored::*;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use jetsam::cache::{self, CacheRoot};
use jetsam::commands::project::{self, BuildTarget};
use jetsam::commands::update;
use jetsam::config::{MANIFEST_FILE, Manifest};
use jetsam::settings::Settings;

#[derive(Parser)]
#[command(name = "jt")]
#[command(about = "Fetch, build and link git-pinned native dependencies")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the project manifest
    #[arg(long, global = true, default_value = MANIFEST_FILE)]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, build and link every dependency
    Update {
        /// Number of parallel fetches
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Continue with the remaining dependencies after a failure
        #[arg(long)]
        keep_going: bool,
    },
    /// Run the project's build command
    Build,
    /// Run the project's build command with `test`
    Test,
    /// Run the project's build command with `install`
    Install,
    /// Print package metadata and dependencies
    Config,
    /// List declared dependencies
    Deps,
    /// Manage the dependency cache
    Cache {
        #[command(subcommand)]
        op: CacheOp,
    },
    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheOp {
    /// Print cache directory path
    Path,
    /// List cached dependencies
    Ls,
    /// Remove every cached dependency
    Clean,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "jetsam=warn",
        1 => "jetsam=info",
        _ => "jetsam=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    // Commands that need no manifest.
    match &cli.command {
        Commands::Cache { op } => {
            let cache = CacheRoot::new(Settings::load()?.cache_root);
            match op {
                CacheOp::Path => cache::print_path(&cache)?,
                CacheOp::Ls => cache::list(&cache)?,
                CacheOp::Clean => cache::clean(&cache)?,
            }
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let manifest = Manifest::load(&cli.manifest)?;
    tracing::debug!(
        "loaded {} ({} dependencies)",
        cli.manifest.display(),
        manifest.dependencies.len()
    );
    let project_dir = project_dir(&cli.manifest);

    match &cli.command {
        Commands::Update { jobs, keep_going } => {
            let mut settings = Settings::load()?;
            if let Some(jobs) = jobs {
                settings.jobs = (*jobs).max(1);
            }
            settings.keep_going |= *keep_going;

            let report = update::run_update(&manifest, &settings)?;
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Build => project::run_build(&manifest, project_dir, BuildTarget::Default)?,
        Commands::Test => project::run_build(&manifest, project_dir, BuildTarget::Test)?,
        Commands::Install => project::run_build(&manifest, project_dir, BuildTarget::Install)?,
        Commands::Config => project::print_config(&manifest)?,
        Commands::Deps => project::print_deps(&manifest)?,
        Commands::Cache { .. } | Commands::Completion { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn project_dir(manifest: &Path) -> &Path {
    match manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
