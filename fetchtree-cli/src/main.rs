//! Fetchtree CLI - Command line interface for fetchtree
//!
//! Clones repositories into per-session folders and lists their files.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fetchtree_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CloneArgs, RunArgs, SweepArgs};

/// Fetchtree: per-session shallow clones with file listings
#[derive(Parser, Debug)]
#[command(name = "fetchtree")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session data root (overrides config and env)
    #[arg(long, global = true, env = "FETCHTREE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to git executable (overrides config and env)
    #[arg(long, global = true, env = "FETCHTREE_GIT_PATH")]
    git_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Clone repositories into a session and list their files
    #[command(visible_alias = "c")]
    Clone(CloneArgs),

    /// Serve `<session_id> <url>` requests read from stdin
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Remove orphaned session folders
    Sweep(SweepArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose raises the default level
    let default_level = if cli.verbose {
        "info,fetchtree_core=debug,fetchtree_cli=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let config = Config::load_with_overrides(cli.data_dir.clone(), cli.git_path.clone())?;

    if cli.verbose {
        tracing::info!(
            data_dir = %config.sessions.data_dir.display(),
            git_path = %config.git.git_path,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("fetchtree {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Clone(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Run(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Sweep(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Config) => {
            println!("Fetchtree Configuration");
            println!("=======================");
            println!();
            println!("Sessions:");
            println!("  data_dir: {}", config.sessions.data_dir.display());
            println!("  max_age: {:?}", config.sessions.max_age);
            println!();
            println!("Git:");
            println!("  git_path: {}", config.git.git_path);
            println!("  timeout: {:?}", config.git.timeout);
            println!();
            println!("Garbage collection:");
            if config.gc.interval.is_zero() {
                println!("  interval: (disabled)");
            } else {
                println!("  interval: {:?}", config.gc.interval);
            }
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
        }
        None => {
            println!("Fetchtree - per-session repository checkouts");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
