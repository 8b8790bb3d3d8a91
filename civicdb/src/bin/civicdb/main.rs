mod commands;
mod output;
mod theme;

use std::path::PathBuf;

use anyhow::Result;
use civicdb::Settings;
use clap::{Parser, Subcommand};

use commands::{
    cache::{CacheCommands, handle_cache_commands},
    config::{ConfigCommands, handle_config_commands},
    lock::{LockCommands, handle_lock_commands},
};
use output::{GlobalOptions, OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "civicdb")]
#[command(version = "0.1.0")]
#[command(
    about = "Inspect civicdb caches and record locks",
    long_about = r#"Operational CLI for civicdb deployments.

Commands:
  config   Show the effective settings
  cache    Inspect or evict a table's entity cache
  lock     Inspect or force-release record locks

Environment:
  DATABASE_URL, REDIS_URL and CIVICDB_CACHE_TTL_SECS override the config file.
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Path to a TOML settings file
    #[arg(short, long, env = "CIVICDB_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Config(ConfigCommands),

    #[command(subcommand)]
    Cache(CacheCommands),

    #[command(subcommand)]
    Lock(LockCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output.clone(),
        quiet: cli.quiet,
        no_color: cli.no_color,
    });

    if let Err(err) = execute(cli, &output).await {
        output.error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn execute(cli: Cli, output: &OutputManager) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::from_env()?,
    };
    log::debug!("loaded settings: {:?}", settings.redacted());

    match cli.command {
        Commands::Config(command) => handle_config_commands(command, &settings, output).await,
        Commands::Cache(command) => handle_cache_commands(command, &settings, output).await,
        Commands::Lock(command) => handle_lock_commands(command, &settings, output).await,
    }
}
