use clap::{Parser, Subcommand};
use colored::*;
use solitary_cli::config::{resolve_config, ConfigArgs};
use solitary_sandbox::Sandbox;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::run::RunArgs;

#[derive(Parser)]
#[command(name = "solitary")]
#[command(about = "Run code inside an existing container with a timeout and output limits")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code, a shell command or a local file
    Run(RunArgs),
    /// Check that the container can run commands
    Health,
    /// Show details of the target container
    Info,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match handle_command(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

/// Logs go to stderr so program output on stdout stays untouched
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_command(cli: Cli) -> anyhow::Result<i32> {
    let config = resolve_config(
        &cli.config,
        |key| std::env::var(key).ok(),
        dirs::home_dir().as_deref(),
    )?;
    let sandbox = Sandbox::connect(config).await?;

    let code = match cli.command {
        Commands::Run(args) => cli::run::run_command(&sandbox, args, cli.json).await,
        Commands::Health => cli::container::health_command(&sandbox, cli.json).await,
        Commands::Info => cli::container::info_command(&sandbox, cli.json).await,
    };

    sandbox.close().await;
    code
}
