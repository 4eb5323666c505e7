// ABOUTME: Resolves the execution config from a JSON file, SOLITARY_* variables and flags
// ABOUTME: Later layers win: file, then environment, then command-line flags

use anyhow::{bail, Context, Result};
use clap::Args;
use solitary_sandbox::{ExecutionConfig, ExecutionConfigBuilder};
use std::path::{Path, PathBuf};

/// Points at a config file when `--config` is not given
pub const SOLITARY_CONFIG: &str = "SOLITARY_CONFIG";

const CONFIG_DIR: &str = ".solitary";
const CONFIG_FILE: &str = "config.json";

/// Config flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON config file (default: $SOLITARY_CONFIG or ~/.solitary/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Target container name or id
    #[arg(short = 't', long, global = true)]
    pub container: Option<String>,

    /// Timeout in seconds (1-3600)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Working directory inside the container
    #[arg(short = 'w', long, global = true)]
    pub workdir: Option<String>,

    /// Cap on captured bytes per output stream
    #[arg(long, global = true)]
    pub max_output: Option<usize>,

    /// Environment variable for the executed code, as KEY=VALUE
    #[arg(short = 'e', long = "env", global = true)]
    pub env: Vec<String>,

    /// User to run as inside the container
    #[arg(short = 'u', long, global = true)]
    pub user: Option<String>,

    /// Shell used by `run --shell`
    #[arg(long, global = true)]
    pub shell_path: Option<String>,

    /// Interpreter command line, e.g. "python3 -u"
    #[arg(long, global = true)]
    pub interpreter: Option<String>,
}

/// Build the effective config. `lookup` reads environment variables and
/// `home` is where the default config location is searched.
pub fn resolve_config<F>(args: &ConfigArgs, lookup: F, home: Option<&Path>) -> Result<ExecutionConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let builder = match config_file(args, &lookup, home) {
        Some(path) => ExecutionConfigBuilder::from_file(&path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => ExecutionConfigBuilder::default(),
    };

    let builder = builder
        .apply_env(&lookup)
        .context("Invalid SOLITARY_* environment variable")?;

    apply_flags(builder, args)?
        .build()
        .context("Invalid configuration")
}

/// Explicit flag, then environment, then the default location if it exists
fn config_file<F>(args: &ConfigArgs, lookup: &F, home: Option<&Path>) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = &args.config {
        return Some(path.clone());
    }
    if let Some(path) = lookup(SOLITARY_CONFIG) {
        return Some(PathBuf::from(path));
    }

    home.map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
        .filter(|path| path.is_file())
}

fn apply_flags(mut builder: ExecutionConfigBuilder, args: &ConfigArgs) -> Result<ExecutionConfigBuilder> {
    if let Some(container) = &args.container {
        builder = builder.target(container);
    }
    if let Some(timeout) = args.timeout {
        builder = builder.timeout_secs(timeout);
    }
    if let Some(workdir) = &args.workdir {
        builder = builder.workdir(workdir);
    }
    if let Some(max_output) = args.max_output {
        builder = builder.max_output_size(max_output);
    }
    if let Some(user) = &args.user {
        builder = builder.user(user);
    }
    if let Some(shell) = &args.shell_path {
        builder = builder.shell(shell);
    }
    if let Some(interpreter) = &args.interpreter {
        builder = builder.interpreter(interpreter.split_whitespace().map(str::to_string).collect());
    }

    for pair in &args.env {
        let (key, value) = parse_env_pair(pair)?;
        builder = builder.env(key, value);
    }

    Ok(builder)
}

/// Split `KEY=VALUE` at the first `=`
pub fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Environment variable '{}' must be KEY=VALUE", pair),
    }
}
