// ABOUTME: `solitary run` executes code, a shell command or a local file in the target container
// ABOUTME: Forwards the caller's stdin on request and mirrors the program's exit status

use anyhow::{bail, Context, Result};
use clap::Args;
use solitary_cli::output;
use solitary_sandbox::{ExecutionRequest, Sandbox};
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Code to run with the interpreter (or the shell with --shell)
    #[arg(short = 'c', long, conflicts_with = "file")]
    pub code: Option<String>,

    /// Local file to copy into the container and run
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Run the code with the configured shell instead of the interpreter
    #[arg(long, conflicts_with = "file")]
    pub shell: bool,

    /// Forward this process's stdin to the executed code
    #[arg(long)]
    pub stdin: bool,

    /// Arguments passed to the program
    #[arg(last = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    fn into_request(self) -> Result<ExecutionRequest> {
        let request = match (self.code, self.file) {
            (Some(code), None) if self.shell => ExecutionRequest::shell(code),
            (Some(code), None) => ExecutionRequest::code(code),
            (None, Some(file)) => ExecutionRequest::file(file),
            _ => bail!("Specify exactly one of --code or --file"),
        };

        let request = request.with_args(self.args);

        if self.stdin {
            let mut input = Vec::new();
            std::io::stdin()
                .read_to_end(&mut input)
                .context("Failed to read stdin")?;
            return Ok(request.with_stdin(input));
        }

        Ok(request)
    }
}

pub async fn run_command(sandbox: &Sandbox, args: RunArgs, json: bool) -> Result<i32> {
    let request = args.into_request()?;
    debug!("Running {:?} in {}", request.runner, sandbox.config().target());

    let result = sandbox.execute(request).await?;

    if json {
        println!("{}", output::to_json(&result)?);
    } else {
        output::print_result(&result);
    }

    Ok(output::exit_code(&result))
}
