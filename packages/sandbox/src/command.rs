// ABOUTME: Builds the argv, environment and working directory for one execution
// ABOUTME: Payloads are passed as discrete arguments, never interpolated into shell strings

use crate::config::ExecutionConfig;
use crate::engine::ExecSpec;
use crate::error::{Result, SandboxError};
use crate::types::{ExecutionRequest, Runner};
use std::path::{Path, PathBuf};

/// Source of the code to run
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Code(String),
    File(PathBuf),
}

impl Payload {
    /// Exactly one of code or file must be present; files only run under the interpreter
    pub fn from_request(request: &ExecutionRequest) -> Result<Self> {
        match (&request.code, &request.file) {
            (Some(code), None) => Ok(Payload::Code(code.clone())),
            (None, Some(_)) if request.runner == Runner::Shell => {
                Err(SandboxError::InvalidRequest(
                    "the shell runner takes inline code, not a file".to_string(),
                ))
            }
            (None, Some(file)) => Ok(Payload::File(file.clone())),
            (Some(_), Some(_)) => Err(SandboxError::InvalidRequest(
                "specify either code or a file, not both".to_string(),
            )),
            (None, None) => Err(SandboxError::InvalidRequest(
                "either code or a file must be specified".to_string(),
            )),
        }
    }
}

/// A fully resolved command ready to hand to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCommand {
    pub spec: ExecSpec,
    /// Local file that has to be copied into `spec.workdir` before running
    pub upload: Option<PathBuf>,
}

impl BuiltCommand {
    /// The argv joined with spaces, as reported in results
    pub fn display(&self) -> String {
        self.spec.argv.join(" ")
    }
}

/// Build the command for `request` against an already merged config.
///
/// Validation happens here, before anything touches the container: a file
/// payload must exist locally and be a regular file.
pub fn build_command(request: &ExecutionRequest, config: &ExecutionConfig) -> Result<BuiltCommand> {
    let payload = Payload::from_request(request)?;

    let (argv, upload) = match payload {
        Payload::Code(code) => (code_argv(&code, request, config), None),
        Payload::File(path) => {
            let file_name = check_local_file(&path)?;
            let mut argv = config.interpreter().to_vec();
            argv.push(container_path(config.workdir(), &file_name));
            argv.extend(request.args.iter().cloned());
            (argv, Some(path))
        }
    };

    Ok(BuiltCommand {
        spec: ExecSpec {
            argv,
            env: config.env().clone(),
            workdir: config.workdir().to_string(),
            user: config.user().map(str::to_string),
        },
        upload,
    })
}

fn code_argv(code: &str, request: &ExecutionRequest, config: &ExecutionConfig) -> Vec<String> {
    match request.runner {
        Runner::Interpreter => {
            let mut argv = config.interpreter().to_vec();
            argv.push("-c".to_string());
            argv.push(code.to_string());
            argv.extend(request.args.iter().cloned());
            argv
        }
        Runner::Shell => {
            let mut argv = vec![
                config.shell().to_string(),
                "-c".to_string(),
                code.to_string(),
            ];
            if !request.args.is_empty() {
                // becomes $0 so the args land in $1..
                argv.push(config.shell().to_string());
                argv.extend(request.args.iter().cloned());
            }
            argv
        }
    }
}

fn check_local_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(SandboxError::FileNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(SandboxError::InvalidRequest(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SandboxError::InvalidRequest(format!("{} has no usable file name", path.display()))
        })
}

fn container_path(workdir: &str, file_name: &str) -> String {
    format!("{}/{}", workdir.trim_end_matches('/'), file_name)
}
