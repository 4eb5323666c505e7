// ABOUTME: Request, result and container types for supervised execution
// ABOUTME: ExecutionResult is assembled exactly once per call and never mutated afterwards

use crate::config::ConfigOverrides;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Exit code reported when the process was forcibly terminated on timeout.
///
/// Docker exec exit codes are never negative, so this value cannot collide
/// with a status sampled from a real process.
pub const TERMINATED_EXIT_CODE: i64 = -1;

/// How a code payload is handed to the container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runner {
    /// `<interpreter> -c <code>` (python3 by default)
    #[default]
    Interpreter,
    /// `<shell> -c <code>`
    Shell,
}

/// Parameters of one `execute` call
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub code: Option<String>,
    pub file: Option<PathBuf>,
    pub runner: Runner,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub overrides: ConfigOverrides,
}

impl ExecutionRequest {
    /// Run `code` with the configured interpreter
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    /// Run `command` with the configured shell
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            code: Some(command.into()),
            runner: Runner::Shell,
            ..Default::default()
        }
    }

    /// Copy a local file into the container and run it with the interpreter
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.overrides.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.overrides.workdir = Some(workdir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.env.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one execution. Timeouts and nonzero exits are results, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    stdout: String,
    stderr: String,
    exit_code: i64,
    #[serde(serialize_with = "serialize_secs")]
    execution_time: Duration,
    timeout_occurred: bool,
    container_id: String,
    command: String,
}

impl ExecutionResult {
    pub(crate) fn new(
        stdout: String,
        stderr: String,
        exit_code: i64,
        execution_time: Duration,
        timeout_occurred: bool,
        container_id: String,
        command: String,
    ) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            execution_time,
            timeout_occurred,
            container_id,
            command,
        }
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn timeout_occurred(&self) -> bool {
        self.timeout_occurred
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// True if execution completed with exit code 0 before the deadline
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timeout_occurred
    }

    /// Structured view of the outcome: stdout on success, otherwise the best
    /// available error text.
    pub fn return_value(&self) -> ResultValue {
        if self.success() && !self.stdout.is_empty() {
            ResultValue::output(self.stdout.clone())
        } else if !self.stderr.is_empty() {
            ResultValue::error(self.stderr.clone())
        } else if self.timeout_occurred {
            ResultValue::error(format!(
                "Command timed out after {:.1}s",
                self.execution_time.as_secs_f64()
            ))
        } else if !self.success() {
            ResultValue::error(format!("Command failed with exit code {}", self.exit_code))
        } else {
            ResultValue::output(String::new())
        }
    }
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Output,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultValue {
    #[serde(rename = "type")]
    pub kind: ResultType,
    pub content: String,
}

impl ResultValue {
    fn output(content: String) -> Self {
        Self {
            kind: ResultType::Output,
            content,
        }
    }

    fn error(content: String) -> Self {
        Self {
            kind: ResultType::Error,
            content,
        }
    }
}

/// Container state as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown(String),
}

impl ContainerStatus {
    pub fn from_state(state: &str) -> Self {
        match state.to_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            other => ContainerStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Restarting => write!(f, "restarting"),
            ContainerStatus::Removing => write!(f, "removing"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::Dead => write!(f, "dead"),
            ContainerStatus::Unknown(state) => write!(f, "unknown ({})", state),
        }
    }
}

/// Information about the target container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
}
