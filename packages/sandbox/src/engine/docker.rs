// ABOUTME: Docker implementation of the container engine using bollard
// ABOUTME: Runs attached exec sessions and signals each one's process group via a pid-file launcher

use super::{
    ContainerEngine, ExecHandle, ExecSession, ExecSpec, ExecState, OutputChunk, Signal,
    StreamType,
};
use crate::error::{Result, SandboxError};
use crate::types::{ContainerInfo, ContainerStatus};
use async_trait::async_trait;
use bollard::{
    container::{InspectContainerOptions, LogOutput, UploadToContainerOptions},
    errors::Error as BollardError,
    exec::{CreateExecOptions, StartExecOptions, StartExecResults},
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Shell used for the launcher and signal helpers; must exist in the target
const HELPER_SHELL: &str = "/bin/sh";

/// Starts the real argv in its own process group and waits for it.
///
/// The inner shell is a forked child, so it is never a group leader and
/// `setsid` detaches it without forking again: its pid, written to `$0`, is
/// also the group id every descendant inherits. The trailing `exit` keeps the
/// outer shell from exec'ing the inner one in place. The payload stays a
/// discrete argument and is never parsed by either shell.
const LAUNCHER_SCRIPT: &str = r#"/bin/sh -c 'echo $$ > "$0" && if command -v setsid > /dev/null 2>&1; then exec setsid "$@"; fi; exec "$@"' "$0" "$@"; exit $?"#;

/// Sends signal `$1` to the process group recorded in file `$0`, falling back
/// to the single pid when no such group exists yet
const SIGNAL_SCRIPT: &str = r#"pid=$(cat "$0") && { kill -s "$1" -- "-$pid" 2> /dev/null || kill -s "$1" "$pid"; }"#;

const CLEANUP_SCRIPT: &str = r#"rm -f "$0""#;

/// Directory inside the container holding per-exec pid files
const PID_DIR: &str = "/tmp";

#[derive(Debug, Clone)]
struct LaunchRecord {
    pid_path: String,
    user: Option<String>,
}

pub struct DockerEngine {
    client: Docker,
    launches: Mutex<HashMap<String, LaunchRecord>>,
}

impl DockerEngine {
    /// Connect to the Docker daemon using the default socket/env settings
    /// and verify the connection with a ping.
    pub async fn connect() -> Result<Self> {
        let client = Docker::connect_with_defaults().map_err(|e| {
            error!("Failed to connect to Docker daemon: {}", e);
            SandboxError::Docker(e)
        })?;

        let engine = Self::with_client(client);
        engine.ping().await?;

        info!("Successfully connected to Docker daemon");
        Ok(engine)
    }

    /// Create with a specific Docker connection
    pub fn with_client(client: Docker) -> Self {
        Self {
            client,
            launches: Mutex::new(HashMap::new()),
        }
    }

    fn launch_record(&self, exec_id: &str) -> Option<LaunchRecord> {
        self.launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(exec_id)
            .cloned()
    }

    /// Run a short helper command to completion and fail on nonzero exit
    async fn run_helper(&self, target: &str, argv: Vec<String>, user: Option<String>) -> Result<()> {
        let exec = self
            .client
            .create_exec(
                target,
                CreateExecOptions {
                    cmd: Some(argv),
                    user,
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_not_found(e, target))?;

        let mut stderr = Vec::new();
        match self.client.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(msg) = output.next().await {
                    if let Ok(LogOutput::StdErr { message }) = msg {
                        stderr.extend_from_slice(&message);
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::Engine(
                    "Helper exec was detached unexpectedly".to_string(),
                ))
            }
        }

        let inspect = self.client.inspect_exec(&exec.id).await?;
        match inspect.exit_code {
            Some(0) => Ok(()),
            code => Err(SandboxError::Engine(format!(
                "Helper exec exited with {:?}: {}",
                code,
                String::from_utf8_lossy(&stderr).trim()
            ))),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.client.ping().await?;
        Ok(())
    }

    async fn inspect_container(&self, target: &str) -> Result<ContainerInfo> {
        let inspect = self
            .client
            .inspect_container(target, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_not_found(e, target))?;

        let status = inspect
            .state
            .as_ref()
            .and_then(|state| state.status.as_ref())
            .map(|s| ContainerStatus::from_state(s.as_ref()))
            .unwrap_or_else(|| ContainerStatus::Unknown("missing state".to_string()));

        let created = inspect
            .created
            .as_ref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        Ok(ContainerInfo {
            id: inspect.id.unwrap_or_else(|| target.to_string()),
            name: inspect
                .name
                .unwrap_or_else(|| target.to_string())
                .trim_start_matches('/')
                .to_string(),
            image: inspect
                .config
                .and_then(|config| config.image)
                .unwrap_or_default(),
            status,
            created,
        })
    }

    async fn start_exec(&self, target: &str, spec: &ExecSpec) -> Result<ExecSession> {
        let pid_path = format!("{}/.solitary-{}.pid", PID_DIR, uuid::Uuid::new_v4());

        let mut cmd = vec![
            HELPER_SHELL.to_string(),
            "-c".to_string(),
            LAUNCHER_SCRIPT.to_string(),
            pid_path.clone(),
        ];
        cmd.extend(spec.argv.iter().cloned());

        debug!("Creating exec in container {}: {:?}", target, spec.argv);

        let exec = self
            .client
            .create_exec(
                target,
                CreateExecOptions {
                    cmd: Some(cmd),
                    env: Some(spec.env_pairs()),
                    working_dir: Some(spec.workdir.clone()),
                    user: spec.user.clone(),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_not_found(e, target))?;

        let options = StartExecOptions {
            detach: false,
            tty: false,
            output_capacity: None,
        };

        let (output, input) = match self.client.start_exec(&exec.id, Some(options)).await? {
            StartExecResults::Attached { output, input } => (output, input),
            StartExecResults::Detached => {
                return Err(SandboxError::Engine(
                    "Exec was detached unexpectedly".to_string(),
                ))
            }
        };

        self.launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                exec.id.clone(),
                LaunchRecord {
                    pid_path,
                    user: spec.user.clone(),
                },
            );

        let output = output
            .filter_map(|msg| async move {
                match msg {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        Some(Ok(OutputChunk {
                            stream: StreamType::Stdout,
                            data: message.to_vec(),
                        }))
                    }
                    Ok(LogOutput::StdErr { message }) => Some(Ok(OutputChunk {
                        stream: StreamType::Stderr,
                        data: message.to_vec(),
                    })),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(SandboxError::Docker(e))),
                }
            })
            .boxed();

        Ok(ExecSession {
            handle: ExecHandle {
                id: exec.id,
                target: target.to_string(),
            },
            output,
            input,
        })
    }

    async fn exec_state(&self, handle: &ExecHandle) -> Result<ExecState> {
        let inspect = self.client.inspect_exec(&handle.id).await?;

        Ok(ExecState {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
        })
    }

    async fn signal_exec(&self, handle: &ExecHandle, signal: Signal) -> Result<()> {
        let record = self.launch_record(&handle.id).ok_or_else(|| {
            SandboxError::Engine(format!("No launch record for exec {}", handle.id))
        })?;

        info!(
            "Sending SIG{} to exec {} in container {}",
            signal.name(),
            handle.id,
            handle.target
        );

        let argv = vec![
            HELPER_SHELL.to_string(),
            "-c".to_string(),
            SIGNAL_SCRIPT.to_string(),
            record.pid_path,
            signal.name().to_string(),
        ];

        self.run_helper(&handle.target, argv, record.user).await
    }

    async fn release_exec(&self, handle: &ExecHandle) -> Result<()> {
        let record = self
            .launches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle.id);

        let Some(record) = record else {
            return Ok(());
        };

        let argv = vec![
            HELPER_SHELL.to_string(),
            "-c".to_string(),
            CLEANUP_SCRIPT.to_string(),
            record.pid_path,
        ];

        if let Err(e) = self.run_helper(&handle.target, argv, record.user).await {
            warn!("Failed to clean up after exec {}: {}", handle.id, e);
        }
        Ok(())
    }

    async fn copy_into(&self, target: &str, source: &Path, dest_dir: &str) -> Result<()> {
        info!(
            "Copying {} to container {}:{}",
            source.display(),
            target,
            dest_dir
        );

        let tar_data = create_tar_archive(source)?;

        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            ..Default::default()
        };

        self.client
            .upload_to_container(target, Some(options), tar_data.into())
            .await
            .map_err(|e| map_upload_error(e, target, dest_dir))?;

        Ok(())
    }
}

/// Container missing is reported separately from other engine failures
fn map_not_found(e: BollardError, target: &str) -> SandboxError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => SandboxError::ContainerNotFound(target.to_string()),
        _ => SandboxError::Docker(e),
    }
}

/// The archive endpoint answers 404 for a missing destination path as well;
/// the container was already confirmed running, so report the path
fn map_upload_error(e: BollardError, target: &str, dest_dir: &str) -> SandboxError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => SandboxError::Engine(format!(
            "destination {} does not exist in {}",
            dest_dir, target
        )),
        _ => SandboxError::Docker(e),
    }
}

/// Pack a single file into a tar archive keyed by its file name
fn create_tar_archive(path: &Path) -> std::io::Result<Vec<u8>> {
    use std::fs;
    use tar::Builder;

    let mut archive = Builder::new(Vec::new());

    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid file name")
    })?;
    let mut file = fs::File::open(path)?;
    archive.append_file(file_name, &mut file)?;

    archive.into_inner()
}
