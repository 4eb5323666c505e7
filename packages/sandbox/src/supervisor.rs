// ABOUTME: Execution supervisor running one command to completion inside a target container
// ABOUTME: Composes command building, stream pumping, timeout governance and result assembly

use crate::assembler::assemble;
use crate::command::{build_command, BuiltCommand};
use crate::config::ExecutionConfig;
use crate::constants::{HEALTH_CHECK_MARKER, HEALTH_CHECK_TIMEOUT_SECS};
use crate::engine::{ContainerEngine, DockerEngine, ExecHandle, Signal};
use crate::error::{Result, SandboxError};
use crate::pump::StreamPump;
use crate::timeout::{Terminator, TimeoutGovernor, Verdict};
use crate::types::{ContainerInfo, ExecutionRequest, ExecutionResult};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Re-read interval when the output stream closed before the exec reported exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs code inside one pre-existing container.
///
/// Calls are independent and may run concurrently; the only shared state is
/// the immutable config and the engine client. The client is released by
/// [`Sandbox::close`] or when the sandbox is dropped.
pub struct Sandbox {
    config: Arc<ExecutionConfig>,
    engine: RwLock<Option<Arc<dyn ContainerEngine>>>,
}

impl Sandbox {
    /// Connect to the local Docker daemon
    pub async fn connect(config: ExecutionConfig) -> Result<Self> {
        let engine = DockerEngine::connect().await?;
        Ok(Self::with_engine(config, Arc::new(engine)))
    }

    /// Use a specific engine implementation
    pub fn with_engine(config: ExecutionConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            config: Arc::new(config),
            engine: RwLock::new(Some(engine)),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    async fn engine(&self) -> Result<Arc<dyn ContainerEngine>> {
        self.engine.read().await.clone().ok_or(SandboxError::Closed)
    }

    /// Run one request to completion.
    ///
    /// Request and override validation happen before any engine call. A
    /// nonzero exit code or a timeout is reported inside the result.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        debug!("Execution state: building");
        let config = self.config.merged(&request.overrides)?;
        let command = build_command(&request, &config)?;

        let engine = self.engine().await?;
        let info = self.running_target(engine.as_ref(), config.target()).await?;

        if let Some(source) = &command.upload {
            engine
                .copy_into(config.target(), source, config.workdir())
                .await?;
        }

        self.run(engine, &config, &info, command, request.stdin).await
    }

    /// Run `code` with the configured interpreter
    pub async fn execute_code(&self, code: impl Into<String>) -> Result<ExecutionResult> {
        self.execute(ExecutionRequest::code(code)).await
    }

    /// Run `command` with the configured shell
    pub async fn execute_shell(&self, command: impl Into<String>) -> Result<ExecutionResult> {
        self.execute(ExecutionRequest::shell(command)).await
    }

    /// Copy a local file into the container's workdir and run it
    pub async fn execute_file(
        &self,
        path: impl AsRef<Path>,
        args: &[String],
    ) -> Result<ExecutionResult> {
        let request = ExecutionRequest::file(path.as_ref()).with_args(args.iter().cloned());
        self.execute(request).await
    }

    /// Best-effort liveness probe; any failure reads as unhealthy
    pub async fn is_healthy(&self) -> bool {
        let request = ExecutionRequest::shell(format!("echo {}", HEALTH_CHECK_MARKER))
            .with_timeout_secs(HEALTH_CHECK_TIMEOUT_SECS);

        match self.execute(request).await {
            Ok(result) => result.success() && result.stdout().contains(HEALTH_CHECK_MARKER),
            Err(e) => {
                debug!("Health check against {} failed: {}", self.config.target(), e);
                false
            }
        }
    }

    /// Information about the target container
    pub async fn container_info(&self) -> Result<ContainerInfo> {
        let engine = self.engine().await?;
        engine.inspect_container(self.config.target()).await
    }

    /// Release the engine client. Safe to call more than once.
    pub async fn close(&self) {
        if self.engine.write().await.take().is_some() {
            info!("Closed sandbox for container {}", self.config.target());
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.engine.read().await.is_none()
    }

    async fn running_target(&self, engine: &dyn ContainerEngine, target: &str) -> Result<ContainerInfo> {
        let info = engine.inspect_container(target).await?;
        if !info.status.is_running() {
            return Err(SandboxError::ContainerNotFound(format!(
                "{} is not running (status: {})",
                target, info.status
            )));
        }
        Ok(info)
    }

    async fn run(
        &self,
        engine: Arc<dyn ContainerEngine>,
        config: &ExecutionConfig,
        info: &ContainerInfo,
        command: BuiltCommand,
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let session = engine.start_exec(config.target(), &command.spec).await?;
        let handle = session.handle.clone();
        debug!("Execution state: running (exec {})", handle.id);

        let mut pump = StreamPump::attach(
            session.output,
            session.input,
            stdin,
            config.max_output_size(),
        );

        let governor = TimeoutGovernor::new(config.timeout(), config.grace_period());
        let terminator = ExecTerminator {
            engine: engine.as_ref(),
            handle: &handle,
        };

        let outcome = governor
            .govern(
                started,
                wait_for_exit(&mut pump, engine.as_ref(), &handle),
                &terminator,
            )
            .await;

        let result = match outcome {
            Ok((verdict, decided_at)) => {
                match verdict {
                    Verdict::Completed { exit_code } => {
                        debug!("Execution state: completed with exit code {}", exit_code)
                    }
                    Verdict::TimedOut => debug!("Execution state: timed-out"),
                }

                let captured = pump.settle(config.drain_timeout()).await;
                debug!("Execution state: assembled");
                Ok(assemble(
                    captured,
                    verdict,
                    decided_at - started,
                    config.max_output_size(),
                    &info.id,
                    command.display(),
                ))
            }
            Err(e) => {
                error!("Execution state: failed (exec {}): {}", handle.id, e);
                if let Err(kill_err) = engine.signal_exec(&handle, Signal::Kill).await {
                    debug!("Kill after failure not delivered: {}", kill_err);
                }
                drop(pump);
                Err(e)
            }
        };

        if let Err(e) = engine.release_exec(&handle).await {
            warn!("Failed to release exec {}: {}", handle.id, e);
        }

        result
    }
}

/// Output stream closed, then the engine's exit code.
async fn wait_for_exit(
    pump: &mut StreamPump,
    engine: &dyn ContainerEngine,
    handle: &ExecHandle,
) -> Result<i64> {
    pump.finished().await?;

    loop {
        let state = engine.exec_state(handle).await?;
        if !state.running {
            return state.exit_code.ok_or_else(|| {
                SandboxError::Engine(format!("Exec {} finished without an exit code", handle.id))
            });
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}

struct ExecTerminator<'a> {
    engine: &'a dyn ContainerEngine,
    handle: &'a ExecHandle,
}

#[async_trait]
impl Terminator for ExecTerminator<'_> {
    async fn terminate(&self) -> Result<()> {
        self.engine.signal_exec(self.handle, Signal::Terminate).await
    }

    async fn kill(&self) -> Result<()> {
        self.engine.signal_exec(self.handle, Signal::Kill).await
    }
}
