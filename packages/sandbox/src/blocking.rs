// ABOUTME: Blocking facade over the async supervisor for synchronous callers
// ABOUTME: Owns a tokio runtime and blocks the calling thread until each call has a verdict

use crate::config::ExecutionConfig;
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::supervisor::Sandbox as AsyncSandbox;
use crate::types::{ContainerInfo, ExecutionRequest, ExecutionResult};
use std::path::Path;
use std::sync::Arc;

/// Synchronous counterpart of [`crate::Sandbox`].
///
/// Must not be created or used from inside an async runtime. Several threads
/// may call `execute` on the same instance at once.
pub struct Sandbox {
    inner: AsyncSandbox,
    runtime: tokio::runtime::Runtime,
}

impl Sandbox {
    /// Connect to the local Docker daemon
    pub fn connect(config: ExecutionConfig) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = runtime.block_on(AsyncSandbox::connect(config))?;
        Ok(Self { inner, runtime })
    }

    pub fn with_engine(config: ExecutionConfig, engine: Arc<dyn ContainerEngine>) -> Result<Self> {
        Ok(Self {
            inner: AsyncSandbox::with_engine(config, engine),
            runtime: build_runtime()?,
        })
    }

    pub fn config(&self) -> &ExecutionConfig {
        self.inner.config()
    }

    pub fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        self.runtime.block_on(self.inner.execute(request))
    }

    pub fn execute_code(&self, code: impl Into<String>) -> Result<ExecutionResult> {
        self.runtime.block_on(self.inner.execute_code(code))
    }

    pub fn execute_shell(&self, command: impl Into<String>) -> Result<ExecutionResult> {
        self.runtime.block_on(self.inner.execute_shell(command))
    }

    pub fn execute_file(&self, path: impl AsRef<Path>, args: &[String]) -> Result<ExecutionResult> {
        self.runtime.block_on(self.inner.execute_file(path, args))
    }

    pub fn is_healthy(&self) -> bool {
        self.runtime.block_on(self.inner.is_healthy())
    }

    pub fn container_info(&self) -> Result<ContainerInfo> {
        self.runtime.block_on(self.inner.container_info())
    }

    pub fn close(&self) {
        self.runtime.block_on(self.inner.close())
    }

    pub fn is_closed(&self) -> bool {
        self.runtime.block_on(self.inner.is_closed())
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("solitary-sandbox")
        .build()?)
}
