// ABOUTME: Container engine trait consumed by the execution supervisor
// ABOUTME: Defines exec sessions, output chunks and signals independent of the Docker API

use crate::error::Result;
use crate::types::ContainerInfo;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncWrite;

pub mod docker;

pub use docker::DockerEngine;

/// Everything the engine needs to start one process inside a container
#[derive(Debug, Clone, PartialEq)]
pub struct ExecSpec {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: String,
    pub user: Option<String>,
}

impl ExecSpec {
    /// `KEY=VALUE` pairs in key order
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Identifies a started exec session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecHandle {
    pub id: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputChunk {
    pub stream: StreamType,
    pub data: Vec<u8>,
}

/// Signals the supervisor can deliver to a running exec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Terminate => "TERM",
            Signal::Kill => "KILL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecState {
    pub running: bool,
    pub exit_code: Option<i64>,
}

pub type OutputStream = BoxStream<'static, Result<OutputChunk>>;
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// An attached exec: the output stream ends when the process and every
/// holder of its stdout/stderr have gone away.
pub struct ExecSession {
    pub handle: ExecHandle,
    pub output: OutputStream,
    pub input: InputSink,
}

/// Container engine capabilities used by the supervisor
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check the engine is reachable
    async fn ping(&self) -> Result<()>;

    /// Look up the target. Missing targets are `ContainerNotFound`.
    async fn inspect_container(&self, target: &str) -> Result<ContainerInfo>;

    /// Start a process with stdin, stdout and stderr attached
    async fn start_exec(&self, target: &str, spec: &ExecSpec) -> Result<ExecSession>;

    /// Current state of a started exec
    async fn exec_state(&self, handle: &ExecHandle) -> Result<ExecState>;

    /// Deliver a signal to the process behind `handle`
    async fn signal_exec(&self, handle: &ExecHandle, signal: Signal) -> Result<()>;

    /// Drop any engine-side bookkeeping for `handle`. Best-effort.
    async fn release_exec(&self, handle: &ExecHandle) -> Result<()>;

    /// Copy a local file into `dest_dir` inside the target
    async fn copy_into(&self, target: &str, source: &Path, dest_dir: &str) -> Result<()>;
}
