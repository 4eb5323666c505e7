// ABOUTME: Supervised code execution inside already-running Docker containers
// ABOUTME: Bounds wall-clock time and captured output, returning one immutable result per call

pub mod assembler;
pub mod blocking;
pub mod command;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod pump;
pub mod supervisor;
pub mod timeout;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigOverrides, ExecutionConfig, ExecutionConfigBuilder};
pub use engine::{
    ContainerEngine, DockerEngine, ExecHandle, ExecSession, ExecSpec, ExecState, OutputChunk,
    Signal, StreamType,
};
pub use error::{Result, SandboxError};
pub use supervisor::Sandbox;
pub use types::{
    ContainerInfo, ContainerStatus, ExecutionRequest, ExecutionResult, ResultType, ResultValue,
    Runner, TERMINATED_EXIT_CODE,
};
