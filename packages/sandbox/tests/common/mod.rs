// ABOUTME: In-process container engine used by the supervisor integration tests
// ABOUTME: Scripts process behaviour per exec and records every engine interaction

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use solitary_sandbox::{
    ContainerEngine, ContainerInfo, ContainerStatus, ExecHandle, ExecSession, ExecSpec, ExecState,
    OutputChunk, Result, SandboxError, Signal, StreamType,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

pub const TARGET: &str = "sandbox";

/// How the fake process behaves once started
#[derive(Debug, Clone)]
pub enum Script {
    /// Print then exit
    Exit {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        code: i64,
    },
    /// Copy stdin to stdout, exit 0
    Echo,
    /// Write `total` bytes to one stream in `chunk`-sized pieces
    Flood {
        stream: StreamType,
        total: usize,
        chunk: usize,
        code: i64,
    },
    /// Print `partial`, then run until signalled
    Hang {
        partial: Vec<u8>,
        honour_terminate: bool,
    },
    /// Print `partial`, then the transport fails
    BrokenStream { partial: Vec<u8> },
}

impl Script {
    pub fn exit(stdout: &str, stderr: &str, code: i64) -> Self {
        Script::Exit {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            code,
        }
    }

    pub fn hang(honour_terminate: bool) -> Self {
        Script::Hang {
            partial: Vec::new(),
            honour_terminate,
        }
    }
}

struct FakeExec {
    running: bool,
    exit_code: Option<i64>,
    signals: mpsc::UnboundedSender<Signal>,
}

#[derive(Default)]
pub struct FakeState {
    /// Engine methods in call order
    pub calls: Vec<&'static str>,
    pub started: Vec<ExecSpec>,
    pub signals: Vec<(String, Signal)>,
    pub copies: Vec<(PathBuf, String)>,
    pub released: Vec<String>,
    execs: HashMap<String, FakeExec>,
    next_id: u64,
}

type ScriptFn = Box<dyn Fn(&ExecSpec) -> Script + Send + Sync>;

pub struct FakeEngine {
    containers: HashMap<String, ContainerStatus>,
    script: ScriptFn,
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    /// One running container named [`TARGET`]; every exec follows `script`
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&ExecSpec) -> Script + Send + Sync + 'static,
    {
        Self::with_containers(
            HashMap::from([(TARGET.to_string(), ContainerStatus::Running)]),
            script,
        )
    }

    pub fn with_containers<F>(containers: HashMap<String, ContainerStatus>, script: F) -> Arc<Self>
    where
        F: Fn(&ExecSpec) -> Script + Send + Sync + 'static,
    {
        Arc::new(Self {
            containers,
            script: Box::new(script),
            state: Arc::new(Mutex::new(FakeState::default())),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: &'static str) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        self.record("ping");
        Ok(())
    }

    async fn inspect_container(&self, target: &str) -> Result<ContainerInfo> {
        self.record("inspect_container");
        let status = self
            .containers
            .get(target)
            .cloned()
            .ok_or_else(|| SandboxError::ContainerNotFound(target.to_string()))?;

        Ok(ContainerInfo {
            id: format!("{}-id", target),
            name: target.to_string(),
            image: "python:3.12-slim".to_string(),
            status,
            created: None,
        })
    }

    async fn start_exec(&self, target: &str, spec: &ExecSpec) -> Result<ExecSession> {
        self.record("start_exec");
        let script = (self.script)(spec);

        let (out_tx, out_rx) = mpsc::channel::<Result<OutputChunk>>(16);
        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        let (stdin_writer, stdin_reader) = tokio::io::duplex(1024);

        let id = {
            let mut state = self.state();
            state.next_id += 1;
            let id = format!("exec-{}", state.next_id);
            state.started.push(spec.clone());
            state.execs.insert(
                id.clone(),
                FakeExec {
                    running: true,
                    exit_code: None,
                    signals: sig_tx,
                },
            );
            id
        };

        tokio::spawn(run_script(
            script,
            id.clone(),
            self.state.clone(),
            out_tx,
            sig_rx,
            stdin_reader,
        ));

        let output = futures::stream::unfold(out_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok(ExecSession {
            handle: ExecHandle {
                id,
                target: target.to_string(),
            },
            output,
            input: Box::pin(stdin_writer),
        })
    }

    async fn exec_state(&self, handle: &ExecHandle) -> Result<ExecState> {
        self.record("exec_state");
        let state = self.state();
        let exec = state
            .execs
            .get(&handle.id)
            .ok_or_else(|| SandboxError::Engine(format!("unknown exec {}", handle.id)))?;

        Ok(ExecState {
            running: exec.running,
            exit_code: exec.exit_code,
        })
    }

    async fn signal_exec(&self, handle: &ExecHandle, signal: Signal) -> Result<()> {
        self.record("signal_exec");
        let mut state = self.state();
        state.signals.push((handle.id.clone(), signal));
        let exec = state
            .execs
            .get(&handle.id)
            .ok_or_else(|| SandboxError::Engine(format!("unknown exec {}", handle.id)))?;
        let _ = exec.signals.send(signal);
        Ok(())
    }

    async fn release_exec(&self, handle: &ExecHandle) -> Result<()> {
        self.record("release_exec");
        self.state().released.push(handle.id.clone());
        Ok(())
    }

    async fn copy_into(&self, _target: &str, source: &Path, dest_dir: &str) -> Result<()> {
        self.record("copy_into");
        if !source.exists() {
            return Err(SandboxError::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )));
        }
        self.state()
            .copies
            .push((source.to_path_buf(), dest_dir.to_string()));
        Ok(())
    }
}

fn chunk(stream: StreamType, data: Vec<u8>) -> Result<OutputChunk> {
    Ok(OutputChunk { stream, data })
}

async fn run_script(
    script: Script,
    id: String,
    state: Arc<Mutex<FakeState>>,
    out: mpsc::Sender<Result<OutputChunk>>,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    mut stdin: DuplexStream,
) {
    let code = match script {
        Script::Exit {
            stdout,
            stderr,
            code,
        } => {
            if !stdout.is_empty() {
                let _ = out.send(chunk(StreamType::Stdout, stdout)).await;
            }
            if !stderr.is_empty() {
                let _ = out.send(chunk(StreamType::Stderr, stderr)).await;
            }
            code
        }
        Script::Echo => {
            let mut input = Vec::new();
            let _ = stdin.read_to_end(&mut input).await;
            let _ = out.send(chunk(StreamType::Stdout, input)).await;
            0
        }
        Script::Flood {
            stream,
            total,
            chunk: size,
            code,
        } => {
            let mut sent = 0;
            while sent < total {
                let n = size.min(total - sent);
                if out.send(chunk(stream, vec![b'x'; n])).await.is_err() {
                    break;
                }
                sent += n;
            }
            code
        }
        Script::Hang {
            partial,
            honour_terminate,
        } => {
            if !partial.is_empty() {
                let _ = out.send(chunk(StreamType::Stdout, partial)).await;
            }
            loop {
                match signals.recv().await {
                    Some(Signal::Terminate) if honour_terminate => break 143,
                    Some(Signal::Kill) | None => break 137,
                    Some(Signal::Terminate) => continue,
                }
            }
        }
        Script::BrokenStream { partial } => {
            let _ = out.send(chunk(StreamType::Stdout, partial)).await;
            let _ = out
                .send(Err(SandboxError::Engine(
                    "connection reset by peer".to_string(),
                )))
                .await;
            // keep running until the supervisor kills us
            loop {
                match signals.recv().await {
                    Some(Signal::Kill) | None => break 137,
                    Some(Signal::Terminate) => continue,
                }
            }
        }
    };

    {
        let mut state = state.lock().unwrap();
        if let Some(exec) = state.execs.get_mut(&id) {
            exec.running = false;
            exec.exit_code = Some(code);
        }
    }
    drop(out);
}
