// ABOUTME: Stream pump bridging caller stdin and capped stdout/stderr buffers
// ABOUTME: Drains output continuously so a capped or chatty stream never stalls the process

use crate::engine::{InputSink, OutputStream, StreamType};
use crate::error::{Result, SandboxError};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Byte buffer that stops growing at `cap` and counts what it throws away.
///
/// The cut is a raw byte cut, so a multibyte UTF-8 sequence can be split at
/// the boundary.
#[derive(Debug, Clone)]
pub struct CappedBuffer {
    data: Vec<u8>,
    cap: usize,
    dropped: u64,
}

impl CappedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.cap.saturating_sub(self.data.len());
        let take = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..take]);
        self.dropped += (chunk.len() - take) as u64;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Output captured by a pump, handed to the result assembler
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: CappedBuffer,
    pub stderr: CappedBuffer,
}

impl CapturedOutput {
    fn new(cap: usize) -> Self {
        Self {
            stdout: CappedBuffer::new(cap),
            stderr: CappedBuffer::new(cap),
        }
    }
}

/// Owns the stdin writer and output drain tasks of one exec.
///
/// Dropping the pump aborts both tasks.
pub struct StreamPump {
    captured: Arc<Mutex<CapturedOutput>>,
    drain: Option<JoinHandle<Result<()>>>,
    stdin: Option<JoinHandle<()>>,
}

impl StreamPump {
    /// Start draining `output` and, when a payload is given, feeding `stdin`.
    ///
    /// The input side is shut down after the payload (or immediately when
    /// there is none) so the process observes end-of-input.
    pub fn attach(output: OutputStream, input: InputSink, stdin: Option<Vec<u8>>, cap: usize) -> Self {
        let captured = Arc::new(Mutex::new(CapturedOutput::new(cap)));

        let drain = tokio::spawn(drain_output(output, captured.clone()));
        let stdin = tokio::spawn(feed_stdin(input, stdin));

        Self {
            captured,
            drain: Some(drain),
            stdin: Some(stdin),
        }
    }

    /// Resolve once the output stream has ended.
    ///
    /// Cancel-safe: dropping this future leaves the drain running.
    pub async fn finished(&mut self) -> Result<()> {
        let Some(handle) = self.drain.as_mut() else {
            return Ok(());
        };

        let joined = handle.await;
        self.drain = None;

        match joined {
            Ok(result) => result,
            Err(e) => Err(SandboxError::Engine(format!("Output drain task failed: {}", e))),
        }
    }

    /// Give trailing output up to `window` to arrive, then stop both tasks
    /// and return whatever was captured.
    pub async fn settle(mut self, window: Duration) -> CapturedOutput {
        if self.drain.is_some() {
            match tokio::time::timeout(window, self.finished()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Output stream ended with error after verdict: {}", e),
                Err(_) => debug!("Output still open after {:?}, abandoning drain", window),
            }
        }

        self.abort();

        let captured = self
            .captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        captured.clone()
    }

    fn abort(&mut self) {
        if let Some(handle) = self.drain.take() {
            handle.abort();
        }
        if let Some(handle) = self.stdin.take() {
            handle.abort();
        }
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn drain_output(mut output: OutputStream, captured: Arc<Mutex<CapturedOutput>>) -> Result<()> {
    while let Some(chunk) = output.next().await {
        let chunk = chunk?;
        let mut captured = captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match chunk.stream {
            StreamType::Stdout => captured.stdout.push(&chunk.data),
            StreamType::Stderr => captured.stderr.push(&chunk.data),
        }
    }
    Ok(())
}

async fn feed_stdin(mut input: InputSink, payload: Option<Vec<u8>>) {
    if let Some(payload) = payload {
        if let Err(e) = input.write_all(&payload).await {
            // process exited or closed stdin without reading everything
            debug!("stdin write stopped early: {}", e);
            return;
        }
        if let Err(e) = input.flush().await {
            debug!("stdin flush failed: {}", e);
        }
    }

    if let Err(e) = input.shutdown().await {
        warn!("Failed to close stdin: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OutputChunk;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    fn chunk(stream: StreamType, data: &[u8]) -> Result<OutputChunk> {
        Ok(OutputChunk {
            stream,
            data: data.to_vec(),
        })
    }

    #[test]
    fn test_capped_buffer_cuts_at_cap() {
        let mut buffer = CappedBuffer::new(5);
        buffer.push(b"abc");
        buffer.push(b"defgh");
        buffer.push(b"ij");

        assert_eq!(buffer.len(), 5);
        assert!(buffer.is_truncated());
        assert_eq!(buffer.dropped(), 5);
        assert_eq!(buffer.into_bytes(), b"abcde".to_vec());
    }

    #[test]
    fn test_capped_buffer_exact_fit_not_truncated() {
        let mut buffer = CappedBuffer::new(4);
        buffer.push(b"ab");
        buffer.push(b"cd");
        buffer.push(b"");

        assert!(!buffer.is_truncated());
        assert_eq!(buffer.into_bytes(), b"abcd".to_vec());
    }

    #[tokio::test]
    async fn test_pump_separates_and_caps_streams() {
        let output = stream::iter(vec![
            chunk(StreamType::Stdout, b"hello "),
            chunk(StreamType::Stderr, b"warn"),
            chunk(StreamType::Stdout, b"world, this is long"),
        ])
        .boxed();
        let (input, _reader) = tokio::io::duplex(64);

        let mut pump = StreamPump::attach(output, Box::pin(input), None, 8);
        pump.finished().await.unwrap();
        let captured = pump.settle(Duration::from_millis(10)).await;

        assert_eq!(captured.stdout.clone().into_bytes(), b"hello wo".to_vec());
        assert!(captured.stdout.is_truncated());
        assert_eq!(captured.stderr.into_bytes(), b"warn".to_vec());
    }

    #[tokio::test]
    async fn test_pump_writes_stdin_then_closes() {
        let output = stream::empty().boxed();
        let (input, mut reader) = tokio::io::duplex(64);

        let _pump = StreamPump::attach(output, Box::pin(input), Some(b"line\n".to_vec()), 16);

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"line\n".to_vec());
    }

    #[tokio::test]
    async fn test_pump_reports_stream_error() {
        let output = stream::iter(vec![
            chunk(StreamType::Stdout, b"partial"),
            Err(SandboxError::Engine("connection reset".to_string())),
        ])
        .boxed();
        let (input, _reader) = tokio::io::duplex(64);

        let mut pump = StreamPump::attach(output, Box::pin(input), None, 64);
        let result = pump.finished().await;

        assert!(matches!(result, Err(SandboxError::Engine(_))));
        let captured = pump.settle(Duration::from_millis(10)).await;
        assert_eq!(captured.stdout.into_bytes(), b"partial".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_abandons_open_stream() {
        let output = stream::iter(vec![chunk(StreamType::Stdout, b"early")])
            .chain(stream::pending())
            .boxed();
        let (input, _reader) = tokio::io::duplex(64);

        let pump = StreamPump::attach(output, Box::pin(input), None, 64);
        tokio::task::yield_now().await;
        let captured = pump.settle(Duration::from_millis(100)).await;

        assert_eq!(captured.stdout.into_bytes(), b"early".to_vec());
    }
}
