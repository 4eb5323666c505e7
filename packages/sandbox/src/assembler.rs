// ABOUTME: Result assembler normalizing clean and forcibly terminated runs into one shape
// ABOUTME: Applies the terminated sentinel and lossy decoding of captured bytes

use crate::pump::CapturedOutput;
use crate::timeout::Verdict;
use crate::types::{ExecutionResult, TERMINATED_EXIT_CODE};
use std::time::Duration;
use tracing::debug;

pub fn assemble(
    captured: CapturedOutput,
    verdict: Verdict,
    execution_time: Duration,
    max_output_size: usize,
    container_id: &str,
    command: String,
) -> ExecutionResult {
    let (exit_code, timeout_occurred) = match verdict {
        Verdict::Completed { exit_code } => (exit_code, false),
        Verdict::TimedOut => (TERMINATED_EXIT_CODE, true),
    };

    if captured.stdout.is_truncated() || captured.stderr.is_truncated() {
        debug!(
            "Output capped: dropped {} stdout bytes, {} stderr bytes",
            captured.stdout.dropped(),
            captured.stderr.dropped()
        );
    }

    ExecutionResult::new(
        decode(captured.stdout.into_bytes(), max_output_size),
        decode(captured.stderr.into_bytes(), max_output_size),
        exit_code,
        execution_time,
        timeout_occurred,
        container_id.to_string(),
        command,
    )
}

/// Lossy UTF-8 decode that never grows past `cap` bytes. Replacement
/// characters are wider than the bytes they stand for, so a sequence split
/// at the cap is dropped rather than replaced.
fn decode(bytes: Vec<u8>, cap: usize) -> String {
    let mut text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };

    if text.len() > cap {
        let mut end = cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
