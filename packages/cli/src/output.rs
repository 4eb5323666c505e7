// ABOUTME: Renders execution results and container details for the terminal
// ABOUTME: Maps results onto process exit codes, with 124 reserved for timeouts

use anyhow::Result;
use colored::*;
use serde::Serialize;
use solitary_sandbox::{ContainerInfo, ExecutionResult};

/// Exit status used when the run hit its timeout, as coreutils `timeout` does
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Process exit code mirroring the executed program
pub fn exit_code(result: &ExecutionResult) -> i32 {
    process_status(result.exit_code(), result.timeout_occurred())
}

pub fn process_status(exit_code: i64, timeout_occurred: bool) -> i32 {
    if timeout_occurred {
        return TIMEOUT_EXIT_CODE;
    }
    i32::try_from(exit_code).unwrap_or(1)
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Program output goes to the matching stream untouched; the summary line is
/// written to stderr so piping stdout stays clean.
pub fn print_result(result: &ExecutionResult) {
    print!("{}", result.stdout());
    eprint!("{}", result.stderr());

    if result.timeout_occurred() {
        eprintln!(
            "{} timed out after {:.2}s: {}",
            "Timeout:".yellow().bold(),
            result.execution_time().as_secs_f64(),
            result.command()
        );
    } else if result.exit_code() != 0 {
        eprintln!(
            "{} exited with code {} in {:.2}s",
            "Failed:".red().bold(),
            result.exit_code(),
            result.execution_time().as_secs_f64()
        );
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport<'a> {
    pub container: &'a str,
    pub healthy: bool,
}

pub fn print_health(report: &HealthReport<'_>) {
    if report.healthy {
        println!("{} {}", "healthy".green().bold(), report.container);
    } else {
        println!("{} {}", "unhealthy".red().bold(), report.container);
    }
}

pub fn format_info(info: &ContainerInfo) -> String {
    let created = info
        .created
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());

    let status = if info.status.is_running() {
        info.status.to_string().green()
    } else {
        info.status.to_string().yellow()
    };

    [
        field("Name:", &info.name),
        field("ID:", &info.id),
        field("Image:", &info.image),
        field("Status:", &status.to_string()),
        field("Created:", &created),
    ]
    .join("\n")
}

fn field(label: &str, value: &str) -> String {
    format!("{} {}", format!("{:<8}", label).bold(), value)
}
