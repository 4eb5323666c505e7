// ABOUTME: End-to-end execution scenarios against a real Docker daemon
// ABOUTME: Needs SOLITARY_TEST_CONTAINER naming a running container with python3 and /workspace

use solitary_sandbox::{
    ExecutionConfig, ExecutionConfigBuilder, ExecutionRequest, Sandbox, SandboxError,
    TERMINATED_EXIT_CODE,
};
use std::io::Write;
use std::time::{Duration, Instant};

const CONTAINER_VAR: &str = "SOLITARY_TEST_CONTAINER";

/// Connect to the container named by the environment, or skip the test
async fn sandbox_with<F>(configure: F) -> Option<Sandbox>
where
    F: FnOnce(ExecutionConfigBuilder) -> ExecutionConfigBuilder,
{
    let Ok(target) = std::env::var(CONTAINER_VAR) else {
        println!("Skipping test: {} not set", CONTAINER_VAR);
        return None;
    };

    let config = configure(ExecutionConfig::builder(target))
        .build()
        .expect("Invalid test config");

    match Sandbox::connect(config).await {
        Ok(sandbox) => Some(sandbox),
        Err(e) => {
            println!("Skipping test: Docker not available ({})", e);
            None
        }
    }
}

async fn default_sandbox() -> Option<Sandbox> {
    sandbox_with(|builder| builder).await
}

/// Count processes whose cmdline contains `head` followed by `tail`. The two
/// halves are joined at runtime so the counting process never matches itself.
async fn count_processes(sandbox: &Sandbox, head: &str, tail: &str) -> String {
    let code = format!(
        "import os\n\
         n = 0\n\
         for pid in filter(str.isdigit, os.listdir('/proc')):\n\
         \x20   try:\n\
         \x20       n += b'{}' + b'{}' in open(f'/proc/{{pid}}/cmdline', 'rb').read()\n\
         \x20   except OSError:\n\
         \x20       pass\n\
         print(n)",
        head, tail
    );
    let result = sandbox.execute_code(code).await.unwrap();
    result.stdout().trim().to_string()
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_print_hello() {
    let Some(sandbox) = default_sandbox().await else {
        return;
    };

    let result = sandbox.execute_code("print('hi')").await.unwrap();

    assert_eq!(result.stdout(), "hi\n");
    assert_eq!(result.exit_code(), 0);
    assert!(!result.timeout_occurred());
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_division_by_zero_reports_stderr() {
    let Some(sandbox) = default_sandbox().await else {
        return;
    };

    let result = sandbox.execute_code("1/0").await.unwrap();

    assert_ne!(result.exit_code(), 0);
    assert!(result.stderr().contains("ZeroDivisionError"));
    assert!(!result.timeout_occurred());
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_infinite_loop_times_out() {
    let Some(sandbox) = sandbox_with(|builder| builder.timeout_secs(2)).await else {
        return;
    };

    let wall = Instant::now();
    let result = sandbox.execute_code("while True: pass").await.unwrap();
    let elapsed = wall.elapsed();

    assert!(result.timeout_occurred());
    assert_eq!(result.exit_code(), TERMINATED_EXIT_CODE);
    assert!(result.execution_time() >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(4), "took {:?}", elapsed);
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_sigterm_ignoring_process_is_killed() {
    let Some(sandbox) = sandbox_with(|builder| builder.timeout_secs(1)).await else {
        return;
    };

    let code = "import signal, time\nsignal.signal(signal.SIGTERM, signal.SIG_IGN)\nwhile True: time.sleep(0.1)";
    let wall = Instant::now();
    let result = sandbox.execute_code(code).await.unwrap();

    assert!(result.timeout_occurred());
    assert!(wall.elapsed() < Duration::from_secs(3));

    // the killed process must be gone from the container
    assert_eq!(count_processes(&sandbox, "SIG_", "IGN").await, "0");
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_shell_timeout_takes_down_spawned_children() {
    let Some(sandbox) = sandbox_with(|builder| builder.timeout_secs(1)).await else {
        return;
    };

    let command = "python3 -c 'import time\nLINGER = 1\nwhile True: time.sleep(0.1)'; echo done";
    let wall = Instant::now();
    let result = sandbox
        .execute(ExecutionRequest::shell(command))
        .await
        .unwrap();

    assert!(result.timeout_occurred());
    assert_eq!(result.exit_code(), TERMINATED_EXIT_CODE);
    assert!(!result.stdout().contains("done"));
    assert!(wall.elapsed() < Duration::from_secs(3));

    assert_eq!(count_processes(&sandbox, "LIN", "GER = 1").await, "0");
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_large_output_is_capped() {
    let Some(sandbox) = sandbox_with(|builder| builder.max_output_size(1024)).await else {
        return;
    };

    let result = sandbox
        .execute_code("import sys\nsys.stdout.write('x' * 10_000_000)")
        .await
        .unwrap();

    assert_eq!(result.stdout().len(), 1024);
    assert_eq!(result.exit_code(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_stdin_and_env() {
    let Some(sandbox) = default_sandbox().await else {
        return;
    };

    let request = ExecutionRequest::code(
        "import os, sys\nprint(os.environ['GREETING'], sys.stdin.read().strip())",
    )
    .with_env("GREETING", "hello")
    .with_stdin(b"world\n".to_vec());
    let result = sandbox.execute(request).await.unwrap();

    assert_eq!(result.stdout(), "hello world\n");
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_file_execution_with_args() {
    let Some(sandbox) = default_sandbox().await else {
        return;
    };

    let mut file = tempfile::Builder::new().suffix(".py").tempfile().unwrap();
    writeln!(file, "import sys\nprint(' '.join(sys.argv[1:]))").unwrap();

    let args = vec!["alpha".to_string(), "beta".to_string()];
    let result = sandbox.execute_file(file.path(), &args).await.unwrap();

    assert_eq!(result.stdout(), "alpha beta\n");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_unknown_container() {
    let Ok(sandbox) = Sandbox::connect(
        ExecutionConfig::builder("solitary-no-such-container")
            .build()
            .unwrap(),
    )
    .await
    else {
        println!("Skipping test: Docker not available");
        return;
    };

    let err = sandbox.execute_code("print(1)").await.unwrap_err();
    assert!(matches!(err, SandboxError::ContainerNotFound(_)));
    assert!(!sandbox.is_healthy().await);
}

#[tokio::test]
#[ignore] // Requires Docker and a running target container
async fn test_health_check() {
    let Some(sandbox) = default_sandbox().await else {
        return;
    };

    assert!(sandbox.is_healthy().await);
    sandbox.close().await;
    assert!(!sandbox.is_healthy().await);
}
