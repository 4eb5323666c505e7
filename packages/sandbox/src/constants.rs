// ABOUTME: Environment variable names and default values for execution configuration
// ABOUTME: Centralized definitions shared by the config loader and the CLI

// Environment variable names
pub const SOLITARY_CONTAINER: &str = "SOLITARY_CONTAINER";
pub const SOLITARY_TIMEOUT: &str = "SOLITARY_TIMEOUT";
pub const SOLITARY_WORKDIR: &str = "SOLITARY_WORKDIR";
pub const SOLITARY_MAX_OUTPUT: &str = "SOLITARY_MAX_OUTPUT";
pub const SOLITARY_SHELL: &str = "SOLITARY_SHELL";
pub const SOLITARY_USER: &str = "SOLITARY_USER";
pub const SOLITARY_INTERPRETER: &str = "SOLITARY_INTERPRETER";
pub const SOLITARY_GRACE_PERIOD_MS: &str = "SOLITARY_GRACE_PERIOD_MS";

// Defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_WORKDIR: &str = "/workspace";
pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 1024 * 1024;
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 500;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 250;

/// Timeout used by the liveness probe
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;
pub const HEALTH_CHECK_MARKER: &str = "health_check";
