// ABOUTME: Immutable execution configuration with validation and per-call override merging
// ABOUTME: Loads defaults from JSON files or SOLITARY_* environment variables

use crate::constants::*;
use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Per-sandbox execution defaults.
///
/// Only obtainable through [`ExecutionConfigBuilder::build`], so every value
/// held by the supervisor has passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionConfig {
    target: String,
    timeout_secs: u64,
    workdir: String,
    max_output_size: usize,
    env: BTreeMap<String, String>,
    user: Option<String>,
    shell: String,
    interpreter: Vec<String>,
    grace_period_ms: u64,
    drain_timeout_ms: u64,
}

impl ExecutionConfig {
    pub fn builder(target: impl Into<String>) -> ExecutionConfigBuilder {
        ExecutionConfigBuilder::default().target(target)
    }

    /// Load a config from a JSON document. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        ExecutionConfigBuilder::from_file(path)?.build()
    }

    /// Load a config from `SOLITARY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ExecutionConfigBuilder::default()
            .apply_env(|key| std::env::var(key).ok())?
            .build()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn max_output_size(&self) -> usize {
        self.max_output_size
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn interpreter(&self) -> &[String] {
        &self.interpreter
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn to_builder(&self) -> ExecutionConfigBuilder {
        ExecutionConfigBuilder {
            target: self.target.clone(),
            timeout_secs: self.timeout_secs,
            workdir: self.workdir.clone(),
            max_output_size: self.max_output_size,
            env: self.env.clone(),
            user: self.user.clone(),
            shell: self.shell.clone(),
            interpreter: self.interpreter.clone(),
            grace_period_ms: self.grace_period_ms,
            drain_timeout_ms: self.drain_timeout_ms,
        }
    }

    /// Resolve the effective config for one call.
    ///
    /// Every field set in `overrides` replaces the default; env maps are
    /// unioned with the override winning on key collisions. A result that
    /// fails validation is reported as an invalid request.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Result<ExecutionConfig> {
        let mut builder = self.to_builder();

        if let Some(timeout_secs) = overrides.timeout_secs {
            builder = builder.timeout_secs(timeout_secs);
        }
        if let Some(workdir) = &overrides.workdir {
            builder = builder.workdir(workdir.clone());
        }
        if let Some(max_output_size) = overrides.max_output_size {
            builder = builder.max_output_size(max_output_size);
        }
        if let Some(user) = &overrides.user {
            builder = builder.user(user.clone());
        }
        if let Some(shell) = &overrides.shell {
            builder = builder.shell(shell.clone());
        }
        builder = builder.envs(overrides.env.clone());

        builder.build().map_err(|e| match e {
            SandboxError::InvalidConfiguration(msg) => {
                SandboxError::InvalidRequest(format!("invalid override: {}", msg))
            }
            other => other,
        })
    }
}

/// Unvalidated configuration. Deserializable so JSON config files can leave
/// out any field except `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfigBuilder {
    #[serde(alias = "container")]
    target: String,
    timeout_secs: u64,
    workdir: String,
    max_output_size: usize,
    env: BTreeMap<String, String>,
    user: Option<String>,
    shell: String,
    interpreter: Vec<String>,
    grace_period_ms: u64,
    drain_timeout_ms: u64,
}

impl Default for ExecutionConfigBuilder {
    fn default() -> Self {
        Self {
            target: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workdir: DEFAULT_WORKDIR.to_string(),
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            env: BTreeMap::new(),
            user: None,
            shell: DEFAULT_SHELL.to_string(),
            interpreter: vec![DEFAULT_INTERPRETER.to_string()],
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl ExecutionConfigBuilder {
    /// Read an unvalidated config from a JSON document, for callers that
    /// layer more sources on top before building.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn max_output_size(mut self, max_output_size: usize) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn grace_period_ms(mut self, grace_period_ms: u64) -> Self {
        self.grace_period_ms = grace_period_ms;
        self
    }

    pub fn drain_timeout_ms(mut self, drain_timeout_ms: u64) -> Self {
        self.drain_timeout_ms = drain_timeout_ms;
        self
    }

    /// Overlay values found through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(target) = lookup(SOLITARY_CONTAINER) {
            self.target = target;
        }
        if let Some(raw) = lookup(SOLITARY_TIMEOUT) {
            self.timeout_secs = parse_number(SOLITARY_TIMEOUT, &raw)?;
        }
        if let Some(workdir) = lookup(SOLITARY_WORKDIR) {
            self.workdir = workdir;
        }
        if let Some(raw) = lookup(SOLITARY_MAX_OUTPUT) {
            self.max_output_size = parse_number(SOLITARY_MAX_OUTPUT, &raw)?;
        }
        if let Some(shell) = lookup(SOLITARY_SHELL) {
            self.shell = shell;
        }
        if let Some(user) = lookup(SOLITARY_USER) {
            self.user = Some(user);
        }
        if let Some(raw) = lookup(SOLITARY_INTERPRETER) {
            self.interpreter = raw.split_whitespace().map(str::to_string).collect();
        }
        if let Some(raw) = lookup(SOLITARY_GRACE_PERIOD_MS) {
            self.grace_period_ms = parse_number(SOLITARY_GRACE_PERIOD_MS, &raw)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<ExecutionConfig> {
        if self.target.trim().is_empty() {
            return Err(invalid("target container cannot be empty"));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(invalid(format!(
                "timeout must be between 1 and {} seconds, got {}",
                MAX_TIMEOUT_SECS, self.timeout_secs
            )));
        }

        if self.max_output_size == 0 {
            return Err(invalid("max_output_size must be positive"));
        }

        if !self.workdir.starts_with('/') {
            return Err(invalid(format!(
                "workdir '{}' must be an absolute path",
                self.workdir
            )));
        }

        if self.shell.trim().is_empty() {
            return Err(invalid("shell cannot be empty"));
        }

        match self.interpreter.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => return Err(invalid("interpreter cannot be empty")),
        }

        if let Some(user) = &self.user {
            if user.trim().is_empty() {
                return Err(invalid("user cannot be blank"));
            }
        }

        for key in self.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(invalid(format!("invalid environment variable name '{}'", key)));
            }
        }

        Ok(ExecutionConfig {
            target: self.target,
            timeout_secs: self.timeout_secs,
            workdir: self.workdir,
            max_output_size: self.max_output_size,
            env: self.env,
            user: self.user,
            shell: self.shell,
            interpreter: self.interpreter,
            grace_period_ms: self.grace_period_ms,
            drain_timeout_ms: self.drain_timeout_ms,
        })
    }
}

/// Per-call overrides layered over an [`ExecutionConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub timeout_secs: Option<u64>,
    pub workdir: Option<String>,
    pub max_output_size: Option<usize>,
    pub env: BTreeMap<String, String>,
    pub user: Option<String>,
    pub shell: Option<String>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn invalid(msg: impl Into<String>) -> SandboxError {
    SandboxError::InvalidConfiguration(msg.into())
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| invalid(format!("{} must be a non-negative integer, got '{}'", var, raw)))
}
