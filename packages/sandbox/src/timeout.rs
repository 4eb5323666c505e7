// ABOUTME: Timeout governor racing process completion against a wall-clock deadline
// ABOUTME: Escalates from graceful terminate to unconditional kill when the deadline passes

use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outcome of racing completion against the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Completed { exit_code: i64 },
    TimedOut,
}

/// Delivers termination signals to the governed process
#[async_trait]
pub trait Terminator: Send + Sync {
    async fn terminate(&self) -> Result<()>;
    async fn kill(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutGovernor {
    timeout: Duration,
    grace_period: Duration,
}

impl TimeoutGovernor {
    pub fn new(timeout: Duration, grace_period: Duration) -> Self {
        Self {
            timeout,
            grace_period,
        }
    }

    /// Wait for `completion` until the deadline measured from `started`.
    ///
    /// Returns the verdict together with the instant it was reached. Engine
    /// errors raised by `completion` before the deadline are propagated;
    /// anything it yields after the terminate signal is ignored.
    pub async fn govern<F, T>(
        &self,
        started: Instant,
        completion: F,
        terminator: &T,
    ) -> Result<(Verdict, Instant)>
    where
        F: Future<Output = Result<i64>>,
        T: Terminator + ?Sized,
    {
        tokio::pin!(completion);

        let deadline = tokio::time::sleep_until(started + self.timeout);

        tokio::select! {
            outcome = &mut completion => {
                let exit_code = outcome?;
                return Ok((Verdict::Completed { exit_code }, Instant::now()));
            }
            _ = deadline => {}
        }

        warn!("Execution exceeded {:?}, terminating", self.timeout);

        if let Err(e) = terminator.terminate().await {
            warn!("Failed to send terminate signal: {}", e);
        }

        match tokio::time::timeout(self.grace_period, &mut completion).await {
            Ok(_) => debug!("Process exited within grace period"),
            Err(_) => {
                warn!(
                    "Process ignored terminate for {:?}, killing",
                    self.grace_period
                );
                if let Err(e) = terminator.kill().await {
                    warn!("Failed to send kill signal: {}", e);
                }
            }
        }

        Ok((Verdict::TimedOut, Instant::now()))
    }
}
