//! Emulator process execution.
//!
//! `ProcessRunner` is the seam between dispatch logic and real processes.
//! `SystemRunner` spawns the emulator and polls it until it exits, the
//! optional wall-clock guard expires, or the batch is cancelled.

use std::process::{Child, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::common::error::DispatchFailure;
use crate::dispatch::invocation::EmulatorInvocation;
use crate::dispatch::pool::CancellationToken;

/// Runs one emulator invocation to completion.
pub trait ProcessRunner: Send + Sync {
    /// Runs `invocation` and returns its exit code.
    ///
    /// # Arguments
    ///
    /// * `invocation` - Command line to execute.
    /// * `limit` - Optional wall-clock limit after which the process is killed.
    /// * `cancel` - Batch cancellation token; a cancelled run is terminated.
    ///
    /// # Returns
    ///
    /// The process exit code (zero or not), or the reason no code was obtained.
    fn run(
        &self,
        invocation: &EmulatorInvocation,
        limit: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<i32, DispatchFailure>;
}

/// Spawns real OS processes.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    poll_interval: Duration,
    grace_period: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(500),
        }
    }
}

impl SystemRunner {
    /// Runner with default polling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how often a running child is polled.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn wait(
        &self,
        child: &mut Child,
        limit: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExitStatus, DispatchFailure> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    kill_and_reap(child);
                    return Err(DispatchFailure::Spawn(format!("wait failed: {e}")));
                }
            }
            if cancel.is_cancelled() {
                self.terminate(child);
                return Err(DispatchFailure::Cancelled);
            }
            if let Some(limit) = limit.filter(|limit| started.elapsed() > *limit) {
                kill_and_reap(child);
                return Err(DispatchFailure::TimedOut(limit.as_millis()));
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Asks the child to stop, then kills it if it outlives the grace period.
    fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Ok(pid) = libc::pid_t::try_from(child.id()) {
                // SAFETY: `pid` belongs to a child we own and have not reaped yet,
                // so it cannot have been recycled for an unrelated process.
                let _ = unsafe { libc::kill(pid, libc::SIGTERM) };
                let deadline = Instant::now() + self.grace_period;
                while Instant::now() < deadline {
                    if matches!(child.try_wait(), Ok(Some(_))) {
                        return;
                    }
                    thread::sleep(self.poll_interval);
                }
            }
        }
        kill_and_reap(child);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        invocation: &EmulatorInvocation,
        limit: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<i32, DispatchFailure> {
        if cancel.is_cancelled() {
            return Err(DispatchFailure::Cancelled);
        }
        debug!(cmd = %invocation.display(), "spawning emulator");
        let mut child = invocation
            .to_command()
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                DispatchFailure::Spawn(format!("{}: {e}", invocation.program().display()))
            })?;
        let status = self.wait(&mut child, limit, cancel)?;
        status.code().ok_or(DispatchFailure::Terminated)
    }
}
