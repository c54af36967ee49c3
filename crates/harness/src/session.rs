//! Run sessions.
//!
//! A session drives one manifest through the harness:
//!
//! ```text
//! Idle -> DirectoryReset -> Dispatching -> Verifying -> Done
//! ```
//!
//! States are never revisited; a `Session` value runs once. In
//! [`RunMode::List`] it goes straight from `Idle` to `Done` and only reports
//! the matching names.

use tracing::{debug, info};

use crate::common::error::{DispatchFailure, HarnessError, Result};
use crate::config::BuildVariant;
use crate::dispatch::{EmulationDispatcher, ProcessRunner, RunOutcome, SystemRunner};
use crate::manifest::{GlobPattern, TestManifest};
use crate::verify::TraceVerifier;

/// Process exit code for setup failures (missing inputs, unreadable manifest).
pub const SETUP_FAILURE_EXIT_CODE: i32 = 2;

/// What a session does with the selected cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Print the matching names; nothing is reset, run or verified.
    List,
    /// Reset traces, run every runnable case and verify.
    Run,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not started.
    #[default]
    Idle,
    /// Clearing the trace directory.
    DirectoryReset,
    /// Emulator runs in flight.
    Dispatching,
    /// Oracle running.
    Verifying,
    /// Finished; the session cannot be reused.
    Done,
}

/// Aggregated result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    /// Number of cases dispatched.
    pub ran_count: usize,
    /// Cases selected by the pattern but marked `skip`, in manifest order.
    pub skipped_names: Vec<String>,
    /// One outcome per dispatched case.
    pub outcomes: Vec<RunOutcome>,
    /// Oracle exit code; `None` when the session has no verifier.
    pub verifier_exit_code: Option<i32>,
}

impl SessionResult {
    /// Outcomes that did not exit cleanly.
    pub fn dispatch_failures(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Process exit code for the session.
    ///
    /// The oracle's code when verification ran. Without a verifier, the first
    /// failing emulator's code (1 if it produced none), or 0.
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.verifier_exit_code {
            return code;
        }
        self.dispatch_failures()
            .next()
            .map_or(0, |outcome| match outcome.failure {
                Some(DispatchFailure::NonZeroExit(code)) => code,
                _ => 1,
            })
    }
}

/// What a finished session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReport {
    /// Names matched in list mode.
    Listed(Vec<String>),
    /// Result of a run.
    Completed(SessionResult),
}

/// Single-use driver over one dispatcher and an optional verifier.
#[derive(Debug)]
pub struct Session<R: ProcessRunner = SystemRunner> {
    dispatcher: EmulationDispatcher<R>,
    verifier: Option<TraceVerifier>,
    state: SessionState,
}

impl<R: ProcessRunner> Session<R> {
    /// Session that verifies traces with `verifier`.
    pub const fn new(dispatcher: EmulationDispatcher<R>, verifier: TraceVerifier) -> Self {
        Self {
            dispatcher,
            verifier: Some(verifier),
            state: SessionState::Idle,
        }
    }

    /// Session that only dispatches; its exit code comes from the emulator.
    pub const fn without_verifier(dispatcher: EmulationDispatcher<R>) -> Self {
        Self {
            dispatcher,
            verifier: None,
            state: SessionState::Idle,
        }
    }

    /// Current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The dispatcher this session drives.
    pub const fn dispatcher(&self) -> &EmulationDispatcher<R> {
        &self.dispatcher
    }

    fn advance(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session transition");
        self.state = next;
    }

    /// Runs the session to completion.
    ///
    /// # Arguments
    ///
    /// * `manifest` - Loaded test manifest.
    /// * `pattern` - Name filter; skipped cases that match are reported, not run.
    /// * `mode` - List names or run them.
    /// * `variant` - Emulator and oracle build to use.
    ///
    /// # Errors
    ///
    /// * `Setup` if the session has already been executed.
    /// * `Io` if the trace directory cannot be reset; no emulator is started.
    /// * `Verifier` if the oracle cannot be started.
    ///
    /// Emulator failures are not errors; they are recorded on the result.
    pub fn execute(
        &mut self,
        manifest: &TestManifest,
        pattern: &GlobPattern,
        mode: RunMode,
        variant: BuildVariant,
    ) -> Result<SessionReport> {
        if self.state != SessionState::Idle {
            return Err(HarnessError::Setup(format!(
                "session already executed (state {:?})",
                self.state
            )));
        }

        if mode == RunMode::List {
            let names = manifest
                .matching_names(pattern)
                .into_iter()
                .map(str::to_string)
                .collect();
            self.advance(SessionState::Done);
            return Ok(SessionReport::Listed(names));
        }

        let partition = manifest.filter(pattern);
        info!(
            pattern = %pattern,
            runnable = partition.runnable.len(),
            skipped = partition.skipped.len(),
            "session start"
        );

        self.advance(SessionState::DirectoryReset);
        if let Some(trace) = &self.dispatcher.plan().trace {
            trace.reset()?;
        }

        self.advance(SessionState::Dispatching);
        let outcomes = self.dispatcher.run(&partition.runnable, variant);

        self.advance(SessionState::Verifying);
        let verifier_exit_code = match &self.verifier {
            Some(verifier) => {
                let index_paths: Vec<_> =
                    self.dispatcher.plan().index_paths(&partition.runnable).collect();
                Some(verifier.verify(&index_paths)?)
            }
            None => None,
        };

        self.advance(SessionState::Done);
        Ok(SessionReport::Completed(SessionResult {
            ran_count: outcomes.len(),
            skipped_names: partition.skipped_names(),
            outcomes,
            verifier_exit_code,
        }))
    }
}
