//! Parallel emulator dispatch.
//!
//! This module runs one emulator process per test case. It provides:
//! 1. **Contract:** `EmulatorInvocation`, the typed emulator command line.
//! 2. **Plans:** `CasePlan`, which maps a case onto images, PC and trace paths.
//! 3. **Pool:** `TaskGroup`, a bounded worker group with a join barrier.
//! 4. **Runners:** `ProcessRunner`/`SystemRunner`, with optional wall-clock guard and cancellation.
//!
//! Dispatch is fail-soft: a failing case is recorded on its outcome and never
//! stops its siblings. `run` returns only after every case has finished.

/// Emulator command-line contract.
pub mod invocation;
/// Case-to-invocation plans.
pub mod plan;
/// Bounded worker pool and cancellation.
pub mod pool;
/// Process execution.
pub mod runner;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::common::error::DispatchFailure;
use crate::config::{BuildVariant, PlatformConfig};
use crate::manifest::TestCase;

pub use invocation::{DumpChannels, EmulatorInvocation, LoadSpec};
pub use plan::{CasePlan, ImageSource};
pub use pool::{CancellationToken, TaskGroup};
pub use runner::{ProcessRunner, SystemRunner};

/// Result of one emulator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Case name.
    pub name: String,
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Why the run did not succeed, if it did not.
    pub failure: Option<DispatchFailure>,
}

impl RunOutcome {
    fn from_result(name: &str, result: Result<i32, DispatchFailure>) -> Self {
        match result {
            Ok(0) => Self {
                name: name.to_string(),
                exit_code: Some(0),
                failure: None,
            },
            Ok(code) => Self {
                name: name.to_string(),
                exit_code: Some(code),
                failure: Some(DispatchFailure::NonZeroExit(code)),
            },
            Err(failure) => Self {
                name: name.to_string(),
                exit_code: None,
                failure: Some(failure),
            },
        }
    }

    /// Returns `true` if the emulator exited with status 0.
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Tunables for a dispatch batch.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Worker pool; defaults to one worker per processing unit.
    pub pool: TaskGroup,
    /// Per-invocation wall-clock limit; `None` relies on the cycle budget alone.
    pub wall_clock_limit: Option<Duration>,
    /// Cancellation token observed before and during every run.
    pub cancel: CancellationToken,
}

/// Runs batches of test cases on the emulator.
#[derive(Debug)]
pub struct EmulationDispatcher<R: ProcessRunner = SystemRunner> {
    config: PlatformConfig,
    plan: CasePlan,
    options: DispatchOptions,
    runner: R,
}

impl EmulationDispatcher<SystemRunner> {
    /// Dispatcher spawning real processes.
    pub fn new(config: PlatformConfig, plan: CasePlan) -> Self {
        Self::with_runner(config, plan, SystemRunner::default())
    }
}

impl<R: ProcessRunner> EmulationDispatcher<R> {
    /// Dispatcher using a custom process runner.
    pub fn with_runner(config: PlatformConfig, plan: CasePlan, runner: R) -> Self {
        Self {
            config,
            plan,
            options: DispatchOptions::default(),
            runner,
        }
    }

    /// Replaces the batch options.
    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// The plan cases are translated with.
    pub const fn plan(&self) -> &CasePlan {
        &self.plan
    }

    /// The batch options.
    pub const fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Emulator executable used for `variant`.
    pub fn emulator_path(&self, variant: BuildVariant) -> PathBuf {
        self.config.emulator_path(variant)
    }

    /// Runs every case and waits for all of them.
    ///
    /// # Arguments
    ///
    /// * `cases` - Cases to run; skip markers are not consulted here.
    /// * `variant` - Emulator build to invoke; stamped onto each case.
    ///
    /// # Returns
    ///
    /// One outcome per case, in the order of `cases`.
    pub fn run(&self, cases: &[TestCase], variant: BuildVariant) -> Vec<RunOutcome> {
        let emulator = self.emulator_path(variant);
        let stamped: Vec<TestCase> = cases
            .iter()
            .cloned()
            .map(|mut case| {
                case.build_variant = Some(variant);
                case
            })
            .collect();

        info!(
            cases = stamped.len(),
            workers = self.options.pool.workers(),
            emulator = %emulator.display(),
            "dispatching batch"
        );

        let outcomes = self.options.pool.run(&stamped, |case| {
            if self.options.cancel.is_cancelled() {
                return RunOutcome::from_result(&case.name, Err(DispatchFailure::Cancelled));
            }
            let invocation = self.plan.invocation(&emulator, case);
            info!(case = %case.name, "run {}", invocation.display());
            let result =
                self.runner
                    .run(&invocation, self.options.wall_clock_limit, &self.options.cancel);
            let outcome = RunOutcome::from_result(&case.name, result);
            if let Some(failure) = &outcome.failure {
                warn!(case = %case.name, %failure, "dispatch failure");
            }
            outcome
        });

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(ran = outcomes.len(), failed, "batch finished");
        outcomes
    }
}
