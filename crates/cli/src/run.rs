//! `rvconform run` subcommands.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::Subcommand;
use tracing::info;

use rvconform_core::common::GuestAddr;
use rvconform_core::config::{BuildVariant, PlatformConfig, defaults, require_dir};
use rvconform_core::dispatch::{
    CancellationToken, CasePlan, DispatchOptions, DumpChannels, EmulationDispatcher, ImageSource,
    LoadSpec, TaskGroup,
};
use rvconform_core::image::ImageSet;
use rvconform_core::manifest::{GlobPattern, TestCase, TestManifest, Xlen};
use rvconform_core::session::{RunMode, Session, SessionReport, SessionResult};
use rvconform_core::trace::TraceLayout;
use rvconform_core::verify::TraceVerifier;
use rvconform_core::{HarnessError, Result};

#[derive(Subcommand, Debug)]
pub enum RunCommand {
    /// Run riscv-tests programs and verify their traces.
    RiscvTests {
        /// Test list (JSON manifest).
        #[arg(short = 'i', long = "input")]
        manifest: PathBuf,

        /// Only run tests whose name matches this glob.
        #[arg(short = 'f', long)]
        filter: Option<String>,

        /// List matching test names and exit.
        #[arg(short = 'l', long = "list")]
        list: bool,

        /// Use the Debug build of the emulator and oracle.
        #[arg(short = 'd', long)]
        debug: bool,

        /// Parallel emulator processes (default: one per CPU).
        #[arg(short = 'j', long)]
        jobs: Option<NonZeroUsize>,

        /// Kill any emulator still running after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Boot Linux from the prebuilt images.
    Linux {
        /// Emulation cycle budget.
        #[arg(short = 'c', long)]
        cycle: Option<u64>,

        /// Use the Debug build of the emulator.
        #[arg(short = 'd', long)]
        debug: bool,

        /// Write a trace.
        #[arg(long)]
        dump: bool,

        /// Skip tracing for the first N cycles.
        #[arg(long, default_value_t = 0)]
        dump_skip_cycle: u64,

        /// Dump CSRs.
        #[arg(long)]
        enable_dump_csr: bool,

        /// Dump floating-point registers.
        #[arg(long)]
        enable_dump_fp_reg: bool,

        /// Dump integer registers.
        #[arg(long)]
        enable_dump_int_reg: bool,

        /// Dump memory.
        #[arg(long)]
        enable_dump_memory: bool,

        /// Wait for a remote debugger on this port.
        #[arg(long)]
        gdb: Option<u16>,
    },

    /// Run prepared Zephyr samples.
    Zephyr {
        /// Emulation cycle budget.
        #[arg(short = 'c', long)]
        cycle: Option<u64>,

        /// Use the Debug build of the emulator.
        #[arg(short = 'd', long)]
        debug: bool,

        /// Sample names (default: the configured samples).
        #[arg(long = "sample")]
        samples: Vec<String>,
    },
}

pub fn execute(config: &PlatformConfig, cmd: RunCommand) -> Result<i32> {
    match cmd {
        RunCommand::RiscvTests {
            manifest,
            filter,
            list,
            debug,
            jobs,
            timeout,
        } => {
            let options = DispatchOptions {
                pool: jobs.map_or_else(TaskGroup::default, TaskGroup::new),
                wall_clock_limit: timeout.map(Duration::from_secs),
                cancel: CancellationToken::new(),
            };
            let mode = if list { RunMode::List } else { RunMode::Run };
            run_riscv_tests(config, &manifest, filter.as_deref(), mode, debug, options)
        }
        RunCommand::Linux {
            cycle,
            debug,
            dump,
            dump_skip_cycle,
            enable_dump_csr,
            enable_dump_fp_reg,
            enable_dump_int_reg,
            enable_dump_memory,
            gdb,
        } => {
            let channels = DumpChannels {
                csr: enable_dump_csr,
                fp_reg: enable_dump_fp_reg,
                int_reg: enable_dump_int_reg,
                memory: enable_dump_memory,
            };
            let linux = LinuxRun {
                cycle: cycle.unwrap_or(config.linux.cycles),
                dump,
                dump_skip_cycle,
                channels,
                gdb,
            };
            run_linux(config, &linux, BuildVariant::from_debug_flag(debug))
        }
        RunCommand::Zephyr {
            cycle,
            debug,
            samples,
        } => run_zephyr(
            config,
            cycle.unwrap_or(config.zephyr.cycles),
            samples,
            BuildVariant::from_debug_flag(debug),
        ),
    }
}

fn run_riscv_tests(
    config: &PlatformConfig,
    manifest: &std::path::Path,
    filter: Option<&str>,
    mode: RunMode,
    debug: bool,
    options: DispatchOptions,
) -> Result<i32> {
    let variant = BuildVariant::from_debug_flag(debug);
    let manifest = TestManifest::load(manifest)?;
    let pattern = filter.map_or_else(GlobPattern::any, GlobPattern::new);

    let settings = &config.riscv_tests;
    let mut plan = CasePlan::new(
        ImageSource::PerCase {
            dir: config.resolve(&settings.binary_dir),
            load_addr: GuestAddr(settings.load_addr),
        },
        GuestAddr(settings.start_pc),
        TraceLayout::new(config.resolve(&settings.trace_dir)),
    );
    plan.channels = DumpChannels::isa_tests();

    let dispatcher = EmulationDispatcher::new(config.clone(), plan).with_options(options);
    let mut session = Session::new(dispatcher, TraceVerifier::from_config(config, variant));
    finish(session.execute(&manifest, &pattern, mode, variant)?)
}

#[derive(Debug)]
struct LinuxRun {
    cycle: u64,
    dump: bool,
    dump_skip_cycle: u64,
    channels: DumpChannels,
    gdb: Option<u16>,
}

fn run_linux(config: &PlatformConfig, run: &LinuxRun, variant: BuildVariant) -> Result<i32> {
    let dir = require_dir(&config.resolve(&config.linux.binary_dir), "Linux prebuilt binary")?;
    let loads = vec![
        LoadSpec::new(dir.join("linux-boot-rom.bin"), defaults::BOOT_ROM_BASE),
        LoadSpec::new(dir.join("bbl.bin"), defaults::RAM_BASE),
        LoadSpec::new(dir.join("vmlinux.bin"), defaults::KERNEL_BASE),
        LoadSpec::new(dir.join("initramfs.cpio.gz"), defaults::INITRAMFS_BASE),
    ];

    let mut plan = CasePlan::new(
        ImageSource::Fixed(loads),
        GuestAddr(defaults::BOOT_ROM_BASE),
        TraceLayout::new(config.resolve(&config.linux.trace_dir)),
    );
    if !run.dump {
        plan.trace = None;
    }
    plan.dump_skip_cycle = run.dump_skip_cycle;
    plan.channels = run.channels;
    plan.ram_size = Some(config.linux.ram_size);
    plan.gdb_port = run.gdb;

    let manifest = TestManifest::from_cases(vec![TestCase::new("linux", run.cycle, Xlen::Rv64)])?;
    let dispatcher = EmulationDispatcher::new(config.clone(), plan);
    let mut session = Session::without_verifier(dispatcher);
    finish(session.execute(&manifest, &GlobPattern::any(), RunMode::Run, variant)?)
}

fn run_zephyr(
    config: &PlatformConfig,
    cycle: u64,
    samples: Vec<String>,
    variant: BuildVariant,
) -> Result<i32> {
    let set = ImageSet::open_verified(&config.resolve(&config.zephyr.binary_dir))?;
    let samples = if samples.is_empty() {
        config.zephyr.samples.clone()
    } else {
        samples
    };
    if let Some(missing) = samples.iter().find(|s| set.entries_for(s).next().is_none()) {
        return Err(HarnessError::Setup(format!(
            "sample '{missing}' is not in the prepared image set; run `rvconform prepare zephyr`"
        )));
    }

    let cases = samples
        .into_iter()
        .map(|name| TestCase::new(name, cycle, Xlen::Rv32))
        .collect();
    let manifest = TestManifest::from_cases(cases)?;
    let plan = CasePlan::new(
        ImageSource::ImageSet(set),
        GuestAddr(defaults::RTOS_ROM_BASE),
        TraceLayout::new(config.resolve(&config.zephyr.trace_dir)),
    );
    let dispatcher = EmulationDispatcher::new(config.clone(), plan);
    let mut session = Session::without_verifier(dispatcher);
    finish(session.execute(&manifest, &GlobPattern::any(), RunMode::Run, variant)?)
}

fn finish(report: SessionReport) -> Result<i32> {
    match report {
        SessionReport::Listed(names) => {
            for name in names {
                println!("{name}");
            }
            Ok(0)
        }
        SessionReport::Completed(result) => {
            print_summary(&result);
            Ok(result.exit_code())
        }
    }
}

fn print_summary(result: &SessionResult) {
    let failed: Vec<_> = result.dispatch_failures().collect();
    info!(
        ran = result.ran_count,
        failed = failed.len(),
        skipped = result.skipped_names.len(),
        "run finished"
    );
    for outcome in &failed {
        if let Some(failure) = &outcome.failure {
            println!("[FAIL] {}: {failure}", outcome.name);
        }
    }
    if let Some(code) = result.verifier_exit_code {
        println!("Verifier exit code: {code}");
    }
    if !result.skipped_names.is_empty() {
        println!("Skipped tests:");
        for name in &result.skipped_names {
            println!("  {name}");
        }
    }
}
