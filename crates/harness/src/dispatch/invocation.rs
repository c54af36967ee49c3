//! Emulator command-line contract.
//!
//! `EmulatorInvocation` is the typed form of one `rafi-emu` command line. The
//! emulator parses addresses as base-16, so every address is rendered through
//! [`GuestAddr`]'s `0x…` form.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::common::addr::GuestAddr;
use crate::manifest::Xlen;

/// A flat image and the guest address it is loaded at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Image file.
    pub path: PathBuf,
    /// Guest load address.
    pub addr: GuestAddr,
}

impl LoadSpec {
    /// Creates a load directive.
    pub fn new(path: impl Into<PathBuf>, addr: impl Into<GuestAddr>) -> Self {
        Self {
            path: path.into(),
            addr: addr.into(),
        }
    }

    /// Renders the `PATH:ADDR` argument.
    pub fn to_arg(&self) -> OsString {
        let mut arg = self.path.as_os_str().to_os_string();
        arg.push(format!(":{}", self.addr));
        arg
    }
}

/// Supplemental trace channels; each maps to one `--enable-dump-*` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DumpChannels {
    /// Control/status registers.
    pub csr: bool,
    /// Floating-point registers.
    pub fp_reg: bool,
    /// Integer registers.
    pub int_reg: bool,
    /// Memory contents.
    pub memory: bool,
}

impl DumpChannels {
    /// Channels used by bare-metal ISA test runs.
    pub const fn isa_tests() -> Self {
        Self {
            csr: false,
            fp_reg: true,
            int_reg: false,
            memory: false,
        }
    }

    fn flags(self) -> impl Iterator<Item = &'static str> {
        [
            (self.csr, "--enable-dump-csr"),
            (self.fp_reg, "--enable-dump-fp-reg"),
            (self.int_reg, "--enable-dump-int-reg"),
            (self.memory, "--enable-dump-memory"),
        ]
        .into_iter()
        .filter_map(|(on, flag)| on.then_some(flag))
    }
}

/// One emulator command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorInvocation {
    /// Emulator executable.
    pub program: PathBuf,
    /// Cycle budget.
    pub cycle: u64,
    /// Images to load, in order.
    pub loads: Vec<LoadSpec>,
    /// Initial program counter.
    pub pc: Option<GuestAddr>,
    /// Register width.
    pub xlen: Option<Xlen>,
    /// Host I/O polling address.
    pub host_io_addr: Option<GuestAddr>,
    /// Trace output path base.
    pub dump_path: Option<PathBuf>,
    /// Cycles to run before dumping starts.
    pub dump_skip_cycle: u64,
    /// Supplemental dump channels.
    pub channels: DumpChannels,
    /// Guest RAM size in bytes.
    pub ram_size: Option<u64>,
    /// Remote debugger port.
    pub gdb_port: Option<u16>,
}

impl EmulatorInvocation {
    /// Starts an invocation of `program` with a cycle budget.
    pub fn new(program: impl Into<PathBuf>, cycle: u64) -> Self {
        Self {
            program: program.into(),
            cycle,
            loads: Vec::new(),
            pc: None,
            xlen: None,
            host_io_addr: None,
            dump_path: None,
            dump_skip_cycle: 0,
            channels: DumpChannels::default(),
            ram_size: None,
            gdb_port: None,
        }
    }

    /// Adds an image load.
    #[must_use]
    pub fn load(mut self, spec: LoadSpec) -> Self {
        self.loads.push(spec);
        self
    }

    /// Sets the initial program counter.
    #[must_use]
    pub const fn pc(mut self, pc: GuestAddr) -> Self {
        self.pc = Some(pc);
        self
    }

    /// Sets the register width.
    #[must_use]
    pub const fn xlen(mut self, xlen: Xlen) -> Self {
        self.xlen = Some(xlen);
        self
    }

    /// Sets the host I/O polling address.
    #[must_use]
    pub const fn host_io_addr(mut self, addr: Option<GuestAddr>) -> Self {
        self.host_io_addr = addr;
        self
    }

    /// Enables tracing to `path`.
    #[must_use]
    pub fn dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }

    /// Skips tracing for the first `cycles` cycles.
    #[must_use]
    pub const fn dump_skip_cycle(mut self, cycles: u64) -> Self {
        self.dump_skip_cycle = cycles;
        self
    }

    /// Selects the supplemental dump channels.
    #[must_use]
    pub const fn channels(mut self, channels: DumpChannels) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the guest RAM size.
    #[must_use]
    pub const fn ram_size(mut self, bytes: Option<u64>) -> Self {
        self.ram_size = bytes;
        self
    }

    /// Attaches a remote debugger port.
    #[must_use]
    pub const fn gdb_port(mut self, port: Option<u16>) -> Self {
        self.gdb_port = port;
        self
    }

    /// Emulator executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Renders the argument vector (without the program).
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--cycle".into(), self.cycle.to_string().into()];
        for load in &self.loads {
            args.push("--load".into());
            args.push(load.to_arg());
        }
        if let Some(ram_size) = self.ram_size {
            args.push("--ram-size".into());
            args.push(ram_size.to_string().into());
        }
        if let Some(pc) = self.pc {
            args.push("--pc".into());
            args.push(pc.to_string().into());
        }
        if let Some(xlen) = self.xlen {
            args.push("--xlen".into());
            args.push(xlen.to_string().into());
        }
        if let Some(addr) = self.host_io_addr {
            args.push("--host-io-addr".into());
            args.push(addr.to_string().into());
        }
        if let Some(path) = &self.dump_path {
            args.push("--dump-path".into());
            args.push(path.as_os_str().to_os_string());
            if self.dump_skip_cycle > 0 {
                args.push("--dump-skip-cycle".into());
                args.push(self.dump_skip_cycle.to_string().into());
            }
        }
        args.extend(self.channels.flags().map(OsString::from));
        if let Some(port) = self.gdb_port {
            args.push("--gdb".into());
            args.push(port.to_string().into());
        }
        args
    }

    /// Builds a `Command` ready to spawn.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        let _ = cmd.args(self.args());
        cmd
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str().to_os_string())
            .chain(self.args())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
