//! Per-pipeline translation of test cases into emulator invocations.

use std::path::{Path, PathBuf};

use crate::common::addr::GuestAddr;
use crate::dispatch::invocation::{DumpChannels, EmulatorInvocation, LoadSpec};
use crate::image::assembler::ImageSet;
use crate::manifest::TestCase;
use crate::trace::TraceLayout;

/// Where a case's images come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `<dir>/<case name>.bin`, loaded at one address.
    PerCase {
        /// Image directory.
        dir: PathBuf,
        /// Load address of every image.
        load_addr: GuestAddr,
    },
    /// Entries of an assembled image set whose name equals the case name.
    ImageSet(ImageSet),
    /// The same loads for every case.
    Fixed(Vec<LoadSpec>),
}

impl ImageSource {
    fn loads_for(&self, case: &TestCase) -> Vec<LoadSpec> {
        match self {
            Self::PerCase { dir, load_addr } => {
                vec![LoadSpec::new(dir.join(format!("{}.bin", case.name)), *load_addr)]
            }
            Self::ImageSet(set) => set
                .entries_for(&case.name)
                .filter_map(|e| e.load_address.map(|addr| LoadSpec::new(&e.path, addr)))
                .collect(),
            Self::Fixed(loads) => loads.clone(),
        }
    }
}

/// Everything shared by the invocations of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePlan {
    /// Image source.
    pub images: ImageSource,
    /// Initial program counter.
    pub pc: GuestAddr,
    /// Trace directory layout; `None` disables tracing.
    pub trace: Option<TraceLayout>,
    /// Cycles to run before dumping starts.
    pub dump_skip_cycle: u64,
    /// Supplemental dump channels.
    pub channels: DumpChannels,
    /// Guest RAM size override.
    pub ram_size: Option<u64>,
    /// Remote debugger port.
    pub gdb_port: Option<u16>,
}

impl CasePlan {
    /// Plan with tracing into `trace` and no supplemental options.
    pub fn new(images: ImageSource, pc: GuestAddr, trace: TraceLayout) -> Self {
        Self {
            images,
            pc,
            trace: Some(trace),
            dump_skip_cycle: 0,
            channels: DumpChannels::default(),
            ram_size: None,
            gdb_port: None,
        }
    }

    /// Builds the command line for `case` against `emulator`.
    pub fn invocation(&self, emulator: &Path, case: &TestCase) -> EmulatorInvocation {
        let mut invocation = EmulatorInvocation::new(emulator, case.cycle);
        for load in self.images.loads_for(case) {
            invocation = invocation.load(load);
        }
        invocation = invocation
            .ram_size(self.ram_size)
            .pc(self.pc)
            .xlen(case.xlen)
            .host_io_addr(case.host_io_addr)
            .channels(self.channels)
            .gdb_port(self.gdb_port);
        if let Some(trace) = &self.trace {
            invocation = invocation
                .dump_path(trace.dump_path(&case.name))
                .dump_skip_cycle(self.dump_skip_cycle);
        }
        invocation
    }

    /// Trace index paths of `cases`, in the given order.
    pub fn index_paths<'a>(&'a self, cases: &'a [TestCase]) -> impl Iterator<Item = PathBuf> + 'a {
        self.trace
            .iter()
            .flat_map(move |trace| cases.iter().map(move |c| trace.index_path(&c.name)))
    }
}
