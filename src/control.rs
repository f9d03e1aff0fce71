//! Entry point tying the components to one foreign-call host.

use crate::arch::ArchitectureProfile;
use crate::config::ControlConfig;
use crate::ffi::{ForeignInvoker, Kernel32};
use crate::handle::ProcessHandle;
use crate::launcher::{LaunchRequest, LaunchResult, Launcher};
use crate::lifecycle::{Lifecycle, PollOutcome, Timeout, WaitOutcome};
use crate::memory::{Arena, MemoryAccess};
use crate::prelude::*;
use crate::snapshot::{ProcessSnapshotEntry, SnapshotReader};
use crate::system_info::SystemInfo;
use std::sync::atomic::AtomicBool;

/// Process introspection and control over a host's foreign-call and memory capabilities.
///
/// ```no_run
/// # fn host() -> (&'static dyn procscope::ffi::ForeignInvoker, &'static dyn procscope::memory::MemoryAccess) { unimplemented!() }
/// use procscope::{ControlConfig, LaunchRequest, ProcessControl, Timeout};
///
/// let (invoker, memory) = host();
/// let control = ProcessControl::new(invoker, memory, ControlConfig::default())?;
/// for entry in control.enumerate_all()? {
///     println!("{entry}");
/// }
/// let child = control.launch(&LaunchRequest::new("cmd.exe /c exit 3").no_window())?;
/// let (outcome, code) = control.wait_and_collect(&child.process, Timeout::Millis(5000))?;
/// # Ok::<(), procscope::Error>(())
/// ```
pub struct ProcessControl<'a> {
    api: Kernel32<'a>,
    arena: Arena<'a>,
    config: ControlConfig,
}

impl<'a> ProcessControl<'a> {
    /// Binds kernel32 for the architecture of the running process.
    pub fn new(
        invoker: &'a dyn ForeignInvoker,
        memory: &'a dyn MemoryAccess,
        config: ControlConfig,
    ) -> Result<Self> {
        Self::with_profile(invoker, memory, config, ArchitectureProfile::native())
    }

    pub fn with_profile(
        invoker: &'a dyn ForeignInvoker,
        memory: &'a dyn MemoryAccess,
        config: ControlConfig,
        profile: ArchitectureProfile,
    ) -> Result<Self> {
        let api = Kernel32::bind(invoker, profile)?;
        info!("Process control ready for {}", profile.name());
        Ok(Self {
            api,
            arena: Arena::new(memory),
            config,
        })
    }

    pub fn profile(&self) -> ArchitectureProfile {
        self.api.profile()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn api(&self) -> &Kernel32<'a> {
        &self.api
    }

    pub fn snapshots(&self) -> SnapshotReader<'_> {
        SnapshotReader::new(&self.api, self.arena, self.config.max_snapshot_entries)
    }

    pub fn launcher(&self) -> Launcher<'_> {
        Launcher::new(&self.api, self.arena)
    }

    pub fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(&self.api, self.arena)
    }

    pub fn enumerate_all(&self) -> Result<Vec<ProcessSnapshotEntry>> {
        self.snapshots().enumerate_all()
    }

    pub fn find_by_pid(&self, pid: u32) -> Result<Option<ProcessSnapshotEntry>> {
        self.snapshots().find_by_pid(pid)
    }

    pub fn find_by_name(&self, fragment: &str) -> Result<Vec<ProcessSnapshotEntry>> {
        self.snapshots().find_by_name(fragment)
    }

    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchResult<'_>> {
        self.launcher().launch(request)
    }

    pub fn wait_and_collect(
        &self,
        handle: &impl ProcessHandle,
        timeout: Timeout,
    ) -> Result<(WaitOutcome, Option<u32>)> {
        self.lifecycle().wait_and_collect(handle, timeout)
    }

    /// [`ProcessControl::wait_and_collect`] with the configured wait timeout.
    pub fn wait_and_collect_default(
        &self,
        handle: &impl ProcessHandle,
    ) -> Result<(WaitOutcome, Option<u32>)> {
        self.wait_and_collect(handle, self.config.wait_timeout)
    }

    /// Polls `pid` at the configured interval until it exits or `cancel` is raised.
    pub fn poll_until_exit(&self, pid: u32, cancel: Option<&AtomicBool>) -> Result<PollOutcome> {
        self.lifecycle()
            .poll_until_exit(pid, &self.config.poll_options(), cancel)
    }

    pub fn system_info(&self) -> Result<SystemInfo> {
        SystemInfo::query(&self.api, self.arena)
    }
}
