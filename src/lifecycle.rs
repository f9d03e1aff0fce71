//! Waiting on, querying and terminating processes.

use crate::codec::Codec;
use crate::error::{ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER};
use crate::ffi::Kernel32;
use crate::ffi::kernel32::{
    INFINITE, PROCESS_ALL_ACCESS, PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION,
    STILL_ACTIVE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use crate::handle::{OwnedHandle, ProcessHandle, PseudoHandle};
use crate::layout::{StructKind, exit_code};
use crate::memory::Arena;
use crate::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long [`Lifecycle::wait_for`] may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Millis(u32),
    Infinite,
}

impl Timeout {
    /// Check once, never block.
    pub const IMMEDIATE: Timeout = Timeout::Millis(0);

    /// Saturates just below the platform's infinite sentinel.
    pub fn from_duration(duration: Duration) -> Self {
        let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        Timeout::Millis(millis.min(INFINITE - 1))
    }

    /// Value passed to `WaitForSingleObject`.
    pub fn as_raw(&self) -> u32 {
        match self {
            Timeout::Millis(ms) => (*ms).min(INFINITE - 1),
            Timeout::Infinite => INFINITE,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
    /// The wait failed. Carries the platform error code, or the raw wait result when it was
    /// neither a success nor a documented failure.
    Error(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Running,
    Exited(u32),
}

impl ProcessExit {
    pub fn code(&self) -> Option<u32> {
        match self {
            ProcessExit::Running => None,
            ProcessExit::Exited(code) => Some(*code),
        }
    }
}

/// Settings for [`Lifecycle::poll_until_exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Sleep between two probes.
    pub interval: Duration,
    /// Total time after which polling gives up. `None` polls until the process exits.
    pub deadline: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Exited,
    TimedOut,
    Cancelled,
}

pub struct Lifecycle<'a> {
    api: &'a Kernel32<'a>,
    arena: Arena<'a>,
    codec: Codec,
}

impl<'a> Lifecycle<'a> {
    pub fn new(api: &'a Kernel32<'a>, arena: Arena<'a>) -> Self {
        Self {
            api,
            arena,
            codec: Codec::new(api.profile()),
        }
    }

    /// Blocks until `handle` is signaled or `timeout` elapses.
    pub fn wait_for(&self, handle: &impl ProcessHandle, timeout: Timeout) -> Result<WaitOutcome> {
        let raw = handle.raw_handle();
        debug!("Waiting on 0x{raw:x} with timeout {timeout:?}");
        let outcome = match self.api.wait_for_single_object(raw, timeout.as_raw())? {
            WAIT_OBJECT_0 => WaitOutcome::Signaled,
            WAIT_TIMEOUT => WaitOutcome::TimedOut,
            WAIT_FAILED => WaitOutcome::Error(self.api.last_error_or_zero()),
            other => {
                warn!("Unexpected wait result 0x{other:x} for 0x{raw:x}");
                WaitOutcome::Error(other)
            }
        };
        Ok(outcome)
    }

    pub fn exit_code(&self, handle: &impl ProcessHandle) -> Result<ProcessExit> {
        let layout = self.api.profile().layout(StructKind::ExitCode);
        let cell = self.arena.allocate_for(layout)?;

        if !self
            .api
            .get_exit_code_process(handle.raw_handle(), cell.address())?
        {
            let code = self.api.last_error_or_zero();
            return Err(Error::Platform {
                operation: "GetExitCodeProcess",
                code,
            });
        }

        let value = self
            .codec
            .read_u32(&cell, layout.offset_of(exit_code::VALUE))?;
        Ok(if value == STILL_ACTIVE {
            ProcessExit::Running
        } else {
            ProcessExit::Exited(value)
        })
    }

    /// Asks the platform to end the process. Failures are logged and reported as `false`.
    pub fn terminate(&self, handle: &impl ProcessHandle, exit_code: u32) -> bool {
        let raw = handle.raw_handle();
        match self.api.terminate_process(raw, exit_code) {
            Ok(true) => {
                info!("Terminated 0x{raw:x} with exit code {exit_code}");
                true
            }
            Ok(false) => {
                warn!(
                    "TerminateProcess(0x{raw:x}) failed (error {})",
                    self.api.last_error_or_zero()
                );
                false
            }
            Err(e) => {
                warn!("TerminateProcess(0x{raw:x}) failed: {e}");
                false
            }
        }
    }

    /// Closes `handle`. Closing an already closed handle does nothing.
    pub fn close(&self, handle: &mut OwnedHandle<'_>) -> bool {
        let raw = handle.raw();
        handle.close().unwrap_or_else(|e| {
            warn!("Failed to close 0x{raw:x}: {e}");
            false
        })
    }

    /// Waits, then collects the exit code if the process finished.
    pub fn wait_and_collect(
        &self,
        handle: &impl ProcessHandle,
        timeout: Timeout,
    ) -> Result<(WaitOutcome, Option<u32>)> {
        let outcome = self.wait_for(handle, timeout)?;
        let code = match outcome {
            WaitOutcome::Signaled => self.exit_code(handle)?.code(),
            WaitOutcome::TimedOut | WaitOutcome::Error(_) => None,
        };
        Ok((outcome, code))
    }

    pub fn current_process(&self) -> Result<PseudoHandle> {
        Ok(PseudoHandle(self.api.current_process()?))
    }

    pub fn current_pid(&self) -> Result<u32> {
        self.api.current_process_id()
    }

    pub fn pid_of(&self, handle: &impl ProcessHandle) -> Result<u32> {
        match self.api.process_id(handle.raw_handle())? {
            0 => Err(Error::Platform {
                operation: "GetProcessId",
                code: self.api.last_error_or_zero(),
            }),
            pid => Ok(pid),
        }
    }

    /// PID of the calling process, read back through a real handle.
    ///
    /// `GetProcessId` on the pseudo-handle is not reliable everywhere, so this opens the
    /// process by id first and falls back to `GetCurrentProcessId` when that fails.
    pub fn pid_of_current(&self) -> Result<u32> {
        let pid = self.current_pid()?;
        let Some(mut handle) = self.open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)? else {
            debug!("Could not open own process {pid}, using GetCurrentProcessId");
            return Ok(pid);
        };
        let from_handle = self.pid_of(&handle);
        self.close(&mut handle);
        match from_handle {
            Ok(from_handle) => {
                if from_handle != pid {
                    warn!("GetProcessId returned {from_handle}, expected {pid}");
                }
                Ok(from_handle)
            }
            Err(e) => {
                debug!("GetProcessId failed ({e}), using GetCurrentProcessId");
                Ok(pid)
            }
        }
    }

    /// Opens `pid` with `access`. `None` when the platform refuses.
    pub fn open_process(&self, pid: u32, access: u32) -> Result<Option<OwnedHandle<'a>>> {
        Ok(self.try_open(pid, access)?.ok())
    }

    /// Like [`Lifecycle::open_process`], but keeps the error code of a refused open.
    fn try_open(
        &self,
        pid: u32,
        access: u32,
    ) -> Result<std::result::Result<OwnedHandle<'a>, u32>> {
        let raw = self.api.open_process(access, false, pid)?;
        Ok(match OwnedHandle::from_raw(self.api, raw) {
            Some(handle) => {
                debug!("Opened pid {pid} as {handle:?} (access 0x{access:x})");
                Ok(handle)
            }
            None => {
                let code = self.api.last_error_or_zero();
                debug!("OpenProcess({pid}, 0x{access:x}) failed (error {code})");
                Err(code)
            }
        })
    }

    /// Opens `pid` with full access, or query access when full access is denied.
    pub fn open_for_monitoring(&self, pid: u32) -> Result<Option<OwnedHandle<'a>>> {
        if let Some(handle) = self.open_process(pid, PROCESS_ALL_ACCESS)? {
            return Ok(Some(handle));
        }
        self.open_process(pid, PROCESS_QUERY_INFORMATION)
    }

    /// Liveness probe: whether `pid` still exists and has not reported an exit code.
    ///
    /// Only an open refused with `ERROR_INVALID_PARAMETER` means the pid is gone. A process
    /// that denies access is still running. Any other refusal is an error.
    pub fn is_alive(&self, pid: u32) -> Result<bool> {
        let mut handle = match self.try_open(pid, PROCESS_QUERY_LIMITED_INFORMATION)? {
            Ok(handle) => handle,
            Err(ERROR_INVALID_PARAMETER) => return Ok(false),
            Err(ERROR_ACCESS_DENIED) => {
                trace!("Pid {pid} denies query access, assuming it is running");
                return Ok(true);
            }
            Err(code) => {
                return Err(Error::Platform {
                    operation: "OpenProcess",
                    code,
                });
            }
        };
        let alive = match self.exit_code(&handle) {
            Ok(exit) => exit == ProcessExit::Running,
            // The process could be opened, which is all the probe can tell.
            Err(e) => {
                trace!("Exit code of {pid} unavailable: {e}");
                true
            }
        };
        self.close(&mut handle);
        Ok(alive)
    }

    /// Repeats [`Lifecycle::is_alive`] until the process is gone.
    ///
    /// Sleeps `options.interval` between probes. `cancel` is checked before every probe.
    pub fn poll_until_exit(
        &self,
        pid: u32,
        options: &PollOptions,
        cancel: Option<&AtomicBool>,
    ) -> Result<PollOutcome> {
        let start = Instant::now();
        let mut probes = 0usize;
        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                debug!("Polling of pid {pid} cancelled after {probes} probes");
                return Ok(PollOutcome::Cancelled);
            }

            probes += 1;
            if !self.is_alive(pid)? {
                debug!("Pid {pid} exited, observed after {probes} probes");
                return Ok(PollOutcome::Exited);
            }

            if let Some(deadline) = options.deadline {
                let elapsed = start.elapsed();
                if elapsed >= deadline {
                    warn!("Pid {pid} still running after {elapsed:?}");
                    return Ok(PollOutcome::TimedOut);
                }
                std::thread::sleep(options.interval.min(deadline - elapsed));
            } else {
                std::thread::sleep(options.interval);
            }
        }
    }
}
