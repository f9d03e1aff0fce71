//! Process creation through `CreateProcessW`.

use crate::codec::Codec;
use crate::error::LaunchError;
use crate::ffi::Kernel32;
use crate::ffi::kernel32::CREATE_NO_WINDOW;
use crate::handle::OwnedHandle;
use crate::layout::{StructKind, process_information, startup_info};
use crate::memory::Arena;
use crate::prelude::*;

/// What to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub command_line: String,
    pub application_name: Option<String>,
    pub creation_flags: u32,
}

impl LaunchRequest {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            application_name: None,
            creation_flags: 0,
        }
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn creation_flags(mut self, flags: u32) -> Self {
        self.creation_flags = flags;
        self
    }

    /// Starts console programs without a window.
    pub fn no_window(self) -> Self {
        let flags = self.creation_flags | CREATE_NO_WINDOW;
        self.creation_flags(flags)
    }
}

/// A started process. Both handles are closed when this value is dropped.
#[derive(Debug)]
pub struct LaunchResult<'a> {
    pub process: OwnedHandle<'a>,
    pub thread: OwnedHandle<'a>,
    pub pid: u32,
    pub tid: u32,
}

impl LaunchResult<'_> {
    /// Closes both handles now, returning whether each close succeeded.
    pub fn close(mut self) -> Result<(bool, bool)> {
        let thread = self.thread.close()?;
        let process = self.process.close()?;
        Ok((process, thread))
    }
}

pub struct Launcher<'a> {
    api: &'a Kernel32<'a>,
    arena: Arena<'a>,
    codec: Codec,
}

impl<'a> Launcher<'a> {
    pub fn new(api: &'a Kernel32<'a>, arena: Arena<'a>) -> Self {
        Self {
            api,
            arena,
            codec: Codec::new(api.profile()),
        }
    }

    /// Starts `request`. Platform refusals come back as [`Error::Launch`].
    ///
    /// Both structure buffers are released before this returns, whatever the outcome.
    pub fn launch(&self, request: &LaunchRequest) -> Result<LaunchResult<'a>> {
        let profile = self.api.profile();
        let startup_layout = profile.layout(StructKind::StartupParameters);
        let result_layout = profile.layout(StructKind::CreationResult);

        let mut startup = self.arena.allocate_for(startup_layout)?;
        let mut result = self.arena.allocate_for(result_layout)?;

        self.codec.zero_fields(&mut startup, startup_layout)?;
        self.codec.zero_fields(&mut result, result_layout)?;
        self.codec.write_u32(
            &mut startup,
            startup_layout.offset_of(startup_info::CB),
            startup_layout.size as u32,
        )?;

        debug!(
            "Launching {:?} (application {:?}, flags 0x{:x})",
            request.command_line, request.application_name, request.creation_flags
        );
        let created = self.api.create_process(
            request.application_name.as_deref(),
            &request.command_line,
            false,
            request.creation_flags,
            startup.address(),
            result.address(),
        )?;
        if !created {
            let err = LaunchError::from_code(self.api.last_error()?);
            warn!("Failed to launch {:?}: {err}", request.command_line);
            return Err(err.into());
        }

        let process = self.codec.read_pointer(
            &result,
            result_layout.offset_of(process_information::PROCESS),
        )?;
        let thread = self.codec.read_pointer(
            &result,
            result_layout.offset_of(process_information::THREAD),
        )?;
        // Own the handles before any further read can fail.
        let process = OwnedHandle::from_raw(self.api, process);
        let thread = OwnedHandle::from_raw(self.api, thread);
        let pid = self
            .codec
            .read_u32(&result, result_layout.offset_of(process_information::PID))?;
        let tid = self
            .codec
            .read_u32(&result, result_layout.offset_of(process_information::TID))?;

        let (Some(process), Some(thread)) = (process, thread) else {
            return Err(Error::Platform {
                operation: "CreateProcessW",
                code: 0,
            });
        };
        info!("Launched pid {pid} (tid {tid})");
        Ok(LaunchResult {
            process,
            thread,
            pid,
            tid,
        })
    }
}
