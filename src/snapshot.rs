//! Toolhelp process snapshots.
//!
//! [`SnapshotReader::entries`] opens a snapshot and walks it with `Process32FirstW` /
//! `Process32NextW`. The walk is bounded: it stops after `max_entries` entries even when the
//! platform reports more. The snapshot handle and the entry buffer are released as soon as the
//! walk ends, or when the iterator is dropped early.

use crate::codec::{Codec, UNKNOWN_NAME};
use crate::error::DecodeError;
use crate::ffi::Kernel32;
use crate::ffi::kernel32::TH32CS_SNAPPROCESS;
use crate::handle::OwnedHandle;
use crate::layout::{FieldLayout, StructKind, process_entry};
use crate::memory::{Arena, RawBuffer};
use crate::prelude::*;
use itertools::Itertools;
use std::fmt;

/// Upper bound on the number of entries a single walk yields.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// One decoded `PROCESSENTRY32W`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshotEntry {
    pub pid: u32,
    pub parent_pid: u32,
    pub thread_count: u32,
    pub exe_name: String,
}

impl fmt::Display for ProcessSnapshotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (pid {}, parent {}, {} threads)",
            self.exe_name, self.pid, self.parent_pid, self.thread_count
        )
    }
}

/// A decode problem recorded for one entry. The entry itself was still yielded, with
/// [`UNKNOWN_NAME`] as its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIssue {
    pub index: usize,
    pub pid: u32,
    pub error: DecodeError,
}

/// Where a walk currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotState {
    Created,
    /// Positioned on the entry with this zero-based index.
    Positioned(usize),
    Exhausted,
    Failed(String),
}

/// Result of a complete walk.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub entries: Vec<ProcessSnapshotEntry>,
    pub issues: Vec<EntryIssue>,
    /// The walk stopped at the entry bound instead of running out of entries.
    pub truncated: bool,
}

/// An open toolhelp snapshot handle.
#[derive(Debug)]
pub struct Snapshot<'a> {
    handle: OwnedHandle<'a>,
}

impl Snapshot<'_> {
    pub fn raw(&self) -> u64 {
        self.handle.raw()
    }

    pub fn close(mut self) -> Result<bool> {
        self.handle.close()
    }
}

pub struct SnapshotReader<'a> {
    api: &'a Kernel32<'a>,
    arena: Arena<'a>,
    codec: Codec,
    layout: &'static FieldLayout,
    max_entries: usize,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(api: &'a Kernel32<'a>, arena: Arena<'a>, max_entries: usize) -> Self {
        let profile = api.profile();
        Self {
            api,
            arena,
            codec: Codec::new(profile),
            layout: profile.layout(StructKind::ProcessSnapshotEntry),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Requests a snapshot of every running process.
    pub fn open(&self) -> Result<Snapshot<'a>> {
        let raw = self
            .api
            .create_toolhelp32_snapshot(TH32CS_SNAPPROCESS, 0)?;
        if raw == self.api.profile().invalid_handle() {
            let code = self.api.last_error_or_zero();
            warn!("CreateToolhelp32Snapshot failed (error {code})");
            return Err(Error::SnapshotCreationFailed { code });
        }
        let Some(handle) = OwnedHandle::from_raw(self.api, raw) else {
            let code = self.api.last_error_or_zero();
            warn!("CreateToolhelp32Snapshot returned a null handle (error {code})");
            return Err(Error::SnapshotCreationFailed { code });
        };
        debug!("Opened process snapshot 0x{raw:x}");
        Ok(Snapshot { handle })
    }

    /// Opens a snapshot and returns a bounded walk over it.
    pub fn entries(&self) -> Result<SnapshotEntries<'a>> {
        let snapshot = self.open()?;
        // On failure the snapshot is dropped, and closed, before the error propagates.
        let buffer = self.arena.allocate_for(self.layout)?;
        Ok(SnapshotEntries {
            api: self.api,
            codec: self.codec,
            layout: self.layout,
            max_entries: self.max_entries,
            snapshot: Some(snapshot),
            buffer: Some(buffer),
            state: SnapshotState::Created,
            yielded: 0,
            issues: Vec::new(),
            truncated: false,
        })
    }

    /// Walks the whole snapshot, keeping the recorded decode issues.
    pub fn enumerate(&self) -> Result<Enumeration> {
        let mut walk = self.entries()?;
        let entries = walk.by_ref().collect::<Result<Vec<_>>>()?;
        Ok(Enumeration {
            entries,
            issues: walk.take_issues(),
            truncated: walk.truncated(),
        })
    }

    pub fn enumerate_all(&self) -> Result<Vec<ProcessSnapshotEntry>> {
        Ok(self.enumerate()?.entries)
    }

    /// Linear scan for `pid`, stopping at the first match.
    pub fn find_by_pid(&self, pid: u32) -> Result<Option<ProcessSnapshotEntry>> {
        for entry in self.entries()? {
            let entry = entry?;
            if entry.pid == pid {
                return Ok(Some(entry));
            }
        }
        debug!("PID {pid} not found in snapshot");
        Ok(None)
    }

    /// Entries whose executable name contains `fragment`, ignoring case.
    pub fn find_by_name(&self, fragment: &str) -> Result<Vec<ProcessSnapshotEntry>> {
        let needle = fragment.to_lowercase();
        let matches = self
            .entries()?
            .filter_ok(|entry| entry.exe_name.to_lowercase().contains(&needle))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "{} process(es) match {fragment:?}: {}",
            matches.len(),
            matches.iter().map(|e| e.pid).join(", ")
        );
        Ok(matches)
    }
}

/// Iterator over the entries of one snapshot.
///
/// A failing platform call ends the walk: it is yielded once as an error, and the iterator then
/// stays in [`SnapshotState::Failed`].
pub struct SnapshotEntries<'a> {
    api: &'a Kernel32<'a>,
    codec: Codec,
    layout: &'static FieldLayout,
    max_entries: usize,
    snapshot: Option<Snapshot<'a>>,
    buffer: Option<RawBuffer<'a>>,
    state: SnapshotState,
    yielded: usize,
    issues: Vec<EntryIssue>,
    truncated: bool,
}

impl SnapshotEntries<'_> {
    pub fn state(&self) -> &SnapshotState {
        &self.state
    }

    pub fn issues(&self) -> &[EntryIssue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<EntryIssue> {
        std::mem::take(&mut self.issues)
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn finish(&mut self, state: SnapshotState) {
        self.state = state;
        self.buffer = None;
        if let Some(snapshot) = self.snapshot.take() {
            let raw = snapshot.raw();
            if let Err(e) = snapshot.close() {
                warn!("Failed to close snapshot 0x{raw:x}: {e}");
            }
        }
    }

    /// Moves to the next entry and decodes it. `Ok(None)` means the platform has no more.
    fn step(&mut self, index: usize) -> Result<Option<ProcessSnapshotEntry>> {
        let (Some(snapshot), Some(buffer)) = (&self.snapshot, &mut self.buffer) else {
            return Ok(None);
        };
        let positioned = match self.state {
            SnapshotState::Created => {
                // dwSize must hold the structure size before the first call.
                self.codec.write_u32(
                    buffer,
                    self.layout.offset_of(process_entry::SIZE),
                    self.layout.size as u32,
                )?;
                self.api.process32_first(snapshot.raw(), buffer.address())?
            }
            _ => self.api.process32_next(snapshot.raw(), buffer.address())?,
        };
        if !positioned {
            return Ok(None);
        }
        decode_entry(&self.codec, self.layout, buffer, index, &mut self.issues).map(Some)
    }
}

fn decode_entry(
    codec: &Codec,
    layout: &FieldLayout,
    buffer: &RawBuffer<'_>,
    index: usize,
    issues: &mut Vec<EntryIssue>,
) -> Result<ProcessSnapshotEntry> {
    let pid = codec.read_u32(buffer, layout.offset_of(process_entry::PID))?;
    let parent_pid = codec.read_u32(buffer, layout.offset_of(process_entry::PARENT_PID))?;
    let thread_count = codec.read_u32(buffer, layout.offset_of(process_entry::THREAD_COUNT))?;
    let exe_name = match codec.read_wide_string(
        buffer,
        layout.offset_of(process_entry::EXE_FILE),
        process_entry::EXE_FILE_UNITS,
    ) {
        Ok(name) => name,
        Err(Error::Decode(error)) => {
            warn!("Entry {index} (pid {pid}) has an undecodable name: {error}");
            issues.push(EntryIssue { index, pid, error });
            UNKNOWN_NAME.to_string()
        }
        Err(e) => return Err(e),
    };

    let entry = ProcessSnapshotEntry {
        pid,
        parent_pid,
        thread_count,
        exe_name,
    };
    trace!("Entry {index}: {entry}");
    Ok(entry)
}

impl Iterator for SnapshotEntries<'_> {
    type Item = Result<ProcessSnapshotEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(
            self.state,
            SnapshotState::Exhausted | SnapshotState::Failed(_)
        ) {
            return None;
        }
        if self.yielded >= self.max_entries {
            warn!(
                "Stopping process enumeration at {} entries",
                self.max_entries
            );
            self.truncated = true;
            self.finish(SnapshotState::Exhausted);
            return None;
        }

        let index = self.yielded;
        match self.step(index) {
            Ok(Some(entry)) => {
                self.state = SnapshotState::Positioned(index);
                self.yielded += 1;
                Some(Ok(entry))
            }
            Ok(None) => {
                debug!("Process snapshot exhausted after {index} entries");
                self.finish(SnapshotState::Exhausted);
                None
            }
            Err(e) => {
                self.finish(SnapshotState::Failed(e.to_string()));
                Some(Err(e))
            }
        }
    }
}

impl Drop for SnapshotEntries<'_> {
    fn drop(&mut self) {
        if self.snapshot.is_some() {
            self.finish(SnapshotState::Exhausted);
        }
    }
}
