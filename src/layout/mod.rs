//! Architecture layout table.
//!
//! Every byte offset used to talk to the platform lives here. Call sites look fields up by name
//! through [`layout_for`] and never carry literal offsets of their own.

use crate::arch::{ArchitectureProfile, WordSize};

mod tables;

/// Platform structures the core knows how to lay out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructKind {
    /// `PROCESSENTRY32W`
    ProcessSnapshotEntry,
    /// `STARTUPINFOW`
    StartupParameters,
    /// `PROCESS_INFORMATION`
    CreationResult,
    /// `SYSTEM_INFO`
    SystemInfo,
    /// `DWORD` out-parameter of `GetExitCodeProcess`
    ExitCode,
}

impl StructKind {
    pub fn all() -> &'static [StructKind] {
        &[
            StructKind::ProcessSnapshotEntry,
            StructKind::StartupParameters,
            StructKind::CreationResult,
            StructKind::SystemInfo,
            StructKind::ExitCode,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    U16,
    U32,
    /// Pointer-sized unsigned integer, also used for handles.
    Pointer,
    F32,
    F64,
    /// Fixed capacity, zero terminated UTF-16 text of `N` code units.
    WideStringFixed(usize),
}

impl FieldKind {
    pub fn size(&self, word: WordSize) -> usize {
        match self {
            FieldKind::U16 => 2,
            FieldKind::U32 | FieldKind::F32 => 4,
            FieldKind::F64 => 8,
            FieldKind::Pointer => word.bytes(),
            FieldKind::WideStringFixed(units) => units * 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
    pub size: usize,
}

impl FieldSpec {
    pub const fn new(name: &'static str, offset: usize, kind: FieldKind, size: usize) -> Self {
        Self {
            name,
            offset,
            kind,
            size,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Ordered fields of one structure for one word size, plus the byte length the platform expects
/// to be allocated (trailing padding included).
#[derive(Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub kind: StructKind,
    pub word: WordSize,
    pub size: usize,
    pub fields: &'static [FieldSpec],
}

impl FieldLayout {
    /// Looks a field up by name.
    ///
    /// # Panics
    ///
    /// Panics when the field does not exist: the table is incomplete for a supported
    /// architecture, which is a programming error.
    pub fn field(&self, name: &str) -> &FieldSpec {
        match self.fields.iter().find(|f| f.name == name) {
            Some(field) => field,
            None => panic!(
                "layout table has no field `{name}` in {:?} for {:?}",
                self.kind, self.word
            ),
        }
    }

    pub fn offset_of(&self, name: &str) -> usize {
        self.field(name).offset
    }

    /// Checks that offsets are non-decreasing, fields never overlap, every field size agrees
    /// with its kind and everything fits in the declared size.
    pub fn check(&self) -> std::result::Result<(), String> {
        let mut cursor = 0;
        for field in self.fields {
            if field.size != field.kind.size(self.word) {
                return Err(format!(
                    "{} is {} bytes but a {:?} is {} bytes",
                    field.name,
                    field.size,
                    field.kind,
                    field.kind.size(self.word)
                ));
            }
            if field.offset < cursor {
                return Err(format!(
                    "{} at offset {} overlaps the previous field ending at {cursor}",
                    field.name, field.offset
                ));
            }
            cursor = field.end();
        }
        if cursor > self.size {
            return Err(format!(
                "fields end at {cursor} past the declared size {}",
                self.size
            ));
        }
        Ok(())
    }
}

/// Resolves the layout of `kind` for `profile`. Total over every supported pair.
pub fn layout_for(kind: StructKind, profile: ArchitectureProfile) -> &'static FieldLayout {
    use tables::*;

    match (kind, profile.word()) {
        (StructKind::ProcessSnapshotEntry, WordSize::Four) => &PROCESS_ENTRY_X86,
        (StructKind::ProcessSnapshotEntry, WordSize::Eight) => &PROCESS_ENTRY_X64,
        (StructKind::StartupParameters, WordSize::Four) => &STARTUP_INFO_X86,
        (StructKind::StartupParameters, WordSize::Eight) => &STARTUP_INFO_X64,
        (StructKind::CreationResult, WordSize::Four) => &PROCESS_INFORMATION_X86,
        (StructKind::CreationResult, WordSize::Eight) => &PROCESS_INFORMATION_X64,
        (StructKind::SystemInfo, WordSize::Four) => &SYSTEM_INFO_X86,
        (StructKind::SystemInfo, WordSize::Eight) => &SYSTEM_INFO_X64,
        (StructKind::ExitCode, WordSize::Four) => &EXIT_CODE_X86,
        (StructKind::ExitCode, WordSize::Eight) => &EXIT_CODE_X64,
    }
}

/// Field names of `PROCESSENTRY32W`.
pub mod process_entry {
    pub const SIZE: &str = "dwSize";
    pub const USAGE: &str = "cntUsage";
    pub const PID: &str = "th32ProcessID";
    pub const DEFAULT_HEAP_ID: &str = "th32DefaultHeapID";
    pub const MODULE_ID: &str = "th32ModuleID";
    pub const THREAD_COUNT: &str = "cntThreads";
    pub const PARENT_PID: &str = "th32ParentProcessID";
    pub const PRIORITY_CLASS_BASE: &str = "pcPriClassBase";
    pub const FLAGS: &str = "dwFlags";
    pub const EXE_FILE: &str = "szExeFile";

    /// `MAX_PATH`
    pub const EXE_FILE_UNITS: usize = 260;
}

/// Field names of `STARTUPINFOW`.
pub mod startup_info {
    pub const CB: &str = "cb";
    pub const RESERVED: &str = "lpReserved";
    pub const DESKTOP: &str = "lpDesktop";
    pub const TITLE: &str = "lpTitle";
    pub const X: &str = "dwX";
    pub const Y: &str = "dwY";
    pub const X_SIZE: &str = "dwXSize";
    pub const Y_SIZE: &str = "dwYSize";
    pub const X_COUNT_CHARS: &str = "dwXCountChars";
    pub const Y_COUNT_CHARS: &str = "dwYCountChars";
    pub const FILL_ATTRIBUTE: &str = "dwFillAttribute";
    pub const FLAGS: &str = "dwFlags";
    pub const SHOW_WINDOW: &str = "wShowWindow";
    pub const RESERVED2_SIZE: &str = "cbReserved2";
    pub const RESERVED2: &str = "lpReserved2";
    pub const STD_INPUT: &str = "hStdInput";
    pub const STD_OUTPUT: &str = "hStdOutput";
    pub const STD_ERROR: &str = "hStdError";
}

/// Field names of `PROCESS_INFORMATION`.
pub mod process_information {
    pub const PROCESS: &str = "hProcess";
    pub const THREAD: &str = "hThread";
    pub const PID: &str = "dwProcessId";
    pub const TID: &str = "dwThreadId";
}

/// Field names of `SYSTEM_INFO`.
pub mod system_info {
    pub const PROCESSOR_ARCHITECTURE: &str = "wProcessorArchitecture";
    pub const RESERVED: &str = "wReserved";
    pub const PAGE_SIZE: &str = "dwPageSize";
    pub const MIN_APPLICATION_ADDRESS: &str = "lpMinimumApplicationAddress";
    pub const MAX_APPLICATION_ADDRESS: &str = "lpMaximumApplicationAddress";
    pub const ACTIVE_PROCESSOR_MASK: &str = "dwActiveProcessorMask";
    pub const NUMBER_OF_PROCESSORS: &str = "dwNumberOfProcessors";
    pub const PROCESSOR_TYPE: &str = "dwProcessorType";
    pub const ALLOCATION_GRANULARITY: &str = "dwAllocationGranularity";
    pub const PROCESSOR_LEVEL: &str = "wProcessorLevel";
    pub const PROCESSOR_REVISION: &str = "wProcessorRevision";
}

pub mod exit_code {
    pub const VALUE: &str = "dwExitCode";
}
