use super::FieldKind::{Pointer, U16, U32, WideStringFixed};
use super::{
    FieldLayout, FieldSpec, StructKind, exit_code as ec, process_entry as pe,
    process_information as pi, startup_info as si, system_info as sys,
};
use crate::arch::WordSize;
use static_assertions::const_assert;

const fn field(
    name: &'static str,
    offset: usize,
    kind: super::FieldKind,
    size: usize,
) -> FieldSpec {
    FieldSpec::new(name, offset, kind, size)
}

const fn end_of(fields: &[FieldSpec]) -> usize {
    let mut end = 0;
    let mut i = 0;
    while i < fields.len() {
        let field_end = fields[i].offset + fields[i].size;
        if field_end > end {
            end = field_end;
        }
        i += 1;
    }
    end
}

const EXE_FILE: super::FieldKind = WideStringFixed(pe::EXE_FILE_UNITS);
const EXE_FILE_BYTES: usize = pe::EXE_FILE_UNITS * 2;

// PROCESSENTRY32W

const PROCESS_ENTRY_X86_SIZE: usize = 556;
const PROCESS_ENTRY_X86_FIELDS: &[FieldSpec] = &[
    field(pe::SIZE, 0, U32, 4),
    field(pe::USAGE, 4, U32, 4),
    field(pe::PID, 8, U32, 4),
    field(pe::DEFAULT_HEAP_ID, 12, Pointer, 4),
    field(pe::MODULE_ID, 16, U32, 4),
    field(pe::THREAD_COUNT, 20, U32, 4),
    field(pe::PARENT_PID, 24, U32, 4),
    field(pe::PRIORITY_CLASS_BASE, 28, U32, 4),
    field(pe::FLAGS, 32, U32, 4),
    field(pe::EXE_FILE, 36, EXE_FILE, EXE_FILE_BYTES),
];

// th32DefaultHeapID is a ULONG_PTR: 4 bytes of padding before it, everything after shifts by 8.
// That puts cntThreads at 28 and th32ParentProcessID at 32, not at 24/28 as a naive
// word-size substitution would. See the layout decisions in DESIGN.md.
const PROCESS_ENTRY_X64_SIZE: usize = 568;
const PROCESS_ENTRY_X64_FIELDS: &[FieldSpec] = &[
    field(pe::SIZE, 0, U32, 4),
    field(pe::USAGE, 4, U32, 4),
    field(pe::PID, 8, U32, 4),
    field(pe::DEFAULT_HEAP_ID, 16, Pointer, 8),
    field(pe::MODULE_ID, 24, U32, 4),
    field(pe::THREAD_COUNT, 28, U32, 4),
    field(pe::PARENT_PID, 32, U32, 4),
    field(pe::PRIORITY_CLASS_BASE, 36, U32, 4),
    field(pe::FLAGS, 40, U32, 4),
    field(pe::EXE_FILE, 44, EXE_FILE, EXE_FILE_BYTES),
];

// STARTUPINFOW

const STARTUP_INFO_X86_SIZE: usize = 68;
const STARTUP_INFO_X86_FIELDS: &[FieldSpec] = &[
    field(si::CB, 0, U32, 4),
    field(si::RESERVED, 4, Pointer, 4),
    field(si::DESKTOP, 8, Pointer, 4),
    field(si::TITLE, 12, Pointer, 4),
    field(si::X, 16, U32, 4),
    field(si::Y, 20, U32, 4),
    field(si::X_SIZE, 24, U32, 4),
    field(si::Y_SIZE, 28, U32, 4),
    field(si::X_COUNT_CHARS, 32, U32, 4),
    field(si::Y_COUNT_CHARS, 36, U32, 4),
    field(si::FILL_ATTRIBUTE, 40, U32, 4),
    field(si::FLAGS, 44, U32, 4),
    field(si::SHOW_WINDOW, 48, U16, 2),
    field(si::RESERVED2_SIZE, 50, U16, 2),
    field(si::RESERVED2, 52, Pointer, 4),
    field(si::STD_INPUT, 56, Pointer, 4),
    field(si::STD_OUTPUT, 60, Pointer, 4),
    field(si::STD_ERROR, 64, Pointer, 4),
];

const STARTUP_INFO_X64_SIZE: usize = 104;
const STARTUP_INFO_X64_FIELDS: &[FieldSpec] = &[
    field(si::CB, 0, U32, 4),
    field(si::RESERVED, 8, Pointer, 8),
    field(si::DESKTOP, 16, Pointer, 8),
    field(si::TITLE, 24, Pointer, 8),
    field(si::X, 32, U32, 4),
    field(si::Y, 36, U32, 4),
    field(si::X_SIZE, 40, U32, 4),
    field(si::Y_SIZE, 44, U32, 4),
    field(si::X_COUNT_CHARS, 48, U32, 4),
    field(si::Y_COUNT_CHARS, 52, U32, 4),
    field(si::FILL_ATTRIBUTE, 56, U32, 4),
    field(si::FLAGS, 60, U32, 4),
    field(si::SHOW_WINDOW, 64, U16, 2),
    field(si::RESERVED2_SIZE, 66, U16, 2),
    field(si::RESERVED2, 72, Pointer, 8),
    field(si::STD_INPUT, 80, Pointer, 8),
    field(si::STD_OUTPUT, 88, Pointer, 8),
    field(si::STD_ERROR, 96, Pointer, 8),
];

// PROCESS_INFORMATION
//
// Allocated at the exact struct size, 16 bytes on x86 and 24 on x64. Larger result blocks
// only add slack that CreateProcessW never writes. See DESIGN.md.

const PROCESS_INFORMATION_X86_SIZE: usize = 16;
const PROCESS_INFORMATION_X86_FIELDS: &[FieldSpec] = &[
    field(pi::PROCESS, 0, Pointer, 4),
    field(pi::THREAD, 4, Pointer, 4),
    field(pi::PID, 8, U32, 4),
    field(pi::TID, 12, U32, 4),
];

const PROCESS_INFORMATION_X64_SIZE: usize = 24;
const PROCESS_INFORMATION_X64_FIELDS: &[FieldSpec] = &[
    field(pi::PROCESS, 0, Pointer, 8),
    field(pi::THREAD, 8, Pointer, 8),
    field(pi::PID, 16, U32, 4),
    field(pi::TID, 20, U32, 4),
];

// SYSTEM_INFO

const SYSTEM_INFO_X86_SIZE: usize = 36;
const SYSTEM_INFO_X86_FIELDS: &[FieldSpec] = &[
    field(sys::PROCESSOR_ARCHITECTURE, 0, U16, 2),
    field(sys::RESERVED, 2, U16, 2),
    field(sys::PAGE_SIZE, 4, U32, 4),
    field(sys::MIN_APPLICATION_ADDRESS, 8, Pointer, 4),
    field(sys::MAX_APPLICATION_ADDRESS, 12, Pointer, 4),
    field(sys::ACTIVE_PROCESSOR_MASK, 16, Pointer, 4),
    field(sys::NUMBER_OF_PROCESSORS, 20, U32, 4),
    field(sys::PROCESSOR_TYPE, 24, U32, 4),
    field(sys::ALLOCATION_GRANULARITY, 28, U32, 4),
    field(sys::PROCESSOR_LEVEL, 32, U16, 2),
    field(sys::PROCESSOR_REVISION, 34, U16, 2),
];

const SYSTEM_INFO_X64_SIZE: usize = 48;
const SYSTEM_INFO_X64_FIELDS: &[FieldSpec] = &[
    field(sys::PROCESSOR_ARCHITECTURE, 0, U16, 2),
    field(sys::RESERVED, 2, U16, 2),
    field(sys::PAGE_SIZE, 4, U32, 4),
    field(sys::MIN_APPLICATION_ADDRESS, 8, Pointer, 8),
    field(sys::MAX_APPLICATION_ADDRESS, 16, Pointer, 8),
    field(sys::ACTIVE_PROCESSOR_MASK, 24, Pointer, 8),
    field(sys::NUMBER_OF_PROCESSORS, 32, U32, 4),
    field(sys::PROCESSOR_TYPE, 36, U32, 4),
    field(sys::ALLOCATION_GRANULARITY, 40, U32, 4),
    field(sys::PROCESSOR_LEVEL, 44, U16, 2),
    field(sys::PROCESSOR_REVISION, 46, U16, 2),
];

// GetExitCodeProcess out-parameter

const EXIT_CODE_SIZE: usize = 4;
const EXIT_CODE_FIELDS: &[FieldSpec] = &[field(ec::VALUE, 0, U32, 4)];

const_assert!(end_of(PROCESS_ENTRY_X86_FIELDS) == PROCESS_ENTRY_X86_SIZE);
const_assert!(end_of(PROCESS_ENTRY_X64_FIELDS) + 4 == PROCESS_ENTRY_X64_SIZE);
const_assert!(end_of(STARTUP_INFO_X86_FIELDS) == STARTUP_INFO_X86_SIZE);
const_assert!(end_of(STARTUP_INFO_X64_FIELDS) == STARTUP_INFO_X64_SIZE);
const_assert!(end_of(PROCESS_INFORMATION_X86_FIELDS) == PROCESS_INFORMATION_X86_SIZE);
const_assert!(end_of(PROCESS_INFORMATION_X64_FIELDS) == PROCESS_INFORMATION_X64_SIZE);
const_assert!(end_of(SYSTEM_INFO_X86_FIELDS) == SYSTEM_INFO_X86_SIZE);
const_assert!(end_of(SYSTEM_INFO_X64_FIELDS) == SYSTEM_INFO_X64_SIZE);
const_assert!(end_of(EXIT_CODE_FIELDS) == EXIT_CODE_SIZE);
const_assert!(PROCESS_ENTRY_X64_SIZE % 8 == 0);

macro_rules! layout {
    ($name:ident, $kind:expr, $word:expr, $size:expr, $fields:expr) => {
        pub(super) static $name: FieldLayout = FieldLayout {
            kind: $kind,
            word: $word,
            size: $size,
            fields: $fields,
        };
    };
}

layout!(
    PROCESS_ENTRY_X86,
    StructKind::ProcessSnapshotEntry,
    WordSize::Four,
    PROCESS_ENTRY_X86_SIZE,
    PROCESS_ENTRY_X86_FIELDS
);
layout!(
    PROCESS_ENTRY_X64,
    StructKind::ProcessSnapshotEntry,
    WordSize::Eight,
    PROCESS_ENTRY_X64_SIZE,
    PROCESS_ENTRY_X64_FIELDS
);
layout!(
    STARTUP_INFO_X86,
    StructKind::StartupParameters,
    WordSize::Four,
    STARTUP_INFO_X86_SIZE,
    STARTUP_INFO_X86_FIELDS
);
layout!(
    STARTUP_INFO_X64,
    StructKind::StartupParameters,
    WordSize::Eight,
    STARTUP_INFO_X64_SIZE,
    STARTUP_INFO_X64_FIELDS
);
layout!(
    PROCESS_INFORMATION_X86,
    StructKind::CreationResult,
    WordSize::Four,
    PROCESS_INFORMATION_X86_SIZE,
    PROCESS_INFORMATION_X86_FIELDS
);
layout!(
    PROCESS_INFORMATION_X64,
    StructKind::CreationResult,
    WordSize::Eight,
    PROCESS_INFORMATION_X64_SIZE,
    PROCESS_INFORMATION_X64_FIELDS
);
layout!(
    SYSTEM_INFO_X86,
    StructKind::SystemInfo,
    WordSize::Four,
    SYSTEM_INFO_X86_SIZE,
    SYSTEM_INFO_X86_FIELDS
);
layout!(
    SYSTEM_INFO_X64,
    StructKind::SystemInfo,
    WordSize::Eight,
    SYSTEM_INFO_X64_SIZE,
    SYSTEM_INFO_X64_FIELDS
);
layout!(
    EXIT_CODE_X86,
    StructKind::ExitCode,
    WordSize::Four,
    EXIT_CODE_SIZE,
    EXIT_CODE_FIELDS
);
layout!(
    EXIT_CODE_X64,
    StructKind::ExitCode,
    WordSize::Eight,
    EXIT_CODE_SIZE,
    EXIT_CODE_FIELDS
);
