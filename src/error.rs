use crate::layout::FieldKind;
use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the core.
///
/// Only [`Error::Decode`] is recoverable inside an enumeration: the snapshot iterator records it
/// and keeps going. Everything else aborts the operation that produced it, after the operation
/// has released whatever it had acquired.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to allocate a {size} byte buffer")]
    AllocationFailed { size: usize },

    #[error("failed to create a process snapshot (error {code})")]
    SnapshotCreationFailed { code: u32 },

    #[error(transparent)]
    ForeignCall(#[from] ForeignCallError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("access of {len} bytes at offset {offset} is outside a {size} byte buffer")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("invalid value for a {kind:?} field: {reason}")]
    InvalidValue { kind: FieldKind, reason: String },

    #[error("{operation} failed (error {code})")]
    Platform { operation: &'static str, code: u32 },
}

/// Registration or invocation failure reported by the foreign invocation capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("foreign call error: {message}")]
pub struct ForeignCallError {
    pub message: String,
}

impl ForeignCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Process creation refused by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub struct LaunchError {
    pub code: u32,
    pub meaning: Option<&'static str>,
}

impl LaunchError {
    pub fn from_code(code: u32) -> Self {
        Self {
            code,
            meaning: error_meaning(code),
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.meaning {
            Some(meaning) => write!(
                f,
                "process creation failed with error {} (0x{:x}): {meaning}",
                self.code, self.code
            ),
            None => write!(
                f,
                "process creation failed with error {} (0x{:x})",
                self.code, self.code
            ),
        }
    }
}

/// Bytes at `offset` that do not decode as the requested field kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed field at offset {offset}: {reason}")]
pub struct DecodeError {
    pub offset: usize,
    pub reason: String,
}

pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_PATH_NOT_FOUND: u32 = 3;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_NOT_ENOUGH_MEMORY: u32 = 8;
pub const ERROR_INVALID_PARAMETER: u32 = 87;
pub const ERROR_BAD_EXE_FORMAT: u32 = 193;

/// Human readable meaning of the platform error codes a launch commonly fails with.
pub fn error_meaning(code: u32) -> Option<&'static str> {
    match code {
        ERROR_FILE_NOT_FOUND => Some("file not found"),
        ERROR_PATH_NOT_FOUND => Some("path not found"),
        ERROR_ACCESS_DENIED => Some("access denied"),
        ERROR_NOT_ENOUGH_MEMORY => Some("not enough memory"),
        ERROR_INVALID_PARAMETER => Some("invalid parameter"),
        ERROR_BAD_EXE_FORMAT => Some("not a valid executable"),
        _ => None,
    }
}
