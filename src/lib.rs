//! Process introspection and lifecycle control over a dynamic foreign-call capability.
//!
//! The host supplies two capabilities: a [`ffi::ForeignInvoker`] able to register and call
//! exported functions from a textual signature, and a [`memory::MemoryAccess`] able to reserve
//! raw memory and read/write it at byte offsets. Everything else (structure layouts, the
//! snapshot protocol, process creation and waiting) is built on top of those two seams.

pub mod arch;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod launcher;
pub mod layout;
pub mod lifecycle;
pub mod memory;
pub mod prelude;
pub mod snapshot;
pub mod system_info;

pub use arch::{ArchitectureProfile, WordSize};
pub use config::ControlConfig;
pub use control::ProcessControl;
pub use error::{DecodeError, Error, ForeignCallError, LaunchError, Result};
pub use handle::{OwnedHandle, ProcessHandle, PseudoHandle};
pub use launcher::{LaunchRequest, LaunchResult};
pub use lifecycle::{PollOptions, PollOutcome, ProcessExit, Timeout, WaitOutcome};
pub use snapshot::ProcessSnapshotEntry;
pub use system_info::SystemInfo;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
