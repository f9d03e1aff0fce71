//! Kernel object handles.
//!
//! An [`OwnedHandle`] is closed exactly once: explicitly through [`OwnedHandle::close`], or when
//! it is dropped. A [`PseudoHandle`] refers to the calling process and is never closed.

use crate::ffi::Kernel32;
use crate::prelude::*;
use std::fmt;

/// A real handle obtained from the platform.
#[must_use = "dropping the handle closes it right away"]
pub struct OwnedHandle<'a> {
    api: &'a Kernel32<'a>,
    raw: u64,
}

impl<'a> OwnedHandle<'a> {
    /// Takes ownership of `raw`. Returns `None` for the null handle.
    pub(crate) fn from_raw(api: &'a Kernel32<'a>, raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self { api, raw })
    }

    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn is_closed(&self) -> bool {
        self.raw == 0
    }

    /// Closes the handle. Calling it again is a no-op that reports `Ok(false)`.
    pub fn close(&mut self) -> Result<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let raw = std::mem::take(&mut self.raw);
        let closed = self.api.close_handle(raw)?;
        if closed {
            debug!("Closed handle 0x{raw:x}");
        } else {
            warn!(
                "CloseHandle(0x{raw:x}) failed (error {})",
                self.api.last_error_or_zero()
            );
        }
        Ok(closed)
    }

    /// Gives up ownership without closing.
    pub fn into_raw(mut self) -> u64 {
        std::mem::take(&mut self.raw)
    }
}

impl Drop for OwnedHandle<'_> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        let raw = self.raw;
        warn!("Handle 0x{raw:x} dropped without being closed");
        if let Err(e) = self.close() {
            warn!("Handle 0x{raw:x} could not be closed on drop: {e}");
        }
    }
}

impl fmt::Debug for OwnedHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnedHandle")
            .field(&format_args!("0x{:x}", self.raw))
            .finish()
    }
}

/// The value `GetCurrentProcess` hands out. Valid only inside the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoHandle(pub(crate) u64);

impl PseudoHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Anything a lifecycle call can target.
pub trait ProcessHandle {
    fn raw_handle(&self) -> u64;
}

impl ProcessHandle for OwnedHandle<'_> {
    fn raw_handle(&self) -> u64 {
        self.raw
    }
}

impl ProcessHandle for PseudoHandle {
    fn raw_handle(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::ArchitectureProfile;
    use crate::error::ForeignCallError;
    use crate::ffi::{ForeignArg, ForeignInvoker, ForeignValue, Signature};
    use std::cell::RefCell;

    #[derive(Default)]
    struct CloseCounter {
        closed: RefCell<Vec<u64>>,
    }

    impl ForeignInvoker for CloseCounter {
        fn register(&self, _: &str, _: &str, _: &Signature) -> Result<(), ForeignCallError> {
            Ok(())
        }

        fn invoke(
            &self,
            symbol: &str,
            args: &[ForeignArg],
        ) -> Result<ForeignValue, ForeignCallError> {
            match (symbol, args) {
                ("CloseHandle", [ForeignArg::Handle(h)]) => {
                    self.closed.borrow_mut().push(*h);
                    Ok(ForeignValue::I32(1))
                }
                _ => Ok(ForeignValue::U32(0)),
            }
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let invoker = CloseCounter::default();
        let api = Kernel32::bind(&invoker, ArchitectureProfile::X64).unwrap();

        let mut handle = OwnedHandle::from_raw(&api, 0x44).unwrap();
        assert!(handle.close().unwrap());
        assert!(!handle.close().unwrap());
        drop(handle);

        assert_eq!(*invoker.closed.borrow(), vec![0x44]);
    }

    #[test]
    fn test_drop_closes_once() {
        let invoker = CloseCounter::default();
        let api = Kernel32::bind(&invoker, ArchitectureProfile::X64).unwrap();
        {
            let _handle = OwnedHandle::from_raw(&api, 0x10).unwrap();
        }
        assert_eq!(*invoker.closed.borrow(), vec![0x10]);
    }

    #[test]
    fn test_null_and_released_handles_are_not_closed() {
        let invoker = CloseCounter::default();
        let api = Kernel32::bind(&invoker, ArchitectureProfile::X64).unwrap();

        assert!(OwnedHandle::from_raw(&api, 0).is_none());
        let raw = OwnedHandle::from_raw(&api, 0x20).unwrap().into_raw();
        assert_eq!(raw, 0x20);
        assert!(invoker.closed.borrow().is_empty());
    }
}
