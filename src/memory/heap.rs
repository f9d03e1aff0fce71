use super::{Address, MemoryAccess};
use std::alloc::{self, Layout};

const HEAP_ALIGN: usize = 16;

/// Native backend: zeroed allocations on the Rust global allocator.
///
/// Addresses are real pointers into this process, so they can be passed as-is to foreign calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessHeap;

impl MemoryAccess for ProcessHeap {
    fn reserve(&self, size: usize) -> Option<Address> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, HEAP_ALIGN).ok()?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            None
        } else {
            Some(ptr as Address)
        }
    }

    unsafe fn free(&self, address: Address, size: usize) {
        if let Ok(layout) = Layout::from_size_align(size, HEAP_ALIGN) {
            // SAFETY: caller guarantees `address` came from `reserve(size)` and is live.
            unsafe { alloc::dealloc(address as *mut u8, layout) };
        }
    }

    unsafe fn read(&self, address: Address, offset: usize, out: &mut [u8]) {
        // SAFETY: caller guarantees the range is inside a live reservation.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (address + offset) as *const u8,
                out.as_mut_ptr(),
                out.len(),
            )
        };
    }

    unsafe fn write(&self, address: Address, offset: usize, bytes: &[u8]) {
        // SAFETY: caller guarantees the range is inside a live reservation.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), (address + offset) as *mut u8, bytes.len())
        };
    }
}
