//! Scoped raw memory.
//!
//! Buffers come from a host-provided [`MemoryAccess`] backend and are handed out by an [`Arena`]
//! as [`RawBuffer`] guards. A guard releases its memory exactly once, when it is dropped or
//! explicitly released, so every exit path of an operation gives its buffers back.

use crate::layout::FieldLayout;
use crate::prelude::*;

mod heap;

pub use heap::ProcessHeap;

/// Address of a reservation inside the memory backend.
pub type Address = usize;

/// Raw memory capability supplied by the host.
pub trait MemoryAccess {
    /// Reserves `size` bytes. `None` is the null-equivalent failure.
    fn reserve(&self, size: usize) -> Option<Address>;

    /// Gives a reservation back.
    ///
    /// # Safety
    ///
    /// `address` must come from [`MemoryAccess::reserve`] on this backend with the same `size`,
    /// and must not have been freed already.
    unsafe fn free(&self, address: Address, size: usize);

    /// Copies `out.len()` bytes starting at `address + offset` into `out`.
    ///
    /// # Safety
    ///
    /// `address` must be a live reservation and `offset + out.len()` must not exceed its size.
    unsafe fn read(&self, address: Address, offset: usize, out: &mut [u8]);

    /// Copies `bytes` to `address + offset`.
    ///
    /// # Safety
    ///
    /// `address` must be a live reservation and `offset + bytes.len()` must not exceed its size.
    unsafe fn write(&self, address: Address, offset: usize, bytes: &[u8]);
}

/// Bounded byte storage the codec reads and writes through.
pub trait Region {
    fn size(&self) -> usize;
    fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()>;
    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;
}

pub(crate) fn check_bounds(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds { offset, len, size }),
    }
}

impl Region for [u8] {
    fn size(&self) -> usize {
        self.len()
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_bounds(offset, out.len(), self.len())?;
        out.copy_from_slice(&self[offset..offset + out.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        check_bounds(offset, bytes.len(), self.len())?;
        self[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Hands out zero-filled [`RawBuffer`]s from a backend.
#[derive(Clone, Copy)]
pub struct Arena<'a> {
    memory: &'a dyn MemoryAccess,
}

impl<'a> Arena<'a> {
    pub fn new(memory: &'a dyn MemoryAccess) -> Self {
        Self { memory }
    }

    pub fn allocate(&self, size: usize) -> Result<RawBuffer<'a>> {
        let Some(address) = self.memory.reserve(size) else {
            warn!("Failed to reserve {size} bytes");
            return Err(Error::AllocationFailed { size });
        };
        debug!("Reserved {size} bytes at 0x{address:x}");

        let mut buffer = RawBuffer {
            memory: self.memory,
            address,
            size,
        };
        // Backends are not trusted to hand out zeroed memory.
        buffer.fill_zero();
        Ok(buffer)
    }

    /// Allocates exactly the declared size of `layout`.
    pub fn allocate_for(&self, layout: &FieldLayout) -> Result<RawBuffer<'a>> {
        self.allocate(layout.size)
    }
}

/// An exclusively owned reservation. Released when dropped.
#[must_use]
pub struct RawBuffer<'a> {
    memory: &'a dyn MemoryAccess,
    address: Address,
    size: usize,
}

impl RawBuffer<'_> {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fill_zero(&mut self) {
        let zeros = vec![0u8; self.size];
        // SAFETY: the reservation is live and exactly `size` bytes long.
        unsafe { self.memory.write(self.address, 0, &zeros) };
    }

    /// Releases the buffer now instead of at the end of the scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Region for RawBuffer<'_> {
    fn size(&self) -> usize {
        self.size
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_bounds(offset, out.len(), self.size)?;
        // SAFETY: live reservation, bounds checked above.
        unsafe { self.memory.read(self.address, offset, out) };
        Ok(())
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        check_bounds(offset, bytes.len(), self.size)?;
        // SAFETY: live reservation, bounds checked above.
        unsafe { self.memory.write(self.address, offset, bytes) };
        Ok(())
    }
}

impl Drop for RawBuffer<'_> {
    fn drop(&mut self) {
        debug!("Releasing {} bytes at 0x{:x}", self.size, self.address);
        // SAFETY: the guard is the only owner of the reservation and drops once.
        unsafe { self.memory.free(self.address, self.size) };
    }
}

impl std::fmt::Debug for RawBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBuffer")
            .field("address", &format_args!("0x{:x}", self.address))
            .field("size", &self.size)
            .finish()
    }
}
