//! # Buffer Remapping
//!
//! The remap primitive: mapping a physical buffer range into
//! kernel-visible memory and back out. The platform implements it over
//! its memory-mapping services; tests implement it over plain
//! allocations.

use core::fmt;

use obsidian_core::{PhysAddr, Result};

// =============================================================================
// MAPPER TRAIT
// =============================================================================

/// Platform primitive for mapping physical buffer ranges
pub trait BufferMapper {
    /// Map `size` bytes at `addr` into kernel-visible memory
    ///
    /// Fails with [`obsidian_core::Error::RemapFailed`] when the range
    /// cannot be mapped.
    fn map(&self, addr: PhysAddr, size: u32) -> Result<Remap>;

    /// Release a mapping produced by [`BufferMapper::map`]
    fn unmap(&self, mapping: Remap);
}

// =============================================================================
// MAPPING TOKEN
// =============================================================================

/// A live kernel-visible mapping of a physical buffer range
///
/// Held by the command buffer pool for the lifetime of a registered slot
/// and returned to the mapper at release time. The pointer is never
/// dereferenced by the scheduler itself.
pub struct Remap {
    ptr: *mut u8,
    len: u32,
}

impl Remap {
    /// Create a mapping token
    ///
    /// # Safety
    /// `ptr` must be a live kernel-visible mapping of `len` bytes, valid
    /// until handed back to the mapper that produced it.
    pub unsafe fn new(ptr: *mut u8, len: u32) -> Self {
        Self { ptr, len }
    }

    /// Kernel-visible base pointer
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Mapped length in bytes
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Remap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remap({:p}, {} bytes)", self.ptr, self.len)
    }
}

// SAFETY: The mapping is owned state moved between pool and mapper; the
// pool's lock serializes all access
unsafe impl Send for Remap {}
