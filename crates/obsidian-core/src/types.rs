//! # OBSIDIAN Core Types
//!
//! Fundamental type definitions used across the driver stack.
//!
//! These types provide:
//! - Strong typing for physical buffer addresses (never CPU pointers)
//! - Generation-checked session handles that cannot dangle

use core::fmt;

// =============================================================================
// PHYSICAL ADDRESS
// =============================================================================

/// Physical memory address of a job buffer
///
/// This is the address the NPU's DMA engines consume. It is NOT a CPU
/// pointer and cannot be dereferenced directly; kernel-visible access
/// goes through the remap primitive in the HAL.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a null address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Truncate to the 32-bit value the NPU's base-address registers take
    #[inline]
    pub const fn to_reg(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr(0x{:016x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// SESSION HANDLE
// =============================================================================

/// Generation-checked handle to an open session
///
/// A handle names a slot in the device's session arena plus the generation
/// the slot had when the session opened. A handle outliving its session
/// fails the generation check instead of reaching freed state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: u32,
    generation: u32,
}

impl SessionHandle {
    /// Create a handle from arena slot index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionHandle({}v{})", self.index, self.generation)
    }
}

// =============================================================================
// TESTS
// =============================================================================
