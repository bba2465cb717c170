//! # OBSIDIAN Error Handling
//!
//! Unified error type for the NPU driver stack.
//!
//! Error handling follows these principles:
//! - Errors are typed and categorized by failure domain
//! - No panics in production code paths
//! - All failures are local and synchronous; the driver never retries
//!   on the caller's behalf

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// OBSIDIAN Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// OBSIDIAN unified error type
///
/// Covers every error condition the driver reports to a caller, from
/// request validation through hardware remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Request Validation Errors
    // =========================================================================
    /// Request magic number does not match the driver's
    BadMagic,
    /// Opcode is unknown, out of range, or declared but not serviced
    UnsupportedCommand,
    /// A request parameter is out of range or inconsistent
    InvalidParameter,

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// Command buffer pool request exceeds the slot limit
    PoolTooLarge,
    /// Memory allocation failed
    OutOfMemory,

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    /// Operation rejected because a job is currently executing
    Busy,
    /// Wait elapsed without a completion
    Timeout,

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Session handle refers to a closed or recycled session
    StaleHandle,

    // =========================================================================
    // Hardware Errors
    // =========================================================================
    /// Mapping a job buffer into kernel-visible memory failed
    RemapFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "bad request magic"),
            Self::UnsupportedCommand => write!(f, "unsupported command"),
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::PoolTooLarge => write!(f, "command buffer pool too large"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Busy => write!(f, "device busy"),
            Self::Timeout => write!(f, "wait timed out"),
            Self::StaleHandle => write!(f, "stale session handle"),
            Self::RemapFailed => write!(f, "buffer remap failed"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
