//! # OBSIDIAN Control Surface
//!
//! The fixed-size, versioned request structures clients drive the driver
//! with, and their dispatch into the scheduling pipeline. The platform's
//! marshalling layer copies these structures across the user/kernel
//! boundary; everything after that copy happens here.
//!
//! Every request carries a magic number and an opcode; both are
//! validated before any state is touched. Opcodes 4-7 are declared in
//! the surface for layout compatibility but are not serviced.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

use core::mem::size_of;

use obsidian_core::{Error, Result, SessionHandle};
use obsidian_hal::{BufferMapper, Mmio, ResetControl, TimeSource};
use obsidian_sched::{BufferRange, Device, JobDesc, MAX_POOL_SLOTS};
use static_assertions::const_assert_eq;

// =============================================================================
// SURFACE CONSTANTS
// =============================================================================

/// Request magic number shared with clients
pub const REQUEST_MAGIC: u32 = 181;

/// Fixed 32-bit driver version returned by `GET_VERSION_NUMBER`
pub const VERSION: u32 = 0x0000_0001;

/// Highest opcode declared in the surface
pub const MAX_OPCODE: u32 = 11;

// =============================================================================
// OPCODES
// =============================================================================

/// Control request opcodes, decimal 0-11
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    /// Submit one job; returns immediately
    Start = 0,
    /// Block until the session's oldest job completes or times out
    WaitComplete = 1,
    /// Pre-register 1-16 job slots, optionally with address remapping
    ReqBuf = 2,
    /// Return the fixed driver version constant
    GetVersionNumber = 3,
    /// Declared but not serviced
    GetBusCycle = 4,
    /// Declared but not serviced
    GetDataCycle = 5,
    /// Declared but not serviced
    GetReqTimes = 6,
    /// Declared but not serviced
    ClearProfile = 7,
    /// Program the buffer base addresses directly, bypassing the queue
    ConfigAddr = 8,
    /// Force an immediate hardware reset and reinitialization
    ResetNpu = 9,
    /// Set the device-wide wait timeout in seconds
    ConfigTimeout = 10,
    /// Enable or disable the reset-or-resume policy
    AutoRstEn = 11,
}

impl Opcode {
    /// Decode a raw opcode, rejecting anything past the declared bound
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Start,
            1 => Self::WaitComplete,
            2 => Self::ReqBuf,
            3 => Self::GetVersionNumber,
            4 => Self::GetBusCycle,
            5 => Self::GetDataCycle,
            6 => Self::GetReqTimes,
            7 => Self::ClearProfile,
            8 => Self::ConfigAddr,
            9 => Self::ResetNpu,
            10 => Self::ConfigTimeout,
            11 => Self::AutoRstEn,
            _ => return None,
        })
    }
}

// =============================================================================
// REQUEST STRUCTURES
// =============================================================================

/// `REQ_BUF` payload: the slots to register
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ReqBufArgs {
    /// Number of slots in `bufs`; 1 to [`MAX_POOL_SLOTS`]
    pub buf_num: u32,
    /// Nonzero to remap each slot's ranges into kernel-visible memory
    pub enable_remap: u32,
    /// Slot descriptors; assigned indices are written back
    pub bufs: [JobDesc; MAX_POOL_SLOTS],
}

impl Default for ReqBufArgs {
    fn default() -> Self {
        Self {
            buf_num: 0,
            enable_remap: 0,
            bufs: [JobDesc::default(); MAX_POOL_SLOTS],
        }
    }
}

/// Request payload, one variant per payload layout
#[derive(Debug, Clone, Copy)]
pub enum Body {
    /// No payload
    None,
    /// A job descriptor
    Job(JobDesc),
    /// Buffer registration arguments
    ReqBuf(ReqBufArgs),
    /// A single 32-bit value
    Value(u32),
}

/// A control request after the boundary copy
#[derive(Debug, Clone, Copy)]
pub struct ControlRequest {
    /// Must equal [`REQUEST_MAGIC`]
    pub magic: u32,
    /// Raw opcode
    pub opcode: u32,
    /// Payload; mutated in place for copy-back operations
    pub body: Body,
}

/// What a serviced request hands back for the boundary copy-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to copy out
    None,
    /// A job descriptor with profiling data filled in
    Job(JobDesc),
    /// A single 32-bit value
    Value(u32),
}

// The structures cross an ABI boundary; pin their layouts.
const_assert_eq!(size_of::<BufferRange>(), 16);
const_assert_eq!(size_of::<JobDesc>(), 112);
const_assert_eq!(size_of::<ReqBufArgs>(), 8 + 16 * 112);

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate magic and opcode bound, before touching any state
pub fn validate(request: &ControlRequest) -> Result<Opcode> {
    if request.magic != REQUEST_MAGIC {
        log::error!("incorrect request magic {}", request.magic);
        return Err(Error::BadMagic);
    }
    Opcode::from_raw(request.opcode).ok_or_else(|| {
        log::error!("incorrect request opcode {}", request.opcode);
        Error::UnsupportedCommand
    })
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Validate and service one control request on behalf of `session`
///
/// Copy-back payloads (`REQ_BUF` slot indices) are updated in place in
/// `request.body`; anything else the caller must copy out is returned in
/// the [`Reply`].
pub fn dispatch<M, R, B, T>(
    device: &Device<M, R, B, T>,
    session: SessionHandle,
    request: &mut ControlRequest,
) -> Result<Reply>
where
    M: Mmio,
    R: ResetControl,
    B: BufferMapper,
    T: TimeSource,
{
    let opcode = validate(request)?;

    match (opcode, &mut request.body) {
        (Opcode::Start, Body::Job(desc)) => {
            device.submit(session, *desc)?;
            Ok(Reply::None)
        }
        (Opcode::WaitComplete, Body::None) => {
            let desc = device.wait_complete(session)?;
            Ok(Reply::Job(desc))
        }
        (Opcode::ReqBuf, Body::ReqBuf(args)) => {
            let count = args.buf_num as usize;
            if count == 0 || count > MAX_POOL_SLOTS {
                log::error!("buf_num {} out of range", args.buf_num);
                return Err(Error::PoolTooLarge);
            }
            device.request_buffers(session, &mut args.bufs[..count], args.enable_remap != 0)?;
            Ok(Reply::None)
        }
        (Opcode::GetVersionNumber, Body::None) => Ok(Reply::Value(VERSION)),
        (
            Opcode::GetBusCycle
            | Opcode::GetDataCycle
            | Opcode::GetReqTimes
            | Opcode::ClearProfile,
            _,
        ) => {
            // Declared in the surface, never serviced
            log::error!("unserviced opcode {opcode:?}");
            Err(Error::UnsupportedCommand)
        }
        (Opcode::ConfigAddr, Body::Job(desc)) => {
            device.config_addr(desc);
            Ok(Reply::None)
        }
        (Opcode::ResetNpu, Body::None) => {
            log::debug!("forced NPU reset");
            device.reset_hw();
            Ok(Reply::None)
        }
        (Opcode::ConfigTimeout, Body::Value(secs)) => {
            device.set_wait_timeout(*secs)?;
            Ok(Reply::None)
        }
        (Opcode::AutoRstEn, Body::Value(enable)) => {
            device.set_auto_reset(*enable != 0)?;
            Ok(Reply::None)
        }
        _ => {
            log::error!("payload does not match opcode {opcode:?}");
            Err(Error::InvalidParameter)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
