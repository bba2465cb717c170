//! # Job Descriptors
//!
//! The unit of work a client submits: the addresses and sizes of the
//! buffers one NPU job consumes and produces, plus the profiling data
//! the driver fills in at completion.

use obsidian_core::PhysAddr;
use obsidian_hal::BaseAddrs;

// =============================================================================
// BUFFER RANGE
// =============================================================================

/// One buffer role's physical address and size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct BufferRange {
    /// Physical start address
    pub addr: PhysAddr,
    /// Length in bytes
    pub size: u32,
    /// Layout padding; always zero
    pub reserved: u32,
}

impl BufferRange {
    /// Create a range
    pub const fn new(addr: PhysAddr, size: u32) -> Self {
        Self {
            addr,
            size,
            reserved: 0,
        }
    }
}

// =============================================================================
// JOB DESCRIPTOR
// =============================================================================

/// Job descriptor: what a client submits and what `wait` hands back
///
/// Buffer addresses are copied in at submission time and copied back,
/// with `profile` and `interrupt_status` filled in, when `wait` consumes
/// the completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct JobDesc {
    /// Pool slot index; assigned by buffer registration, ignored for
    /// transient submissions
    pub index: u32,
    /// Layout padding; always zero
    pub reserved: u32,
    /// Working/scratch buffer
    pub work: BufferRange,
    /// Instruction stream
    pub inst: BufferRange,
    /// Weights
    pub weight: BufferRange,
    /// Input activations
    pub source: BufferRange,
    /// Output activations
    pub dest: BufferRange,
    /// Constant input
    pub const_input: BufferRange,
    /// Op-cycle count consumed by the job; written at completion
    pub profile: u32,
    /// Raw interrupt status observed at completion
    pub interrupt_status: u32,
}

impl JobDesc {
    /// The base addresses this job programs into the DMA engines
    pub fn base_addrs(&self) -> BaseAddrs {
        BaseAddrs {
            work: self.work.addr,
            inst: self.inst.addr,
            weight: self.weight.addr,
            source: self.source.addr,
            dest: self.dest.addr,
            const_input: self.const_input.addr,
        }
    }
}

// =============================================================================
// SLOT ORIGIN
// =============================================================================

/// Where a job's command buffer slot came from
///
/// Pooled slots persist in the session's registered pool across jobs;
/// a transient slot exists only for the lifetime of its one job record
/// and is released when `wait` consumes it. Ownership is carried by the
/// type, so there is no release call to forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into the session's registered command buffer pool
    Pooled(usize),
    /// One-shot slot allocated at submit time
    Transient,
}

// =============================================================================
// JOB
// =============================================================================

/// A job owned by a session queue
///
/// Lives on exactly one of the queued or done lists at a time and is
/// dropped when `wait` consumes it (or when a drain discards it).
#[derive(Debug)]
pub struct Job {
    /// Slot origin
    pub slot: Slot,
    /// Descriptor snapshot taken at submission
    pub desc: JobDesc,
}

// =============================================================================
// TESTS
// =============================================================================
