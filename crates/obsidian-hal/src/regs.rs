//! # NPU Register Interface
//!
//! Typed operations over the NPU register block. Offsets and bit layouts
//! follow the accelerator's MMR map; everything above this module works in
//! terms of operations, never raw offsets.

use obsidian_core::PhysAddr;

use crate::mmio::Mmio;

// =============================================================================
// REGISTER OFFSETS
// =============================================================================

/// NPU register block offsets (bytes from the mapped base)
pub mod offsets {
    //! NPU MMR offsets

    /// Hardware version/revision
    pub const VER: u32 = 0x000;
    /// Run control and status (go/continue triggers, pause status)
    pub const RUN: u32 = 0x004;
    /// Interrupt status (write-1-to-clear)
    pub const INT: u32 = 0x008;
    /// Interrupt enable mask
    pub const INTEN: u32 = 0x00C;
    /// Instruction code start address
    pub const CODE: u32 = 0x010;
    /// Instruction code length
    pub const CLEN: u32 = 0x014;

    /// RDMA0 base address (working buffer reads)
    pub const RDMA0_BASE: u32 = 0x040;
    /// WDMA0 base address (working buffer writes)
    pub const WDMA0_BASE: u32 = 0x044;
    /// RDMA1 base address (destination buffer reads)
    pub const RDMA1_BASE: u32 = 0x048;
    /// WDMA1 base address (destination buffer writes)
    pub const WDMA1_BASE: u32 = 0x04C;
    /// RDMA2 base address (source buffer reads)
    pub const RDMA2_BASE: u32 = 0x050;
    /// WDMA2 base address (weight buffer writes)
    pub const WDMA2_BASE: u32 = 0x054;
    /// RDMA3 base address (constant-input reads)
    pub const RDMA3_BASE: u32 = 0x058;
    /// GETW base address (weight fetch)
    pub const GETW_BASE: u32 = 0x05C;

    /// Neural memory arbitration setup
    pub const NMEM: u32 = 0x080;
    /// DMA burst-length setup
    pub const DMA: u32 = 0x084;

    /// Debug/performance monitor configuration
    pub const DBG0: u32 = 0x0A0;
    /// Operation cycle counter (profiling readout)
    pub const DBG1: u32 = 0x0A4;
}

// =============================================================================
// REGISTER BITS
// =============================================================================

bitflags::bitflags! {
    /// RUN register control and status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RunFlags: u32 {
        /// Start executing the programmed job
        const GO = 1 << 0;
        /// Resume a paused job (continue event)
        const CONTINUE = 1 << 1;
        /// Convolution rounding mode
        const CONV_RMODE = 1 << 4;
        /// Pointwise convolution rounding mode
        const PCONV_RMODE = 1 << 5;
        /// Pointwise function rounding mode
        const PFUNC_RMODE = 1 << 6;
        /// Job is paused mid-execution, waiting for a continue event
        const PAUSED = 1 << 17;
    }
}

bitflags::bitflags! {
    /// Interrupt status/enable bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntStatus: u32 {
        /// Job completion
        const DONE = 1 << 0;
        /// All interrupt sources the driver enables
        const ALL = 0x7FFF;
    }
}

/// NMEM arbitration mode field, bits [2:1]
const NMEM_ARB_MASK: u32 = 0x6;
const fn nmem_arb_mode(mode: u32) -> u32 {
    (mode << 1) & NMEM_ARB_MASK
}

/// DMA burst-length field, bits [8:0]
const DMA_BL_MASK: u32 = 0x1FF;
const fn dma_burst_len(len: u32) -> u32 {
    len & DMA_BL_MASK
}

/// Debug port configuration selecting the performance monitor
const DBG0_PERF_MONITOR: u32 = 0x0001_00F0;

// =============================================================================
// BASE ADDRESS SET
// =============================================================================

/// The six buffer base addresses one job programs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseAddrs {
    /// Working/scratch buffer
    pub work: PhysAddr,
    /// Instruction stream
    pub inst: PhysAddr,
    /// Weights
    pub weight: PhysAddr,
    /// Input activations
    pub source: PhysAddr,
    /// Output activations
    pub dest: PhysAddr,
    /// Constant input
    pub const_input: PhysAddr,
}

// =============================================================================
// RESET CONTROL
// =============================================================================

/// Platform reset lines for the NPU power domain
///
/// Pulsing asserts and releases the core/bus reset lines with the core
/// clock gated, returning every MMR to its power-on value. Register
/// reinitialization afterwards is the caller's job.
pub trait ResetControl {
    /// Pulse the reset lines
    fn pulse_reset(&mut self);
}

// =============================================================================
// NPU REGISTER OPERATIONS
// =============================================================================

/// Typed register operations over an MMIO backend
#[derive(Debug)]
pub struct Npu<M: Mmio> {
    mmio: M,
}

impl<M: Mmio> Npu<M> {
    /// Wrap an MMIO backend
    pub fn new(mmio: M) -> Self {
        Self { mmio }
    }

    /// Read the hardware version register
    pub fn hw_version(&self) -> u32 {
        self.mmio.read32(offsets::VER)
    }

    /// One-time register initialization
    ///
    /// Enables all interrupt sources, points the debug port at the
    /// performance monitor, selects NMEM arbitration mode 2, and sets the
    /// DMA burst length to 32. Run after power-on and after every reset.
    pub fn init(&self) {
        self.mmio.write32(offsets::INTEN, IntStatus::ALL.bits());
        self.mmio.write32(offsets::DBG0, DBG0_PERF_MONITOR);

        let mut val = self.mmio.read32(offsets::NMEM);
        val &= !NMEM_ARB_MASK;
        val |= nmem_arb_mode(2);
        self.mmio.write32(offsets::NMEM, val);

        let mut val = self.mmio.read32(offsets::DMA);
        val &= !DMA_BL_MASK;
        val |= dma_burst_len(32);
        self.mmio.write32(offsets::DMA, val);
    }

    /// Program the six buffer base addresses for a job
    pub fn config_base(&self, addrs: &BaseAddrs) {
        self.mmio.write32(offsets::RDMA0_BASE, addrs.work.to_reg());
        self.mmio.write32(offsets::WDMA0_BASE, addrs.work.to_reg());
        self.mmio.write32(offsets::RDMA1_BASE, addrs.dest.to_reg());
        self.mmio.write32(offsets::WDMA1_BASE, addrs.dest.to_reg());
        self.mmio.write32(offsets::RDMA2_BASE, addrs.source.to_reg());
        self.mmio.write32(offsets::WDMA2_BASE, addrs.weight.to_reg());
        self.mmio.write32(offsets::RDMA3_BASE, addrs.const_input.to_reg());
        self.mmio.write32(offsets::GETW_BASE, addrs.weight.to_reg());
        self.mmio.write32(offsets::CODE, addrs.inst.to_reg());
    }

    /// Program the instruction stream length
    pub fn config_inst_length(&self, length: u32) {
        self.mmio.write32(offsets::CLEN, length);
    }

    /// Trigger execution of the programmed job
    pub fn trigger_run(&self) {
        let flags = RunFlags::GO
            | RunFlags::CONV_RMODE
            | RunFlags::PCONV_RMODE
            | RunFlags::PFUNC_RMODE;
        self.mmio.write32(offsets::RUN, flags.bits());
    }

    /// Resume a paused job without reprogramming it
    pub fn trigger_resume(&self) {
        let flags = RunFlags::CONTINUE
            | RunFlags::CONV_RMODE
            | RunFlags::PCONV_RMODE
            | RunFlags::PFUNC_RMODE;
        self.mmio.write32(offsets::RUN, flags.bits());
    }

    /// Whether the hardware is paused mid-job awaiting a continue event
    pub fn is_paused(&self) -> bool {
        let status = self.mmio.read32(offsets::RUN);
        log::trace!("npu run status = {status:#x}");
        RunFlags::from_bits_retain(status).contains(RunFlags::PAUSED)
    }

    /// Acknowledge and clear pending interrupts, returning what was pending
    pub fn intr_clear(&self) -> IntStatus {
        let status = self.mmio.read32(offsets::INT);
        self.mmio.write32(offsets::INT, status);
        IntStatus::from_bits_retain(status)
    }

    /// Read the op-cycle counter for the last completed job
    pub fn read_op_cycle(&self) -> u32 {
        self.mmio.read32(offsets::DBG1)
    }
}

// =============================================================================
// TESTS
// =============================================================================
