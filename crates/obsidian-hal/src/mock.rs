//! # Hardware Test Doubles
//!
//! Software stand-ins for the MMIO region, the remap primitive, and the
//! clock, so the full scheduling pipeline runs on the host. Completion
//! interrupts are delivered by the test calling the driver's interrupt
//! entry point directly.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use obsidian_core::{Error, PhysAddr, Result};
use spin::Mutex;

use crate::mmio::Mmio;
use crate::regs::{offsets, IntStatus, ResetControl, RunFlags};
use crate::remap::{BufferMapper, Remap};
use crate::time::TimeSource;

// =============================================================================
// SOFT REGISTER FILE
// =============================================================================

const REG_WORDS: usize = 64;

#[derive(Debug)]
struct SoftState {
    regs: [u32; REG_WORDS],
    run_count: u32,
    resume_count: u32,
    reset_count: u32,
}

/// Software NPU register file
///
/// Models the register behaviors the driver depends on: write-1-to-clear
/// interrupt status, the sticky PAUSED status bit, and GO/CONTINUE
/// trigger counting for at-most-one-running assertions. Clones share the
/// same register file.
#[derive(Debug, Clone)]
pub struct SoftNpu {
    state: Arc<Mutex<SoftState>>,
}

impl SoftNpu {
    /// Create a register file in power-on state
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SoftState {
                regs: [0; REG_WORDS],
                run_count: 0,
                resume_count: 0,
                reset_count: 0,
            })),
        }
    }

    /// Raw register value
    pub fn reg(&self, offset: u32) -> u32 {
        self.state.lock().regs[(offset / 4) as usize]
    }

    /// Latch or clear the PAUSED status bit
    pub fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        let run = &mut state.regs[(offsets::RUN / 4) as usize];
        if paused {
            *run |= RunFlags::PAUSED.bits();
        } else {
            *run &= !RunFlags::PAUSED.bits();
        }
    }

    /// Latch pending interrupt status bits
    pub fn raise_interrupt(&self, status: IntStatus) {
        let mut state = self.state.lock();
        state.regs[(offsets::INT / 4) as usize] |= status.bits();
    }

    /// Set the op-cycle counter the next completion will report
    pub fn set_op_cycles(&self, cycles: u32) {
        let mut state = self.state.lock();
        state.regs[(offsets::DBG1 / 4) as usize] = cycles;
    }

    /// Number of GO triggers observed
    pub fn run_count(&self) -> u32 {
        self.state.lock().run_count
    }

    /// Number of CONTINUE triggers observed
    pub fn resume_count(&self) -> u32 {
        self.state.lock().resume_count
    }

    /// Number of reset pulses observed
    pub fn reset_count(&self) -> u32 {
        self.state.lock().reset_count
    }
}

impl Default for SoftNpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmio for SoftNpu {
    fn read32(&self, offset: u32) -> u32 {
        self.state.lock().regs[(offset / 4) as usize]
    }

    fn write32(&self, offset: u32, value: u32) {
        let mut state = self.state.lock();
        match offset {
            offsets::RUN => {
                let flags = RunFlags::from_bits_retain(value);
                if flags.contains(RunFlags::GO) {
                    state.run_count += 1;
                }
                if flags.contains(RunFlags::CONTINUE) {
                    state.resume_count += 1;
                    // A continue event releases the pause latch
                    state.regs[(offsets::RUN / 4) as usize] &= !RunFlags::PAUSED.bits();
                }
                let paused = state.regs[(offsets::RUN / 4) as usize] & RunFlags::PAUSED.bits();
                state.regs[(offsets::RUN / 4) as usize] = value | paused;
            }
            offsets::INT => {
                // Write-1-to-clear
                state.regs[(offsets::INT / 4) as usize] &= !value;
            }
            _ => state.regs[(offset / 4) as usize] = value,
        }
    }
}

impl ResetControl for SoftNpu {
    fn pulse_reset(&mut self) {
        let mut state = self.state.lock();
        state.reset_count += 1;
        state.regs = [0; REG_WORDS];
    }
}

// =============================================================================
// MOCK BUFFER MAPPER
// =============================================================================

#[derive(Debug)]
struct MapperState {
    live: u32,
    total_maps: u32,
    total_unmaps: u32,
    fail_after: Option<u32>,
}

/// Counting buffer mapper
///
/// Hands out fabricated, never-dereferenced mapping tokens and tracks
/// map/unmap balance. Can be armed to fail after a number of successful
/// maps to exercise partial-registration failures.
#[derive(Debug, Clone)]
pub struct MockMapper {
    state: Arc<Mutex<MapperState>>,
}

impl MockMapper {
    /// Create a mapper that never fails
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MapperState {
                live: 0,
                total_maps: 0,
                total_unmaps: 0,
                fail_after: None,
            })),
        }
    }

    /// Fail every map after `n` successful ones
    pub fn fail_after(&self, n: u32) {
        self.state.lock().fail_after = Some(n);
    }

    /// Mappings currently outstanding
    pub fn live_mappings(&self) -> u32 {
        self.state.lock().live
    }

    /// Total successful maps
    pub fn total_maps(&self) -> u32 {
        self.state.lock().total_maps
    }

    /// Total unmaps
    pub fn total_unmaps(&self) -> u32 {
        self.state.lock().total_unmaps
    }
}

impl Default for MockMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferMapper for MockMapper {
    fn map(&self, _addr: PhysAddr, size: u32) -> Result<Remap> {
        let mut state = self.state.lock();
        if let Some(limit) = state.fail_after {
            if state.total_maps >= limit {
                return Err(Error::RemapFailed);
            }
        }
        state.total_maps += 1;
        state.live += 1;
        let token = (0x1000u64 + state.total_maps as u64 * 0x1000) as *mut u8;
        // SAFETY: token pointers are opaque here; nothing dereferences them
        Ok(unsafe { Remap::new(token, size) })
    }

    fn unmap(&self, _mapping: Remap) {
        let mut state = self.state.lock();
        state.live -= 1;
        state.total_unmaps += 1;
    }
}

// =============================================================================
// MANUAL CLOCK
// =============================================================================

/// Manually advanced monotonic clock
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock
    pub fn advance_us(&self, us: u64) {
        self.us.fetch_add(us, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_us(&self) -> u64 {
        self.us.load(Ordering::SeqCst)
    }
}

// =============================================================================
// TESTS
// =============================================================================
