//! # Command Buffer Pool
//!
//! The per-session table of pre-registered job slots. A session either
//! registers up to [`MAX_POOL_SLOTS`] slots up front and submits by
//! index, or skips registration and gets one transient slot per job.

use arrayvec::ArrayVec;
use obsidian_core::{Error, Result};
use obsidian_hal::{BufferMapper, Remap};

use crate::job::JobDesc;

/// Maximum number of slots a session may register
pub const MAX_POOL_SLOTS: usize = 16;

// =============================================================================
// POOL SLOT
// =============================================================================

/// Kernel-visible mappings of one slot's four remappable ranges
#[derive(Debug)]
struct SlotMappings {
    inst: Remap,
    weight: Remap,
    source: Remap,
    dest: Remap,
}

/// One registered command buffer slot
#[derive(Debug)]
pub struct PoolSlot {
    desc: JobDesc,
    mappings: Option<SlotMappings>,
}

impl PoolSlot {
    /// The descriptor registered for this slot
    pub fn desc(&self) -> &JobDesc {
        &self.desc
    }

    /// Whether the slot's ranges are mapped into kernel-visible memory
    pub fn is_mapped(&self) -> bool {
        self.mappings.is_some()
    }
}

// =============================================================================
// COMMAND BUFFER POOL
// =============================================================================

/// A session's registered slots
///
/// Empty until the session registers buffers. Slot state is
/// zero-initialized at registration; mappings (if requested) live until
/// the pool is released at session close or replacement.
#[derive(Debug, Default)]
pub struct CmdPool {
    slots: ArrayVec<PoolSlot, MAX_POOL_SLOTS>,
}

impl CmdPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session has registered a pool
    pub fn is_registered(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Number of registered slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up a slot by index
    pub fn get(&self, index: usize) -> Option<&PoolSlot> {
        self.slots.get(index)
    }

    /// Register `descs` as indexed slots, optionally remapping each
    /// slot's instruction/weight/source/destination ranges
    ///
    /// On a remap failure the call fails with the slots registered so far
    /// left in place, mappings intact; there is no cross-slot rollback.
    /// The failing slot itself is not retained.
    pub fn register<B: BufferMapper>(
        &mut self,
        mapper: &B,
        descs: &[JobDesc],
        remap: bool,
    ) -> Result<()> {
        debug_assert!(self.slots.is_empty());

        if descs.is_empty() || descs.len() > MAX_POOL_SLOTS {
            return Err(Error::PoolTooLarge);
        }

        for (i, desc) in descs.iter().enumerate() {
            let mut slot_desc = *desc;
            slot_desc.index = i as u32;
            slot_desc.profile = 0;
            slot_desc.interrupt_status = 0;

            let mappings = if remap {
                Some(Self::map_slot(mapper, &slot_desc)?)
            } else {
                None
            };

            self.slots.push(PoolSlot {
                desc: slot_desc,
                mappings,
            });
        }

        Ok(())
    }

    /// Map one slot's four remappable ranges, unwinding the slot's own
    /// partial mappings on failure
    fn map_slot<B: BufferMapper>(mapper: &B, desc: &JobDesc) -> Result<SlotMappings> {
        let inst = mapper.map(desc.inst.addr, desc.inst.size)?;

        let weight = match mapper.map(desc.weight.addr, desc.weight.size) {
            Ok(m) => m,
            Err(e) => {
                mapper.unmap(inst);
                return Err(e);
            }
        };

        let source = match mapper.map(desc.source.addr, desc.source.size) {
            Ok(m) => m,
            Err(e) => {
                mapper.unmap(inst);
                mapper.unmap(weight);
                return Err(e);
            }
        };

        let dest = match mapper.map(desc.dest.addr, desc.dest.size) {
            Ok(m) => m,
            Err(e) => {
                mapper.unmap(inst);
                mapper.unmap(weight);
                mapper.unmap(source);
                return Err(e);
            }
        };

        Ok(SlotMappings {
            inst,
            weight,
            source,
            dest,
        })
    }

    /// Release every slot, returning mappings to the mapper
    pub fn release<B: BufferMapper>(&mut self, mapper: &B) {
        for slot in self.slots.drain(..) {
            if let Some(m) = slot.mappings {
                mapper.unmap(m.inst);
                mapper.unmap(m.weight);
                mapper.unmap(m.source);
                mapper.unmap(m.dest);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
