//! # Sessions
//!
//! One session per open client handle, held in a generation-checked
//! arena so a stale handle can never reach freed session state. The
//! arena also keeps the creation-ordered list the fairness scan walks.

use alloc::sync::Arc;
use alloc::vec::Vec;

use obsidian_core::SessionHandle;
use spin::Mutex;

use crate::pool::CmdPool;
use crate::queue::CmdQueue;

// =============================================================================
// SESSION
// =============================================================================

/// Per-client scheduling state
#[derive(Debug, Default)]
pub struct Session {
    queue: CmdQueue,
    pool: Mutex<CmdPool>,
}

impl Session {
    /// Create a fresh session with an empty queue and no pool
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's job queue
    pub fn queue(&self) -> &CmdQueue {
        &self.queue
    }

    /// The session's command buffer pool
    pub fn pool(&self) -> &Mutex<CmdPool> {
        &self.pool
    }
}

// =============================================================================
// SESSION TABLE
// =============================================================================

#[derive(Debug, Default)]
struct TableSlot {
    generation: u32,
    session: Option<Arc<Session>>,
}

/// Generation-checked session arena plus creation order
///
/// Slots are recycled; removal bumps the slot generation so handles
/// issued for the old occupant stop resolving. `order` preserves
/// creation order for the scheduler's forward/backward scan.
#[derive(Debug, Default)]
pub struct SessionTable {
    slots: Vec<TableSlot>,
    order: Vec<SessionHandle>,
    open_count: u32,
}

impl SessionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session, returning its handle
    pub fn insert(&mut self) -> SessionHandle {
        let session = Arc::new(Session::new());

        let index = match self.slots.iter().position(|slot| slot.session.is_none()) {
            Some(free) => free,
            None => {
                self.slots.push(TableSlot::default());
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.session = Some(session);
        let handle = SessionHandle::new(index as u32, slot.generation);
        self.order.push(handle);
        self.open_count += 1;
        handle
    }

    /// Resolve a handle, failing the generation check for stale ones
    pub fn get(&self, handle: SessionHandle) -> Option<Arc<Session>> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.session.clone()
    }

    /// Remove a session, bumping the slot generation
    pub fn remove(&mut self, handle: SessionHandle) -> Option<Arc<Session>> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let session = slot.session.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.order.retain(|&h| h != handle);
        self.open_count -= 1;
        Some(session)
    }

    /// Live handles in creation order
    pub fn order(&self) -> &[SessionHandle] {
        &self.order
    }

    /// Number of open sessions
    pub fn open_count(&self) -> u32 {
        self.open_count
    }
}

// =============================================================================
// TESTS
// =============================================================================
