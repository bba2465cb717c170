//! # Device Scheduler
//!
//! The single shared NPU and its scheduling state. The device multiplexes
//! one non-preemptible accelerator across every open session: `submit`
//! starts a job immediately when the device is idle, the completion
//! handler advances to the next runnable session, and `wait` blocks a
//! client until its own oldest job finishes.
//!
//! Lock domains, outermost first: the scheduler-state lock (held across
//! every read-current/advance/decide-next sequence), the session table
//! lock, and each session's queue lock. `wait` polls without holding any
//! of them.

use alloc::sync::Arc;

use obsidian_core::{Error, Result, SessionHandle};
use obsidian_hal::{BufferMapper, Mmio, Npu, ResetControl, TimeSource};
use spin::Mutex;

use crate::job::{Job, JobDesc, Slot};
use crate::session::{Session, SessionTable};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Device-wide scheduling configuration
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Wait timeout in whole seconds; 0 waits forever
    pub wait_timeout_secs: u32,
    /// Reset-or-resume policy: reset the hardware before every job
    /// (re)programming unless it is paused mid-job
    pub auto_reset: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 0,
            auto_reset: true,
        }
    }
}

// =============================================================================
// SCHEDULER STATE
// =============================================================================

/// What the accelerator is doing right now
///
/// `Busy(h)` iff a job from session `h` is executing. This is the only
/// cross-session mutable state in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// No job programmed; every session queue is empty
    Idle,
    /// Session `h`'s oldest queued job is executing
    Busy(SessionHandle),
}

/// Hardware plus the scheduler state its lock protects
struct Hw<M: Mmio, R: ResetControl> {
    npu: Npu<M>,
    reset: R,
    state: DeviceState,
    timeout_secs: u32,
    auto_reset: bool,
}

// =============================================================================
// DEVICE
// =============================================================================

/// The shared NPU device
pub struct Device<M: Mmio, R: ResetControl, B: BufferMapper, T: TimeSource> {
    hw: Mutex<Hw<M, R>>,
    sessions: Mutex<SessionTable>,
    mapper: B,
    clock: T,
}

impl<M: Mmio, R: ResetControl, B: BufferMapper, T: TimeSource> Device<M, R, B, T> {
    /// Create the device in the idle state
    pub fn new(npu: Npu<M>, reset: R, mapper: B, clock: T, config: DeviceConfig) -> Self {
        Self {
            hw: Mutex::new(Hw {
                npu,
                reset,
                state: DeviceState::Idle,
                timeout_secs: config.wait_timeout_secs,
                auto_reset: config.auto_reset,
            }),
            sessions: Mutex::new(SessionTable::new()),
            mapper,
            clock,
        }
    }

    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================

    /// Open a session
    ///
    /// The first open performs one-time hardware initialization and
    /// clears the logical busy state.
    pub fn open(&self) -> SessionHandle {
        let mut hw = self.hw.lock();
        let mut sessions = self.sessions.lock();

        let first = sessions.open_count() == 0;
        let handle = sessions.insert();
        if first {
            hw.npu.init();
            hw.state = DeviceState::Idle;
        }

        log::debug!("session {handle:?} opened");
        handle
    }

    /// Close a session, draining its outstanding work and releasing its
    /// buffer pool
    pub fn close(&self, handle: SessionHandle) -> Result<()> {
        let mut hw = self.hw.lock();
        let mut sessions = self.sessions.lock();

        let session = sessions.remove(handle).ok_or(Error::StaleHandle)?;

        let (queued, done) = session.queue().drain();
        if queued + done > 0 {
            log::debug!("session {handle:?} closed with {queued} queued, {done} done jobs");
        }

        if hw.state == DeviceState::Busy(handle) {
            // Hardware may be mid-job on work we just dropped
            hw.reset.pulse_reset();
            hw.npu.init();
            Self::advance(&mut hw, &sessions, None);
        }

        drop(sessions);
        drop(hw);

        session.pool().lock().release(&self.mapper);
        log::debug!("session {handle:?} closed");
        Ok(())
    }

    // =========================================================================
    // JOB SUBMISSION
    // =========================================================================

    /// Submit one job. Returns immediately; completion is observed via
    /// [`Device::wait_complete`].
    pub fn submit(&self, handle: SessionHandle, desc: JobDesc) -> Result<()> {
        let session = self.session(handle)?;

        // Pool lock held through the enqueue so a concurrent
        // re-registration cannot invalidate the slot index in between
        let pool = session.pool().lock();
        let slot = if pool.is_registered() {
            let index = desc.index as usize;
            if index >= pool.len() {
                return Err(Error::InvalidParameter);
            }
            Slot::Pooled(index)
        } else {
            Slot::Transient
        };

        let mut desc = desc;
        desc.profile = 0;
        desc.interrupt_status = 0;

        let mut hw = self.hw.lock();
        if self.sessions.lock().get(handle).is_none() {
            return Err(Error::StaleHandle);
        }

        session.queue().enqueue(Job { slot, desc });

        if hw.state == DeviceState::Idle {
            // Idle means no queue anywhere holds work, so the job just
            // enqueued is the front of this session's queue
            Self::start_job(&mut hw, &desc);
            hw.state = DeviceState::Busy(handle);
            log::trace!("session {handle:?} went from idle to running");
        }

        drop(hw);
        drop(pool);
        Ok(())
    }

    // =========================================================================
    // COMPLETION (INTERRUPT CONTEXT)
    // =========================================================================

    /// Completion interrupt entry point
    ///
    /// Acknowledges the interrupt, retires the current session's oldest
    /// job with its profiling counter, and either starts the next job or
    /// goes idle. The scheduler-state lock is held across the whole
    /// read-current/advance/decide-next sequence.
    pub fn handle_interrupt(&self) {
        let mut hw = self.hw.lock();
        let int_status = hw.npu.intr_clear();

        let DeviceState::Busy(current) = hw.state else {
            // Late interrupt after a timeout or close reset
            log::warn!("completion interrupt while idle, status {int_status:?}");
            return;
        };

        let sessions = self.sessions.lock();
        let profile = hw.npu.read_op_cycle();

        match sessions.get(current) {
            Some(session) => {
                if !session.queue().complete_oldest(profile, int_status.bits()) {
                    log::error!("completion with empty queue on {current:?}");
                }
            }
            None => log::error!("current session {current:?} is gone"),
        }

        Self::advance(&mut hw, &sessions, Some(current));
        // The waiter observes the done list directly; nothing to signal
    }

    // =========================================================================
    // WAITING
    // =========================================================================

    /// Block until the session's oldest job completes, returning its
    /// descriptor with profiling data filled in
    ///
    /// Honors the device-wide timeout; on expiry the session's
    /// outstanding work is cancelled (see `cancel_outstanding`) and
    /// [`Error::Timeout`] is returned.
    pub fn wait_complete(&self, handle: SessionHandle) -> Result<JobDesc> {
        let session = self.session(handle)?;
        let timeout_us = u64::from(self.hw.lock().timeout_secs) * 1_000_000;
        let start = self.clock.now_us();

        loop {
            if let Some(job) = session.queue().take_done() {
                // A transient slot dies with the job record here; pooled
                // slots persist for reuse
                return Ok(job.desc);
            }

            if timeout_us != 0 && self.clock.now_us().saturating_sub(start) >= timeout_us {
                self.cancel_outstanding(handle, &session);
                return Err(Error::Timeout);
            }

            core::hint::spin_loop();
        }
    }

    /// Timeout cancellation: drop the session's bookkeeping and, when its
    /// job is the one on hardware, reset so a late completion interrupt
    /// can never reference the dropped work
    fn cancel_outstanding(&self, handle: SessionHandle, session: &Session) {
        let mut hw = self.hw.lock();

        let (queued, done) = session.queue().drain();
        if queued + done > 0 {
            log::warn!("wait timeout on {handle:?}: dropped {queued} queued, {done} done jobs");
        }

        if hw.state == DeviceState::Busy(handle) {
            hw.reset.pulse_reset();
            hw.npu.init();
            let sessions = self.sessions.lock();
            Self::advance(&mut hw, &sessions, Some(handle));
        }
    }

    // =========================================================================
    // BUFFER REGISTRATION
    // =========================================================================

    /// Pre-register up to 16 command buffer slots for the session,
    /// optionally remapping each slot's ranges into kernel-visible memory
    ///
    /// Assigned slot indices are written back into `descs`. Replacing an
    /// existing pool requires the session to be quiescent; the old pool's
    /// mappings are released first.
    pub fn request_buffers(
        &self,
        handle: SessionHandle,
        descs: &mut [JobDesc],
        remap: bool,
    ) -> Result<()> {
        let session = self.session(handle)?;
        let mut pool = session.pool().lock();

        if pool.is_registered() {
            if session.queue().queued_count() > 0 || session.queue().has_done() {
                return Err(Error::Busy);
            }
            pool.release(&self.mapper);
        }

        pool.register(&self.mapper, descs, remap)?;
        for (i, desc) in descs.iter_mut().enumerate() {
            desc.index = i as u32;
        }
        Ok(())
    }

    // =========================================================================
    // CONTROL OPERATIONS
    // =========================================================================

    /// Set the device-wide wait timeout in seconds (0 = infinite)
    ///
    /// Rejected while a job is executing.
    pub fn set_wait_timeout(&self, secs: u32) -> Result<()> {
        let mut hw = self.hw.lock();
        if let DeviceState::Busy(_) = hw.state {
            log::info!("timeout reconfiguration rejected, device busy");
            return Err(Error::Busy);
        }
        hw.timeout_secs = secs;
        Ok(())
    }

    /// Enable or disable the reset-or-resume policy
    ///
    /// Rejected while a job is executing.
    pub fn set_auto_reset(&self, enabled: bool) -> Result<()> {
        let mut hw = self.hw.lock();
        if let DeviceState::Busy(_) = hw.state {
            log::info!("auto-reset reconfiguration rejected, device busy");
            return Err(Error::Busy);
        }
        hw.auto_reset = enabled;
        Ok(())
    }

    /// Force an immediate hardware reset and reinitialization
    ///
    /// The in-flight job, if any, is killed by the reset but remains the
    /// front of its session's queue; it is restarted to preserve FIFO.
    pub fn reset_hw(&self) {
        let mut hw = self.hw.lock();
        hw.reset.pulse_reset();
        hw.npu.init();

        if let DeviceState::Busy(current) = hw.state {
            let sessions = self.sessions.lock();
            match sessions
                .get(current)
                .and_then(|s| s.queue().front_queued_desc())
            {
                Some(desc) => Self::start_job(&mut hw, &desc),
                None => hw.state = DeviceState::Idle,
            }
        }
    }

    /// Program the job buffer base addresses directly, bypassing the
    /// queue entirely
    pub fn config_addr(&self, desc: &JobDesc) {
        let hw = self.hw.lock();
        hw.npu.config_base(&desc.base_addrs());
    }

    /// Hardware version register
    pub fn hw_version(&self) -> u32 {
        self.hw.lock().npu.hw_version()
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Current scheduler state
    pub fn state(&self) -> DeviceState {
        self.hw.lock().state
    }

    /// Whether a job is executing
    pub fn is_busy(&self) -> bool {
        matches!(self.state(), DeviceState::Busy(_))
    }

    /// Configured wait timeout in seconds
    pub fn wait_timeout_secs(&self) -> u32 {
        self.hw.lock().timeout_secs
    }

    /// Whether the reset-or-resume policy is enabled
    pub fn auto_reset(&self) -> bool {
        self.hw.lock().auto_reset
    }

    /// Number of open sessions
    pub fn session_count(&self) -> u32 {
        self.sessions.lock().open_count()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn session(&self, handle: SessionHandle) -> Result<Arc<Session>> {
        self.sessions.lock().get(handle).ok_or(Error::StaleHandle)
    }

    fn queued(sessions: &SessionTable, handle: SessionHandle) -> usize {
        sessions
            .get(handle)
            .map(|s| s.queue().queued_count())
            .unwrap_or(0)
    }

    /// Pick the session to run after `current`
    ///
    /// Forward from `current` (exclusive) to the end of creation order,
    /// then backward from `current` to the start, then `current` itself.
    /// Later sessions are favored by construction; this is deliberate.
    fn select_next(sessions: &SessionTable, current: SessionHandle) -> Option<SessionHandle> {
        let order = sessions.order();
        let pos = order.iter().position(|&h| h == current)?;

        order[pos + 1..]
            .iter()
            .chain(order[..pos].iter().rev())
            .chain(core::iter::once(&current))
            .copied()
            .find(|&h| Self::queued(sessions, h) > 0)
    }

    /// Move the scheduler to its next state: start the next runnable
    /// session's oldest job, or go idle
    fn advance(hw: &mut Hw<M, R>, sessions: &SessionTable, from: Option<SessionHandle>) {
        let next = match from {
            Some(current) => Self::select_next(sessions, current),
            None => sessions
                .order()
                .iter()
                .copied()
                .find(|&h| Self::queued(sessions, h) > 0),
        };

        let started = next.and_then(|h| {
            sessions
                .get(h)?
                .queue()
                .front_queued_desc()
                .map(|desc| (h, desc))
        });

        hw.state = match started {
            Some((h, desc)) => {
                Self::start_job(hw, &desc);
                DeviceState::Busy(h)
            }
            None => DeviceState::Idle,
        };
    }

    /// Program and trigger one job under the reset-or-resume policy
    fn start_job(hw: &mut Hw<M, R>, desc: &JobDesc) {
        if hw.npu.is_paused() {
            // Mid-job burst boundary: continue, never reprogram
            hw.npu.trigger_resume();
            return;
        }

        if hw.auto_reset {
            hw.reset.pulse_reset();
            hw.npu.init();
        }

        hw.npu.config_base(&desc.base_addrs());
        hw.npu.config_inst_length(desc.inst.size);
        hw.npu.trigger_run();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    extern crate std;

    use obsidian_core::PhysAddr;
    use obsidian_hal::mock::{ManualClock, MockMapper, SoftNpu};
    use obsidian_hal::regs::offsets;
    use obsidian_hal::{IntStatus, Npu};

    use super::*;
    use crate::job::BufferRange;

    type TestDevice = Device<SoftNpu, SoftNpu, MockMapper, ManualClock>;

    struct Rig {
        hw: SoftNpu,
        clock: ManualClock,
        mapper: MockMapper,
        dev: TestDevice,
    }

    fn rig_with(config: DeviceConfig) -> Rig {
        let hw = SoftNpu::new();
        let clock = ManualClock::new();
        let mapper = MockMapper::new();
        let dev = Device::new(
            Npu::new(hw.clone()),
            hw.clone(),
            mapper.clone(),
            clock.clone(),
            config,
        );
        Rig {
            hw,
            clock,
            mapper,
            dev,
        }
    }

    fn rig() -> Rig {
        // Most tests want trigger counting undisturbed by reset pulses
        rig_with(DeviceConfig {
            wait_timeout_secs: 0,
            auto_reset: false,
        })
    }

    fn desc(tag: u64) -> JobDesc {
        JobDesc {
            work: BufferRange::new(PhysAddr::new(tag), 0x100),
            inst: BufferRange::new(PhysAddr::new(tag + 0x1000), 0x80),
            weight: BufferRange::new(PhysAddr::new(tag + 0x2000), 0x100),
            source: BufferRange::new(PhysAddr::new(tag + 0x3000), 0x100),
            dest: BufferRange::new(PhysAddr::new(tag + 0x4000), 0x100),
            const_input: BufferRange::new(PhysAddr::new(tag + 0x5000), 0x40),
            ..JobDesc::default()
        }
    }

    /// Deliver one completion interrupt reporting `cycles`
    fn complete(r: &Rig, cycles: u32) {
        r.hw.set_op_cycles(cycles);
        r.hw.raise_interrupt(IntStatus::DONE);
        r.dev.handle_interrupt();
    }

    // =========================================================================
    // State machine basics
    // =========================================================================

    #[test]
    fn test_idle_submit_starts_immediately() {
        let r = rig();
        let a = r.dev.open();

        r.dev.submit(a, desc(0x10000)).unwrap();

        assert_eq!(r.dev.state(), DeviceState::Busy(a));
        assert_eq!(r.hw.run_count(), 1);
        // The submitted job's instruction stream is what got programmed
        assert_eq!(r.hw.reg(offsets::CODE), 0x11000);
        assert_eq!(r.hw.reg(offsets::CLEN), 0x80);
    }

    #[test]
    fn test_submit_while_busy_only_queues() {
        let r = rig();
        let a = r.dev.open();

        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(a, desc(0x20000)).unwrap();
        r.dev.submit(a, desc(0x30000)).unwrap();

        // At most one job programmed without an intervening completion
        assert_eq!(r.hw.run_count(), 1);
        assert_eq!(r.dev.state(), DeviceState::Busy(a));
    }

    #[test]
    fn test_completion_retires_and_starts_next() {
        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(a, desc(0x20000)).unwrap();

        complete(&r, 777);

        assert_eq!(r.hw.run_count(), 2);
        assert_eq!(r.hw.reg(offsets::CODE), 0x21000);
        assert_eq!(r.dev.state(), DeviceState::Busy(a));

        let done = r.dev.wait_complete(a).unwrap();
        assert_eq!(done.profile, 777);
        assert_eq!(done.interrupt_status, IntStatus::DONE.bits());
    }

    #[test]
    fn test_idle_transition_after_last_job() {
        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();

        complete(&r, 1);
        assert_eq!(r.dev.state(), DeviceState::Idle);

        // A fresh submit goes straight back to busy with one trigger
        let runs_before = r.hw.run_count();
        r.dev.submit(a, desc(0x20000)).unwrap();
        assert_eq!(r.dev.state(), DeviceState::Busy(a));
        assert_eq!(r.hw.run_count(), runs_before + 1);
    }

    #[test]
    fn test_interrupt_while_idle_is_ignored() {
        let r = rig();
        let a = r.dev.open();

        r.hw.raise_interrupt(IntStatus::DONE);
        r.dev.handle_interrupt();

        assert_eq!(r.dev.state(), DeviceState::Idle);
        // Acknowledged regardless
        assert_eq!(r.hw.reg(offsets::INT), 0);
        let _ = a;
    }

    // =========================================================================
    // FIFO and fairness
    // =========================================================================

    #[test]
    fn test_fifo_within_one_session() {
        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(a, desc(0x20000)).unwrap();
        r.dev.submit(a, desc(0x30000)).unwrap();

        complete(&r, 1);
        complete(&r, 2);
        complete(&r, 3);

        assert_eq!(r.dev.wait_complete(a).unwrap().work.addr.raw(), 0x10000);
        assert_eq!(r.dev.wait_complete(a).unwrap().work.addr.raw(), 0x20000);
        assert_eq!(r.dev.wait_complete(a).unwrap().work.addr.raw(), 0x30000);
    }

    #[test]
    fn test_forward_scan_runs_later_session_first() {
        // Session A submits 3 jobs, B submits 1 while A's first runs.
        // Expected completion order: A1, B1, A2, A3.
        let r = rig();
        let a = r.dev.open();
        let b = r.dev.open();

        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(a, desc(0x20000)).unwrap();
        r.dev.submit(a, desc(0x30000)).unwrap();
        r.dev.submit(b, desc(0xB0000)).unwrap();

        complete(&r, 1); // A1 done -> forward scan picks B
        assert_eq!(r.dev.state(), DeviceState::Busy(b));
        assert_eq!(r.hw.reg(offsets::CODE), 0xB1000);

        complete(&r, 2); // B1 done -> backward scan picks A
        assert_eq!(r.dev.state(), DeviceState::Busy(a));

        complete(&r, 3); // A2 done -> A again
        assert_eq!(r.dev.state(), DeviceState::Busy(a));

        complete(&r, 4); // A3 done -> idle
        assert_eq!(r.dev.state(), DeviceState::Idle);

        assert_eq!(r.dev.wait_complete(a).unwrap().work.addr.raw(), 0x10000);
        assert_eq!(r.dev.wait_complete(b).unwrap().work.addr.raw(), 0xB0000);
        assert_eq!(r.dev.wait_complete(a).unwrap().work.addr.raw(), 0x20000);
        assert_eq!(r.dev.wait_complete(a).unwrap().work.addr.raw(), 0x30000);
    }

    #[test]
    fn test_backward_scan_when_nothing_ahead() {
        let r = rig();
        let a = r.dev.open();
        let _b = r.dev.open();
        let c = r.dev.open();

        // C runs first; only A has more work. Forward from C finds
        // nothing; backward finds A.
        r.dev.submit(c, desc(0xC0000)).unwrap();
        r.dev.submit(a, desc(0xA0000)).unwrap();

        complete(&r, 1);
        assert_eq!(r.dev.state(), DeviceState::Busy(a));
    }

    #[test]
    fn test_current_session_retained_as_last_resort() {
        let r = rig();
        let _a = r.dev.open();
        let b = r.dev.open();

        r.dev.submit(b, desc(0x10000)).unwrap();
        r.dev.submit(b, desc(0x20000)).unwrap();

        complete(&r, 1);
        // Nobody else has work; B keeps the device
        assert_eq!(r.dev.state(), DeviceState::Busy(b));
    }

    #[test]
    fn test_liveness_every_session_served() {
        let r = rig();
        let handles: std::vec::Vec<_> = (0..4).map(|_| r.dev.open()).collect();

        for (i, &h) in handles.iter().enumerate() {
            r.dev.submit(h, desc(0x10000 * (i as u64 + 1))).unwrap();
        }

        // N sessions with one job each: N completions serve everyone
        for _ in 0..4 {
            complete(&r, 9);
        }
        assert_eq!(r.dev.state(), DeviceState::Idle);

        for &h in &handles {
            assert!(r.dev.wait_complete(h).is_ok());
        }
    }

    // =========================================================================
    // Reset-or-resume policy
    // =========================================================================

    #[test]
    fn test_auto_reset_pulses_before_programming() {
        let r = rig_with(DeviceConfig {
            wait_timeout_secs: 0,
            auto_reset: true,
        });
        let a = r.dev.open();

        r.dev.submit(a, desc(0x10000)).unwrap();
        assert_eq!(r.hw.reset_count(), 1);

        r.dev.submit(a, desc(0x20000)).unwrap();
        complete(&r, 1);
        assert_eq!(r.hw.reset_count(), 2);
    }

    #[test]
    fn test_no_reset_when_policy_disabled() {
        let r = rig();
        let a = r.dev.open();

        r.dev.submit(a, desc(0x10000)).unwrap();
        complete(&r, 1);

        assert_eq!(r.hw.reset_count(), 0);
    }

    #[test]
    fn test_paused_hardware_is_resumed_not_reset() {
        let r = rig_with(DeviceConfig {
            wait_timeout_secs: 0,
            auto_reset: true,
        });
        let a = r.dev.open();

        r.hw.set_paused(true);
        r.dev.submit(a, desc(0x10000)).unwrap();

        // Resume, no reset, no reprogramming
        assert_eq!(r.hw.resume_count(), 1);
        assert_eq!(r.hw.run_count(), 0);
        assert_eq!(r.hw.reset_count(), 0);
        assert_eq!(r.hw.reg(offsets::CODE), 0);
    }

    // =========================================================================
    // Waiting and timeout
    // =========================================================================

    #[test]
    fn test_wait_returns_profile_without_blocking_when_done() {
        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        complete(&r, 31415);

        let done = r.dev.wait_complete(a).unwrap();
        assert_eq!(done.profile, 31415);
    }

    #[test]
    fn test_blocking_wait_wakes_on_completion() {
        use std::sync::Arc as StdArc;

        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();

        let dev = StdArc::new(r.dev);
        let waiter = {
            let dev = StdArc::clone(&dev);
            std::thread::spawn(move || dev.wait_complete(a))
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        r.hw.set_op_cycles(555);
        r.hw.raise_interrupt(IntStatus::DONE);
        dev.handle_interrupt();

        let done = waiter.join().unwrap().unwrap();
        assert_eq!(done.profile, 555);
    }

    #[test]
    fn test_wait_timeout_drains_and_resets() {
        // Timeout 2 s; the completion interrupt never fires.
        let r = rig_with(DeviceConfig {
            wait_timeout_secs: 2,
            auto_reset: false,
        });
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(a, desc(0x20000)).unwrap();

        let clock = r.clock.clone();
        let ticker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            clock.advance_us(2_000_001);
        });

        let err = r.dev.wait_complete(a);
        ticker.join().unwrap();

        assert_eq!(err, Err(Error::Timeout));
        // Both lists were drained: the device went idle and the second
        // queued job is gone
        assert_eq!(r.dev.state(), DeviceState::Idle);
        assert_eq!(r.hw.reset_count(), 1);

        // A fresh submit starts immediately and programs the new job,
        // not the dropped one
        r.dev.submit(a, desc(0x90000)).unwrap();
        assert_eq!(r.dev.state(), DeviceState::Busy(a));
        assert_eq!(r.hw.reg(offsets::CODE), 0x91000);
    }

    #[test]
    fn test_timeout_resets_hardware_and_goes_idle() {
        let r = rig_with(DeviceConfig {
            wait_timeout_secs: 1,
            auto_reset: false,
        });
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        assert_eq!(r.dev.state(), DeviceState::Busy(a));

        let clock = r.clock.clone();
        let ticker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            clock.advance_us(1_000_001);
        });
        assert_eq!(r.dev.wait_complete(a), Err(Error::Timeout));
        ticker.join().unwrap();

        assert_eq!(r.dev.state(), DeviceState::Idle);
        assert_eq!(r.hw.reset_count(), 1);

        // A late interrupt from the forgotten job is harmless
        r.hw.raise_interrupt(IntStatus::DONE);
        r.dev.handle_interrupt();
        assert_eq!(r.dev.state(), DeviceState::Idle);

        // And the device accepts new work
        r.dev.submit(a, desc(0x30000)).unwrap();
        assert_eq!(r.dev.state(), DeviceState::Busy(a));
    }

    #[test]
    fn test_timeout_advances_to_other_session() {
        let r = rig_with(DeviceConfig {
            wait_timeout_secs: 1,
            auto_reset: false,
        });
        let a = r.dev.open();
        let b = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(b, desc(0xB0000)).unwrap();

        let clock = r.clock.clone();
        let ticker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            clock.advance_us(1_000_001);
        });
        assert_eq!(r.dev.wait_complete(a), Err(Error::Timeout));
        ticker.join().unwrap();

        // B's job was started after the reset
        assert_eq!(r.dev.state(), DeviceState::Busy(b));
        assert_eq!(r.hw.reg(offsets::CODE), 0xB1000);
    }

    #[test]
    fn test_timeout_of_non_current_session_leaves_hardware_alone() {
        let r = rig_with(DeviceConfig {
            wait_timeout_secs: 1,
            auto_reset: false,
        });
        let a = r.dev.open();
        let b = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();

        // B has nothing queued and times out; A's run is untouched
        let clock = r.clock.clone();
        let ticker = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            clock.advance_us(1_000_001);
        });
        assert_eq!(r.dev.wait_complete(b), Err(Error::Timeout));
        ticker.join().unwrap();

        assert_eq!(r.dev.state(), DeviceState::Busy(a));
        assert_eq!(r.hw.reset_count(), 0);
    }

    // =========================================================================
    // Pool interactions
    // =========================================================================

    #[test]
    fn test_pool_and_transient_submissions_are_equivalent() {
        let r = rig();
        let pooled = r.dev.open();
        let transient = r.dev.open();

        let mut regs = [desc(0x10000)];
        r.dev.request_buffers(pooled, &mut regs, false).unwrap();

        let mut d = desc(0x10000);
        d.index = 0;
        r.dev.submit(pooled, d).unwrap();
        r.dev.submit(transient, desc(0x10000)).unwrap();

        complete(&r, 42);
        complete(&r, 42);

        let from_pool = r.dev.wait_complete(pooled).unwrap();
        let from_transient = r.dev.wait_complete(transient).unwrap();

        assert_eq!(from_pool.profile, from_transient.profile);
        assert_eq!(from_pool.interrupt_status, from_transient.interrupt_status);
    }

    #[test]
    fn test_submit_with_bad_pool_index() {
        let r = rig();
        let a = r.dev.open();
        let mut regs = [desc(0x10000), desc(0x20000)];
        r.dev.request_buffers(a, &mut regs, false).unwrap();

        let mut d = desc(0x30000);
        d.index = 5;
        assert_eq!(r.dev.submit(a, d), Err(Error::InvalidParameter));
        assert_eq!(r.dev.state(), DeviceState::Idle);
    }

    #[test]
    fn test_reregistration_rejected_with_outstanding_work() {
        let r = rig();
        let a = r.dev.open();
        let mut regs = [desc(0x10000)];
        r.dev.request_buffers(a, &mut regs, false).unwrap();

        let mut d = desc(0x10000);
        d.index = 0;
        r.dev.submit(a, d).unwrap();

        let mut again = [desc(0x50000)];
        assert_eq!(
            r.dev.request_buffers(a, &mut again, false),
            Err(Error::Busy)
        );
    }

    #[test]
    fn test_reregistration_replaces_when_quiescent() {
        let r = rig();
        let a = r.dev.open();

        let mut regs = [desc(0x10000), desc(0x20000)];
        r.dev.request_buffers(a, &mut regs, true).unwrap();
        assert_eq!(r.mapper.live_mappings(), 8);

        let mut again = [desc(0x50000)];
        r.dev.request_buffers(a, &mut again, true).unwrap();

        // Old pool fully unmapped, new pool mapped
        assert_eq!(r.mapper.live_mappings(), 4);
        assert_eq!(again[0].index, 0);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn test_first_open_initializes_hardware_once() {
        let r = rig();
        let _a = r.dev.open();
        assert_eq!(r.hw.reg(offsets::INTEN), 0x7FFF);

        // Second open must not reinitialize
        r.hw.write32(offsets::INTEN, 0);
        let _b = r.dev.open();
        assert_eq!(r.hw.reg(offsets::INTEN), 0);
    }

    #[test]
    fn test_close_releases_pool_mappings() {
        let r = rig();
        let a = r.dev.open();
        let mut regs = [desc(0x10000), desc(0x20000)];
        r.dev.request_buffers(a, &mut regs, true).unwrap();
        assert_eq!(r.mapper.live_mappings(), 8);

        r.dev.close(a).unwrap();
        assert_eq!(r.mapper.live_mappings(), 0);
    }

    #[test]
    fn test_close_of_running_session_advances() {
        let r = rig();
        let a = r.dev.open();
        let b = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        r.dev.submit(b, desc(0xB0000)).unwrap();

        r.dev.close(a).unwrap();

        assert_eq!(r.hw.reset_count(), 1);
        assert_eq!(r.dev.state(), DeviceState::Busy(b));
        assert_eq!(r.dev.session_count(), 1);
    }

    #[test]
    fn test_stale_handle_is_rejected_everywhere() {
        let r = rig();
        let a = r.dev.open();
        r.dev.close(a).unwrap();

        assert_eq!(r.dev.submit(a, desc(0x10000)), Err(Error::StaleHandle));
        assert_eq!(r.dev.wait_complete(a).err(), Some(Error::StaleHandle));
        assert_eq!(r.dev.close(a), Err(Error::StaleHandle));
        let mut regs = [desc(0x10000)];
        assert_eq!(
            r.dev.request_buffers(a, &mut regs, false),
            Err(Error::StaleHandle)
        );
    }

    // =========================================================================
    // Control operations
    // =========================================================================

    #[test]
    fn test_timeout_reconfiguration_rejected_while_busy() {
        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();

        assert_eq!(r.dev.set_wait_timeout(5), Err(Error::Busy));
        assert_eq!(r.dev.set_auto_reset(false), Err(Error::Busy));

        complete(&r, 1);
        r.dev.set_wait_timeout(5).unwrap();
        assert_eq!(r.dev.wait_timeout_secs(), 5);
        r.dev.set_auto_reset(true).unwrap();
        assert!(r.dev.auto_reset());
    }

    #[test]
    fn test_forced_reset_restarts_current_job() {
        let r = rig();
        let a = r.dev.open();
        r.dev.submit(a, desc(0x10000)).unwrap();
        assert_eq!(r.hw.run_count(), 1);

        r.dev.reset_hw();

        assert_eq!(r.hw.reset_count(), 1);
        // The killed job is retriggered to preserve FIFO
        assert_eq!(r.hw.run_count(), 2);
        assert_eq!(r.dev.state(), DeviceState::Busy(a));
    }

    #[test]
    fn test_config_addr_bypasses_scheduling() {
        let r = rig();
        let _a = r.dev.open();

        r.dev.config_addr(&desc(0x70000));

        assert_eq!(r.hw.reg(offsets::CODE), 0x71000);
        assert_eq!(r.dev.state(), DeviceState::Idle);
        assert_eq!(r.hw.run_count(), 0);
    }
}
