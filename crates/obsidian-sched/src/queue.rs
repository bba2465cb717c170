//! # Session Queue
//!
//! Per-session queued and done lists with their counts. List mutation
//! happens under the queue's own lock; the counts are atomics so the
//! scheduler's fairness scan never takes queue locks.

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::job::{Job, JobDesc};

// =============================================================================
// COMMAND QUEUE
// =============================================================================

#[derive(Debug, Default)]
struct QueueLists {
    queued: VecDeque<Job>,
    done: VecDeque<Job>,
}

/// One session's job queue
///
/// Jobs enter `queued` at submission, move to `done` at completion
/// interrupt time, and leave `done` when `wait` consumes them. FIFO
/// order within the session is preserved end to end.
#[derive(Debug, Default)]
pub struct CmdQueue {
    lists: Mutex<QueueLists>,
    queued_count: AtomicUsize,
    done_count: AtomicUsize,
}

impl CmdQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the queued list. Never blocks.
    pub fn enqueue(&self, job: Job) {
        let mut lists = self.lists.lock();
        lists.queued.push_back(job);
        self.queued_count.fetch_add(1, Ordering::Release);
    }

    /// Number of jobs waiting to run
    pub fn queued_count(&self) -> usize {
        self.queued_count.load(Ordering::Acquire)
    }

    /// Whether a completed job is waiting to be consumed
    pub fn has_done(&self) -> bool {
        self.done_count.load(Ordering::Acquire) > 0
    }

    /// Descriptor of the oldest queued job, if any
    pub fn front_queued_desc(&self) -> Option<JobDesc> {
        self.lists.lock().queued.front().map(|job| job.desc)
    }

    /// Move the oldest queued job to the done list, recording its
    /// profiling counter and interrupt status
    ///
    /// Returns `false` if the queued list was unexpectedly empty.
    pub fn complete_oldest(&self, profile: u32, interrupt_status: u32) -> bool {
        let mut lists = self.lists.lock();
        let Some(mut job) = lists.queued.pop_front() else {
            return false;
        };
        self.queued_count.fetch_sub(1, Ordering::Release);

        job.desc.profile = profile;
        job.desc.interrupt_status = interrupt_status;
        lists.done.push_back(job);
        self.done_count.fetch_add(1, Ordering::Release);
        true
    }

    /// Pop the oldest completed job
    pub fn take_done(&self) -> Option<Job> {
        let mut lists = self.lists.lock();
        let job = lists.done.pop_front()?;
        self.done_count.fetch_sub(1, Ordering::Release);
        Some(job)
    }

    /// Discard every queued and done entry
    ///
    /// Returns how many (queued, done) jobs were dropped. Forgetting a
    /// job that is physically executing is the caller's problem; the
    /// device layer resets the hardware before draining the current
    /// session.
    pub fn drain(&self) -> (usize, usize) {
        let mut lists = self.lists.lock();
        let queued = lists.queued.len();
        let done = lists.done.len();
        lists.queued.clear();
        lists.done.clear();
        self.queued_count.fetch_sub(queued, Ordering::Release);
        self.done_count.fetch_sub(done, Ordering::Release);
        (queued, done)
    }
}

// =============================================================================
// TESTS
// =============================================================================
