//! # OBSIDIAN Scheduling Pipeline
//!
//! Job admission, fair session selection, and interrupt-driven completion
//! for a single non-preemptible NPU.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Job Scheduling Pipeline                      │
//! │                                                                  │
//! │  ┌───────────┐     ┌─────────────┐     ┌──────────────────┐     │
//! │  │  submit   │────▶│  Session    │────▶│     Device       │     │
//! │  │ (client)  │     │   Queue     │     │   Scheduler      │     │
//! │  └───────────┘     │ (FIFO/pool) │     │ {Idle, Busy(h)}  │     │
//! │                    └─────────────┘     └────────┬─────────┘     │
//! │  ┌───────────┐                                  │               │
//! │  │   wait    │◀───── done list ◀────┐  ┌────────▼─────────┐     │
//! │  │ (client)  │                      └──│   Completion     │     │
//! │  └───────────┘                         │ Handler (IRQ)    │     │
//! │                                        └──────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submission Flow
//!
//! 1. A client submits a job descriptor into its session's queue
//! 2. If the device is idle the job is programmed and triggered at once
//! 3. The completion interrupt moves the job to the done list and picks
//!    the next session by forward-then-backward scan of creation order
//! 4. `wait` consumes the oldest done job and returns its profiling data

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod device;
pub mod job;
pub mod pool;
pub mod queue;
pub mod session;

// Re-exports
pub use device::{Device, DeviceConfig, DeviceState};
pub use job::{BufferRange, Job, JobDesc, Slot};
pub use pool::{CmdPool, MAX_POOL_SLOTS};
pub use queue::CmdQueue;
pub use session::{Session, SessionTable};
