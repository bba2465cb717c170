//! # OBSIDIAN Hardware Access Layer
//!
//! Register-level interface to the NPU, kept deliberately narrow so the
//! scheduling pipeline above it never touches raw offsets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   obsidian-sched                            │
//! │      (admission / selection / completion pipeline)          │
//! └───────────────┬──────────────────┬──────────────┬───────────┘
//!                 │                  │              │
//!        ┌────────▼───────┐  ┌───────▼──────┐  ┌────▼────────┐
//!        │   Npu<M: Mmio> │  │ BufferMapper │  │ TimeSource  │
//!        │ (typed reg ops)│  │   (remap)    │  │ (deadlines) │
//!        └────────┬───────┘  └──────────────┘  └─────────────┘
//!                 │
//!        ┌────────▼───────┐
//!        │  Mmio backend  │  platform MMIO region or test double
//!        └────────────────┘
//! ```
//!
//! The platform supplies the mapped register region, the remap primitive,
//! and the monotonic clock; tests supply software doubles of all three.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod mmio;
pub mod regs;
pub mod remap;
pub mod time;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-exports
pub use mmio::{Mmio, MmioRegion};
pub use regs::{BaseAddrs, IntStatus, Npu, ResetControl, RunFlags};
pub use remap::{BufferMapper, Remap};
pub use time::TimeSource;
