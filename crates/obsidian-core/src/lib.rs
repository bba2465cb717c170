//! # OBSIDIAN Core
//!
//! Foundational types shared across the NPU driver stack.
//!
//! This crate carries no hardware knowledge and no scheduling policy. It
//! provides:
//! - The unified [`Error`] type and [`Result`] alias
//! - Strongly typed physical addresses ([`PhysAddr`])
//! - Generation-checked session handles ([`SessionHandle`])

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use types::{PhysAddr, SessionHandle};
