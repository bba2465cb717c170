//! # Time Source
//!
//! Monotonic clock consumed by bounded waits in the scheduler.

/// Monotonic microsecond clock
///
/// The platform wires this to its clocksource. The wait path compares
/// `now_us` readings against a deadline while spinning; nothing else in
/// the driver keeps time.
pub trait TimeSource {
    /// Current monotonic time in microseconds
    fn now_us(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}
