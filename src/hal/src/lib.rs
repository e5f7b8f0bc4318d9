//! Kestrel Hardware Abstraction Layer (HAL) traits.
//!
//! This crate defines traits that abstract away platform-specific hardware details.

#![no_std]

/// Trait for a system timer.
///
/// The scheduler's tick clock implements this; on hardware the count is
/// advanced by the timer interrupt.
pub trait Timer {
    /// Returns the number of ticks since the system started.
    fn current_ticks(&self) -> u64;
}
