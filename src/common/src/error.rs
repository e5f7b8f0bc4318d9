//! System-wide error types for Kestrel.

use core::fmt;

/// Errors reported by the kernel's task and synchronization layer.
///
/// A failed non-blocking acquire is *not* an error; it is reported as `false`
/// by the acquire call itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KernelError {
    /// Every slot of the task table is occupied.
    TaskTableFull,
    /// A release would push a capped semaphore past its maximum.
    SemaphoreOverflow {
        /// The cap the semaphore was built with.
        max: usize,
    },
    /// No task is runnable, no timer is pending, and some tasks are still
    /// blocked on a resource.
    Deadlock {
        /// Number of tasks left blocked.
        blocked: usize,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::TaskTableFull => write!(f, "task table full"),
            KernelError::SemaphoreOverflow { max } => {
                write!(f, "semaphore release exceeds maximum count {}", max)
            }
            KernelError::Deadlock { blocked } => {
                write!(f, "deadlock: {} task(s) blocked with nothing runnable", blocked)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_display_includes_details() {
        assert_eq!(
            KernelError::SemaphoreOverflow { max: 4 }.to_string(),
            "semaphore release exceeds maximum count 4"
        );
        assert_eq!(
            KernelError::Deadlock { blocked: 2 }.to_string(),
            "deadlock: 2 task(s) blocked with nothing runnable"
        );
    }
}
