//! Task identity, priority and state as seen by the synchronization layer.

use core::fmt;

/// A reference to a slot in the kernel's task arena.
///
/// The generation changes every time a slot is reused, so an id held by a
/// wait queue after its task finished never aliases a newer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl TaskId {
    /// Build an id from an arena index and the slot's generation.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}.{}", self.index, self.generation)
    }
}

/// Task priority. A *lower* value means a *more urgent* task.
///
/// The derived ordering follows the numeric value, so sorting ascending puts
/// the most urgent task first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Priority(u8);

impl Priority {
    /// Most urgent priority.
    pub const HIGHEST: Priority = Priority(0);
    /// Least urgent priority.
    pub const LOWEST: Priority = Priority(u8::MAX);
    /// Priority given to tasks spawned without an explicit one.
    pub const DEFAULT: Priority = Priority(128);

    /// Create a priority from its raw value.
    pub const fn new(value: u8) -> Self {
        Priority(value)
    }

    /// Raw value.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether `self` should be served before `other`.
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

/// Admission and removal order of a wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueuePolicy {
    /// Arrival order.
    #[default]
    Fifo,
    /// Task priority order, ties broken by arrival order.
    Priority,
}

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskState {
    /// Eligible for dispatch.
    Ready,
    /// Currently dispatched.
    Running,
    /// Delayed until a tick deadline.
    Sleeping,
    /// Queued on a semaphore or condition variable. Only a release or notify
    /// (or the deadline of a bounded acquire) makes it ready again.
    BlockedOnResource,
    /// Pending on a generic waker, e.g. after `yield_now`.
    Parked,
}

impl TaskState {
    /// Whether the task is waiting for something before it can run again.
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            TaskState::Sleeping | TaskState::BlockedOnResource | TaskState::Parked
        )
    }
}
