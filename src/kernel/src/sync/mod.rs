//! Synchronization primitives for kernel tasks.
//!
//! Both primitives are built on the same suspend/wake mechanism: a task that
//! cannot proceed queues its [`TaskId`](crate::task::TaskId) on the
//! primitive, is marked
//! [`BlockedOnResource`](crate::task::TaskState::BlockedOnResource) and
//! yields. A later release or notify dequeues exactly one task in the
//! primitive's [`QueuePolicy`](crate::task::QueuePolicy) order and marks it
//! ready without preempting the caller.
//!
//! # Primitives
//!
//! - [`Semaphore`]: counting semaphore, also used as the kernel mutex
//! - [`Condvar`]: condition variable paired with a semaphore-as-mutex
//!
//! Every operation takes the [`Scheduler`](crate::task::Scheduler)
//! explicitly; there is no global task state.
//!
//! # Example
//!
//! ```ignore
//! use kestrel_kernel::sync::{AcquireMode, Condvar, Semaphore};
//! use kestrel_kernel::task::QueuePolicy;
//!
//! let lock = Semaphore::new(1, QueuePolicy::Fifo);
//! let data_ready = Condvar::new(QueuePolicy::Priority);
//!
//! // consumer task
//! lock.acquire(sched, AcquireMode::Blocking).await;
//! while queue_is_empty() {
//!     data_ready.wait(sched, &lock).await;
//! }
//! lock.release(sched);
//!
//! // producer task
//! lock.acquire(sched, AcquireMode::Blocking).await;
//! push_item();
//! data_ready.notify(sched);
//! lock.release(sched);
//! ```

mod condvar;
mod semaphore;

pub use condvar::Condvar;
pub use semaphore::{AcquireMode, Semaphore};
