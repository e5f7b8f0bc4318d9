//! Task management: identities, wait queues, the scheduler context and the
//! executor that drives task bodies.
//!
//! A task body is a future. When a task blocks, its future returns
//! `Poll::Pending` with the task marked blocked in the [`Scheduler`]; that
//! pending future *is* the suspended continuation. Once something calls
//! [`Scheduler::mark_ready`], the [`Executor`] polls it again and the
//! blocked operation picks up where it stopped.

use alloc::boxed::Box;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

pub mod executor;
pub mod scheduler;
mod wait_queue;

pub use executor::Executor;
pub use kestrel_common::{Priority, QueuePolicy, TaskId, TaskState};
pub use scheduler::{Scheduler, Sleep, MAX_TASKS};
pub use wait_queue::WaitQueue;

/// Yields execution to allow other tasks to run.
///
/// Returns `Pending` once, wakes itself, then returns `Ready`. The task goes
/// to the back of its priority level.
pub async fn yield_now() {
    YieldNow { yielded: false }.await
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// A task body bound to its id.
pub(crate) struct Task<'a> {
    id: TaskId,
    future: Pin<Box<dyn Future<Output = ()> + 'a>>,
}

impl<'a> Task<'a> {
    pub(crate) fn new(id: TaskId, future: impl Future<Output = ()> + 'a) -> Task<'a> {
        Task {
            id,
            future: Box::pin(future),
        }
    }

    /// Poll the task's future.
    pub(crate) fn poll(&mut self, context: &mut Context) -> Poll<()> {
        log::trace!("polling {}", self.id);
        self.future.as_mut().poll(context)
    }
}
