//! Condition variables paired with a semaphore used as a mutex.

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use kestrel_common::{QueuePolicy, TaskId};
use spin::Mutex;

use super::{AcquireMode, Semaphore};
use crate::task::{Scheduler, WaitQueue};

#[derive(Debug)]
struct CondvarState {
    policy: QueuePolicy,
    waiters: WaitQueue,
}

/// A condition variable. It stores no count, so a notify with nobody
/// waiting is lost.
#[derive(Debug)]
pub struct Condvar {
    state: Mutex<CondvarState>,
}

impl Condvar {
    /// Create a condition variable with an empty wait queue.
    pub const fn new(policy: QueuePolicy) -> Self {
        Self {
            state: Mutex::new(CondvarState {
                policy,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Reset in place. Queued tasks are forgotten and stay blocked.
    pub fn init(&self, policy: QueuePolicy) {
        let mut state = self.state.lock();
        if !state.waiters.is_empty() {
            log::warn!(
                "condvar re-initialized with {} task(s) queued",
                state.waiters.len()
            );
        }
        state.policy = policy;
        state.waiters.clear();
    }

    /// Number of tasks waiting for a notification.
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Release `lock`, wait for a notification, then take `lock` back.
    ///
    /// The caller must hold `lock`. Releasing it and queueing on the
    /// condition happen in the same dispatch, so no notification sent by
    /// another task can slip in between.
    pub async fn wait(&self, scheduler: &Scheduler, lock: &Semaphore) {
        lock.release(scheduler);
        WaitForNotify {
            condvar: self,
            scheduler,
            waiting: None,
        }
        .await;
        lock.acquire(scheduler, AcquireMode::Blocking).await;
    }

    /// Wake the next waiter in policy order. Does nothing if none waits.
    pub fn notify(&self, scheduler: &Scheduler) {
        let task = self.state.lock().waiters.pop_front();
        if let Some(task) = task {
            log::trace!("condvar notify wakes {}", task);
            scheduler.mark_ready(task);
        }
    }

    /// Wake every waiter, in policy order.
    pub fn notify_all(&self, scheduler: &Scheduler) {
        let mut state = self.state.lock();
        while let Some(task) = state.waiters.pop_front() {
            scheduler.mark_ready(task);
        }
    }
}

/// Suspends the current task on the condition until a notify dequeues it.
///
/// Dropped while still queued, it leaves the queue. Dropped after a notify
/// dequeued it, it forwards that notification to the next waiter.
struct WaitForNotify<'a> {
    condvar: &'a Condvar,
    scheduler: &'a Scheduler,
    waiting: Option<TaskId>,
}

impl Future for WaitForNotify<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let task = this.scheduler.expect_current();
        let mut state = this.condvar.state.lock();

        if this.waiting.is_some() {
            if !state.waiters.contains(task) {
                this.waiting = None;
                return Poll::Ready(());
            }
        } else {
            let priority = this.scheduler.priority_of(task).unwrap_or_default();
            let policy = state.policy;
            state.waiters.insert(task, priority, policy);
            this.waiting = Some(task);
        }
        this.scheduler.block_current(None);
        Poll::Pending
    }
}

impl Drop for WaitForNotify<'_> {
    fn drop(&mut self) {
        let Some(task) = self.waiting.take() else {
            return;
        };
        let mut state = self.condvar.state.lock();
        if state.waiters.remove(task) {
            log::trace!("{} abandoned condvar wait", task);
        } else if let Some(next) = state.waiters.pop_front() {
            log::trace!("{} passes condvar notify to {}", task, next);
            self.scheduler.mark_ready(next);
        }
    }
}
