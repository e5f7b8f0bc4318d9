//! Counting semaphore with a policy-ordered wait queue.

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use kestrel_common::{KernelError, QueuePolicy, TaskId};
use kestrel_hal::Timer;
use spin::Mutex;

use crate::task::{Scheduler, WaitQueue};

/// How [`Semaphore::acquire`] behaves when no unit is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Fail immediately, without side effects.
    Poll,
    /// Queue the task and block until a release hands it a unit.
    Blocking,
    /// Sleep the given number of ticks, recheck, and repeat until a unit is
    /// free. The same interval is reused on every round, so this never
    /// fails. The task is not queued, so releases do not wake it early.
    /// An interval of 0 is rounded up to one tick.
    Retry(u64),
    /// Like [`Blocking`](Self::Blocking), but give up once the given number
    /// of ticks has passed.
    Timeout(u64),
}

impl AcquireMode {
    /// Decode the classic integer timeout argument: negative means poll,
    /// zero means block forever, anything else is a retry interval.
    pub fn from_timeout(timeout: i32) -> Self {
        match timeout {
            t if t < 0 => AcquireMode::Poll,
            0 => AcquireMode::Blocking,
            t => AcquireMode::Retry(t as u64),
        }
    }
}

#[derive(Debug)]
struct SemaphoreState {
    count: usize,
    /// `None` for the classic unbounded semaphore.
    max: Option<usize>,
    policy: QueuePolicy,
    waiters: WaitQueue,
}

/// A counting semaphore for tasks on one [`Scheduler`].
///
/// The semaphore owns only its queue. Queued entries are task ids; the
/// tasks themselves belong to the scheduler.
///
/// # Example
///
/// ```ignore
/// static LOCK: Semaphore = Semaphore::new(1, QueuePolicy::Fifo);
///
/// // inside a task:
/// LOCK.acquire(sched, AcquireMode::Blocking).await;
/// // ... critical section ...
/// LOCK.release(sched);
/// ```
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
}

impl Semaphore {
    /// Create a semaphore holding `count` units, with no upper bound.
    pub const fn new(count: usize, policy: QueuePolicy) -> Self {
        Self {
            state: Mutex::new(SemaphoreState {
                count,
                max: None,
                policy,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Create a semaphore whose count may never exceed `max`.
    pub const fn with_max(initial: usize, max: usize, policy: QueuePolicy) -> Self {
        debug_assert!(initial <= max, "initial count cannot exceed max");
        Self {
            state: Mutex::new(SemaphoreState {
                count: initial,
                max: Some(max),
                policy,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Reset the semaphore in place, as if freshly created with
    /// [`new`](Self::new).
    ///
    /// Tasks still queued are forgotten and stay blocked.
    pub fn init(&self, count: usize, policy: QueuePolicy) {
        let mut state = self.state.lock();
        if !state.waiters.is_empty() {
            log::warn!(
                "semaphore re-initialized with {} task(s) queued",
                state.waiters.len()
            );
        }
        state.count = count;
        state.max = None;
        state.policy = policy;
        state.waiters.clear();
    }

    /// Units currently available.
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Queue admission policy.
    pub fn policy(&self) -> QueuePolicy {
        self.state.lock().policy
    }

    /// Number of tasks blocked on this semaphore.
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Take a unit if one is free. Never suspends.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Take one unit, waiting as `mode` dictates.
    ///
    /// Resolves to `false` only in [`AcquireMode::Poll`] and
    /// [`AcquireMode::Timeout`] modes.
    ///
    /// # Panics
    ///
    /// The blocking modes panic when polled outside of a task.
    pub async fn acquire(&self, scheduler: &Scheduler, mode: AcquireMode) -> bool {
        match mode {
            AcquireMode::Poll => self.try_acquire(),
            AcquireMode::Retry(ticks) => loop {
                if self.try_acquire() {
                    return true;
                }
                scheduler.sleep(ticks.max(1)).await;
            },
            AcquireMode::Blocking => SemaphoreAcquireFuture::new(self, scheduler, None).await,
            AcquireMode::Timeout(ticks) => {
                let deadline = scheduler.current_ticks().saturating_add(ticks);
                SemaphoreAcquireFuture::new(self, scheduler, Some(deadline)).await
            }
        }
    }

    /// Return one unit and wake the next waiter, if any.
    ///
    /// Never suspends and never preempts the caller: the woken task only
    /// becomes ready. On a semaphore built with [`with_max`](Self::with_max)
    /// a release past the cap is logged and dropped; use
    /// [`try_release`](Self::try_release) to observe it.
    pub fn release(&self, scheduler: &Scheduler) {
        if let Err(err) = self.try_release(scheduler) {
            log::warn!("release ignored: {}", err);
        }
    }

    /// Return one unit, rejecting a release that would exceed the cap.
    pub fn try_release(&self, scheduler: &Scheduler) -> Result<(), KernelError> {
        let mut state = self.state.lock();
        if let Some(max) = state.max {
            if state.count >= max {
                return Err(KernelError::SemaphoreOverflow { max });
            }
        }
        state.count += 1;
        if let Some(task) = state.waiters.pop_front() {
            log::trace!("semaphore release wakes {}", task);
            scheduler.mark_ready(task);
        }
        Ok(())
    }
}

/// Blocking half of [`Semaphore::acquire`].
///
/// Each poll is one turn of the acquire loop: take a unit if there is one,
/// otherwise make sure the task is queued and block it. The task is polled
/// again only after a release (or its deadline) made it ready.
///
/// Dropping the future before it resolves takes the task off the queue. If
/// a release already dequeued it, the wakeup passes to the next waiter.
struct SemaphoreAcquireFuture<'a> {
    semaphore: &'a Semaphore,
    scheduler: &'a Scheduler,
    deadline: Option<u64>,
    /// Set while the task has queued itself and not yet resolved.
    waiting: Option<TaskId>,
}

impl<'a> SemaphoreAcquireFuture<'a> {
    fn new(semaphore: &'a Semaphore, scheduler: &'a Scheduler, deadline: Option<u64>) -> Self {
        Self {
            semaphore,
            scheduler,
            deadline,
            waiting: None,
        }
    }
}

impl Future for SemaphoreAcquireFuture<'_> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<bool> {
        let this = self.get_mut();
        let task = this.scheduler.expect_current();
        let mut state = this.semaphore.state.lock();

        if state.count > 0 {
            state.count -= 1;
            // Still queued if the deadline woke us before a release did.
            state.waiters.remove(task);
            this.waiting = None;
            return Poll::Ready(true);
        }

        if let Some(deadline) = this.deadline {
            if this.scheduler.current_ticks() >= deadline {
                state.waiters.remove(task);
                this.waiting = None;
                log::trace!("{} gave up on semaphore at tick {}", task, deadline);
                return Poll::Ready(false);
            }
        }

        if !state.waiters.contains(task) {
            let priority = this.scheduler.priority_of(task).unwrap_or_default();
            let policy = state.policy;
            state.waiters.insert(task, priority, policy);
        }
        this.waiting = Some(task);
        this.scheduler.block_current(this.deadline);
        Poll::Pending
    }
}

impl Drop for SemaphoreAcquireFuture<'_> {
    fn drop(&mut self) {
        let Some(task) = self.waiting.take() else {
            return;
        };
        let mut state = self.semaphore.state.lock();
        if state.waiters.remove(task) {
            log::trace!("{} abandoned semaphore wait", task);
            return;
        }
        // A release picked this task; its unit is still on the count.
        if state.count > 0 {
            if let Some(next) = state.waiters.pop_front() {
                log::trace!("{} passes semaphore wakeup to {}", task, next);
                self.scheduler.mark_ready(next);
            }
        }
    }
}
