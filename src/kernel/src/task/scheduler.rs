//! Scheduler context shared by the executor and every sync primitive.
//!
//! The [`Scheduler`] owns the task arena, the ready queue and the tick
//! clock. It does not own task bodies; those live in the
//! [`Executor`](super::executor::Executor). Sync primitives receive a
//! `&Scheduler` explicitly and use it to look up the current task, block it,
//! and mark other tasks ready.

use alloc::{sync::Arc, vec::Vec};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use crossbeam_queue::ArrayQueue;
use kestrel_common::{KernelError, Priority, QueuePolicy, TaskId, TaskState};
use kestrel_hal::Timer;
use spin::Mutex;

use super::WaitQueue;

/// Maximum number of live tasks.
pub const MAX_TASKS: usize = 64;

/// Capacity of the lock-free inbox that wakers push into.
pub const WAKE_INBOX_CAPACITY: usize = 4 * MAX_TASKS;

/// Per-task bookkeeping.
#[derive(Debug, Clone, Copy)]
struct TaskControlBlock {
    priority: Priority,
    state: TaskState,
    /// Tick at which a sleeping or time-bounded blocked task becomes ready.
    wake_at: Option<u64>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    tcb: Option<TaskControlBlock>,
}

/// Generational arena of task control blocks.
#[derive(Debug, Default)]
struct TaskTable {
    slots: Vec<Slot>,
}

impl TaskTable {
    fn insert(&mut self, tcb: TaskControlBlock) -> Result<TaskId, KernelError> {
        let index = match self.slots.iter().position(|slot| slot.tcb.is_none()) {
            Some(index) => index,
            None if self.slots.len() < MAX_TASKS => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
            None => return Err(KernelError::TaskTableFull),
        };
        let slot = &mut self.slots[index];
        slot.tcb = Some(tcb);
        Ok(TaskId::new(index as u32, slot.generation))
    }

    fn get(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.tcb.as_ref())
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.tcb.as_mut())
    }

    fn remove(&mut self, id: TaskId) -> Option<TaskControlBlock> {
        let slot = self
            .slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())?;
        let tcb = slot.tcb.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        Some(tcb)
    }

    fn iter(&self) -> impl Iterator<Item = (TaskId, &TaskControlBlock)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.tcb
                .as_ref()
                .map(|tcb| (TaskId::new(index as u32, slot.generation), tcb))
        })
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    tasks: TaskTable,
    ready: WaitQueue,
    current: Option<TaskId>,
    ticks: u64,
}

impl SchedulerState {
    fn make_ready(&mut self, id: TaskId) -> bool {
        let Some(tcb) = self.tasks.get_mut(id) else {
            return false;
        };
        match tcb.state {
            TaskState::Ready | TaskState::Running => {}
            TaskState::Sleeping | TaskState::BlockedOnResource | TaskState::Parked => {
                tcb.state = TaskState::Ready;
                tcb.wake_at = None;
                let priority = tcb.priority;
                self.ready.insert(id, priority, QueuePolicy::Priority);
            }
        }
        true
    }

    fn wake_expired(&mut self) {
        let now = self.ticks;
        let expired: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, tcb)| tcb.wake_at.is_some_and(|at| at <= now))
            .map(|(id, _)| id)
            .collect();
        for id in expired {
            log::trace!("{} deadline reached at tick {}", id, now);
            self.make_ready(id);
        }
    }
}

/// The kernel's scheduling context.
///
/// All state sits behind one spin lock; primitives always take their own
/// lock before this one, and the scheduler never calls back into a
/// primitive.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    wake_inbox: Arc<ArrayQueue<TaskId>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for Scheduler {
    fn current_ticks(&self) -> u64 {
        self.state.lock().ticks
    }
}

impl Scheduler {
    /// Create a scheduler with an empty task table and the clock at tick 0.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            wake_inbox: Arc::new(ArrayQueue::new(WAKE_INBOX_CAPACITY)),
        }
    }

    /// The task currently dispatched, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.state.lock().current
    }

    /// The task currently dispatched.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a dispatched task. Blocking without a
    /// task to block would corrupt the wait queue.
    pub fn expect_current(&self) -> TaskId {
        match self.current_task() {
            Some(id) => id,
            None => panic!("blocking operation called outside of a task"),
        }
    }

    /// Priority of `id`, if it is alive.
    pub fn priority_of(&self, id: TaskId) -> Option<Priority> {
        self.state.lock().tasks.get(id).map(|tcb| tcb.priority)
    }

    /// State of `id`, or `None` once it finished.
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.state.lock().tasks.get(id).map(|tcb| tcb.state)
    }

    /// Number of live tasks.
    pub fn task_count(&self) -> usize {
        self.state.lock().tasks.iter().count()
    }

    /// Mark the current task as blocked on a resource.
    ///
    /// The caller must already have queued the task on the resource and must
    /// return `Poll::Pending` right after. Without a `deadline` the task is
    /// only made ready again by [`mark_ready`](Self::mark_ready).
    pub fn block_current(&self, deadline: Option<u64>) {
        let mut state = self.state.lock();
        let Some(id) = state.current else {
            panic!("blocking operation called outside of a task");
        };
        if let Some(tcb) = state.tasks.get_mut(id) {
            tcb.state = TaskState::BlockedOnResource;
            tcb.wake_at = deadline;
        }
        log::trace!("{} blocked on resource (deadline {:?})", id, deadline);
    }

    /// Make `id` eligible for dispatch.
    ///
    /// Never preempts the caller: the task is only queued. Marking a task
    /// that is already ready or running does nothing.
    pub fn mark_ready(&self, id: TaskId) {
        if self.state.lock().make_ready(id) {
            log::trace!("{} marked ready", id);
        } else {
            log::warn!("mark_ready on unknown {}", id);
        }
    }

    /// Suspend the current task for at least `ticks` ticks.
    ///
    /// `sleep(0)` yields once and resumes on the next dispatch round.
    pub fn sleep(&self, ticks: u64) -> Sleep<'_> {
        Sleep {
            scheduler: self,
            ticks,
            deadline: None,
        }
    }

    /// Advance the clock by one tick and ready every task whose deadline
    /// has been reached. This is what a timer interrupt handler calls.
    pub fn tick(&self) {
        let mut state = self.state.lock();
        state.ticks += 1;
        state.wake_expired();
    }

    /// Earliest pending deadline among sleeping and time-bounded tasks.
    pub fn next_deadline(&self) -> Option<u64> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter_map(|(_, tcb)| tcb.wake_at)
            .min()
    }

    /// Jump the clock forward to `tick` (if it lies ahead) and wake every
    /// expired task. Used by the executor to skip idle periods.
    pub fn advance_to(&self, tick: u64) {
        let mut state = self.state.lock();
        if tick > state.ticks {
            log::debug!("idle: clock {} -> {}", state.ticks, tick);
            state.ticks = tick;
        }
        state.wake_expired();
    }

    /// Tasks currently blocked on a semaphore or condition variable.
    pub fn blocked_tasks(&self) -> Vec<TaskId> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|(_, tcb)| tcb.state == TaskState::BlockedOnResource)
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether any task is queued for dispatch.
    pub fn has_ready(&self) -> bool {
        !self.state.lock().ready.is_empty()
    }

    pub(crate) fn wake_inbox(&self) -> Arc<ArrayQueue<TaskId>> {
        self.wake_inbox.clone()
    }

    /// Register a new task and queue it for dispatch.
    pub(crate) fn register(&self, priority: Priority) -> Result<TaskId, KernelError> {
        let mut state = self.state.lock();
        let id = state.tasks.insert(TaskControlBlock {
            priority,
            state: TaskState::Ready,
            wake_at: None,
        })?;
        state.ready.insert(id, priority, QueuePolicy::Priority);
        Ok(id)
    }

    /// Pop the most urgent ready task and make it current.
    pub(crate) fn dispatch(&self) -> Option<TaskId> {
        let mut state = self.state.lock();
        let id = state.ready.pop_front()?;
        if let Some(tcb) = state.tasks.get_mut(id) {
            tcb.state = TaskState::Running;
        }
        state.current = Some(id);
        Some(id)
    }

    /// Close the dispatch of `id` after its continuation was polled.
    ///
    /// A task still `Running` at this point returned `Pending` without
    /// blocking on a kernel object, so it waits for its waker.
    pub(crate) fn complete_dispatch(&self, id: TaskId, finished: bool) {
        let mut state = self.state.lock();
        state.current = None;
        if finished {
            state.tasks.remove(id);
            return;
        }
        if let Some(tcb) = state.tasks.get_mut(id) {
            if tcb.state == TaskState::Running {
                tcb.state = TaskState::Parked;
            }
        }
    }

    /// Move tasks woken through their waker into the ready queue.
    ///
    /// Only parked tasks are affected. A stale wake can never release a task
    /// blocked on a resource.
    pub(crate) fn drain_wakes(&self) {
        while let Some(id) = self.wake_inbox.pop() {
            let mut state = self.state.lock();
            if state.tasks.get(id).map(|tcb| tcb.state) == Some(TaskState::Parked) {
                state.make_ready(id);
            }
        }
    }

    /// Ready every task whose deadline is not in the future.
    pub(crate) fn wake_expired(&self) {
        self.state.lock().wake_expired();
    }

    fn sleep_current(&self, deadline: u64) {
        let mut state = self.state.lock();
        let Some(id) = state.current else {
            panic!("sleep called outside of a task");
        };
        if let Some(tcb) = state.tasks.get_mut(id) {
            tcb.state = TaskState::Sleeping;
            tcb.wake_at = Some(deadline);
        }
    }
}

/// Future returned by [`Scheduler::sleep`].
pub struct Sleep<'a> {
    scheduler: &'a Scheduler,
    ticks: u64,
    deadline: Option<u64>,
}

impl Future for Sleep<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let now = this.scheduler.current_ticks();
        match this.deadline {
            Some(deadline) if now >= deadline => Poll::Ready(()),
            Some(deadline) => {
                this.scheduler.sleep_current(deadline);
                Poll::Pending
            }
            None => {
                let deadline = now.saturating_add(this.ticks);
                this.deadline = Some(deadline);
                this.scheduler.sleep_current(deadline);
                Poll::Pending
            }
        }
    }
}
