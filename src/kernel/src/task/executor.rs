//! A cooperative executor that drives task continuations.

use super::{Scheduler, Task, TaskId};
use alloc::{collections::BTreeMap, sync::Arc};
use core::{
    future::Future,
    task::{Context, Waker},
};
use crossbeam_queue::ArrayQueue;
use futures_util::task::ArcWake;
use kestrel_common::{KernelError, Priority};

/// Runs tasks one dispatch at a time, in the order the scheduler picks.
///
/// Task bodies may borrow anything that outlives the executor, which is how
/// semaphores and condition variables in caller-owned storage are shared
/// between tasks.
pub struct Executor<'a> {
    scheduler: &'a Scheduler,
    tasks: BTreeMap<TaskId, Task<'a>>,
    waker_cache: BTreeMap<TaskId, Waker>,
}

impl<'a> Executor<'a> {
    /// Create an executor bound to `scheduler`.
    pub fn new(scheduler: &'a Scheduler) -> Self {
        Executor {
            scheduler,
            tasks: BTreeMap::new(),
            waker_cache: BTreeMap::new(),
        }
    }

    /// Spawn a new task on the executor. It becomes ready immediately.
    pub fn spawn(
        &mut self,
        priority: Priority,
        future: impl Future<Output = ()> + 'a,
    ) -> Result<TaskId, KernelError> {
        let id = self.scheduler.register(priority)?;
        if self.tasks.insert(id, Task::new(id, future)).is_some() {
            panic!("task with same ID already in tasks");
        }
        log::debug!("spawned {} at priority {}", id, priority.value());
        Ok(id)
    }

    /// Dispatch the most urgent ready task once.
    ///
    /// Returns `false` when no task was ready.
    pub fn step(&mut self) -> bool {
        let scheduler = self.scheduler;
        scheduler.drain_wakes();
        let Some(task_id) = scheduler.dispatch() else {
            return false;
        };

        let finished = match self.tasks.get_mut(&task_id) {
            Some(task) => {
                let waker = self
                    .waker_cache
                    .entry(task_id)
                    .or_insert_with(|| TaskWaker::new(task_id, scheduler.wake_inbox()));
                let mut context = Context::from_waker(waker);
                task.poll(&mut context).is_ready()
            }
            // task no longer exists
            None => true,
        };

        if finished {
            self.tasks.remove(&task_id);
            self.waker_cache.remove(&task_id);
            log::debug!("{} finished", task_id);
        }
        scheduler.complete_dispatch(task_id, finished);
        scheduler.drain_wakes();
        scheduler.wake_expired();
        true
    }

    /// Dispatch tasks until none is ready. The clock is left untouched.
    pub fn run_until_stalled(&mut self) {
        while self.step() {}
    }

    /// Run until every task has finished, skipping the clock forward over
    /// idle periods.
    ///
    /// Fails with [`KernelError::Deadlock`] when tasks remain but none can
    /// ever become ready again.
    pub fn run(&mut self) -> Result<(), KernelError> {
        loop {
            self.run_until_stalled();
            if self.tasks.is_empty() {
                return Ok(());
            }
            match self.scheduler.next_deadline() {
                Some(deadline) => self.scheduler.advance_to(deadline),
                None => {
                    let blocked = self.tasks.len();
                    log::warn!("{} task(s) can no longer make progress", blocked);
                    return Err(KernelError::Deadlock { blocked });
                }
            }
        }
    }

    /// Whether `id` has run to completion.
    pub fn is_finished(&self, id: TaskId) -> bool {
        !self.tasks.contains_key(&id)
    }

    /// Number of tasks not yet finished.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

struct TaskWaker {
    task_id: TaskId,
    task_queue: Arc<ArrayQueue<TaskId>>,
}

impl TaskWaker {
    #[allow(clippy::new_ret_no_self)]
    fn new(task_id: TaskId, task_queue: Arc<ArrayQueue<TaskId>>) -> Waker {
        futures_util::task::waker(Arc::new(TaskWaker {
            task_id,
            task_queue,
        }))
    }
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self
            .task_queue
            .push(arc_self.task_id)
            .expect("wake inbox full");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::yield_now;
    use alloc::{rc::Rc, vec::Vec};
    use core::cell::RefCell;
    use kestrel_common::TaskState;
    use kestrel_hal::Timer;

    #[test]
    fn test_runs_most_urgent_first() {
        let sched = Scheduler::new();
        let log = RefCell::new(Vec::new());
        let mut exec = Executor::new(&sched);

        exec.spawn(Priority::new(7), async { log.borrow_mut().push(7) })
            .unwrap();
        exec.spawn(Priority::new(1), async { log.borrow_mut().push(1) })
            .unwrap();
        exec.spawn(Priority::new(4), async { log.borrow_mut().push(4) })
            .unwrap();
        exec.run().unwrap();

        assert_eq!(*log.borrow(), [1, 4, 7]);
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn test_yield_round_robins_equal_priorities() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut exec = Executor::new(&sched);

        for name in ['a', 'b'] {
            let log = log.clone();
            exec.spawn(Priority::DEFAULT, async move {
                for round in 0..2 {
                    log.borrow_mut().push((name, round));
                    yield_now().await;
                }
            })
            .unwrap();
        }
        exec.run().unwrap();

        assert_eq!(*log.borrow(), [('a', 0), ('b', 0), ('a', 1), ('b', 1)]);
    }

    #[test]
    fn test_sleep_advances_idle_clock() {
        let sched = Scheduler::new();
        let mut exec = Executor::new(&sched);
        let task = exec
            .spawn(Priority::DEFAULT, async {
                sched.sleep(25).await;
            })
            .unwrap();

        exec.run_until_stalled();
        assert_eq!(sched.task_state(task), Some(TaskState::Sleeping));

        exec.run().unwrap();
        assert!(exec.is_finished(task));
        assert_eq!(sched.current_ticks(), 25);
    }

    #[test]
    fn test_sleep_zero_only_yields() {
        let sched = Scheduler::new();
        let mut exec = Executor::new(&sched);
        let task = exec
            .spawn(Priority::DEFAULT, async {
                sched.sleep(0).await;
            })
            .unwrap();

        exec.run_until_stalled();
        assert!(exec.is_finished(task));
        assert_eq!(sched.current_ticks(), 0);
    }

    #[test]
    fn test_forever_pending_task_is_reported() {
        let sched = Scheduler::new();
        let mut exec = Executor::new(&sched);
        exec.spawn(Priority::DEFAULT, core::future::pending())
            .unwrap();

        assert_eq!(exec.run(), Err(KernelError::Deadlock { blocked: 1 }));
        assert_eq!(exec.task_count(), 1);
    }
}
