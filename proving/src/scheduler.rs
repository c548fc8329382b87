//! Deferred execution of test runs.
//!
//! A [`Suite`](crate::Suite) never calls the next test's `run` directly from
//! the previous test's teardown; it hands the call to a [`Scheduler`]. Which
//! one is used is picked by [`Scheduling`](crate::Scheduling) or injected with
//! [`SuiteBuilder::scheduler`](crate::SuiteBuilder::scheduler).

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use crate::Scheduling;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Runs tasks later, or now.
pub trait Scheduler {
    fn schedule(&self, task: Task);

    /// Runs `task` once `delay` has elapsed.
    ///
    /// Returns `false` if delayed execution is not supported, in which case
    /// the task is dropped without running.
    fn schedule_after(&self, delay: Duration, task: Task) -> bool {
        let _ = (delay, task);
        false
    }
}

/// Runs every task synchronously, in the caller's stack frame.
///
/// A long suite nests one test run inside the previous one's teardown.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl Scheduler for Immediate {
    fn schedule(&self, task: Task) {
        task();
    }
}

/// Runs tasks synchronously, but never inside another task.
///
/// A task scheduled while one is executing is queued and runs after the
/// current one returns, so the stack stays flat and a test body has always
/// returned before the next one starts.
#[derive(Default)]
pub struct Queued {
    queue: RefCell<VecDeque<Task>>,
    draining: Cell<bool>,
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Scheduler for Queued {
    fn schedule(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
        if self.draining.replace(true) {
            return;
        }
        let _guard = DrainGuard(&self.draining);
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(task) = next else { break };
            task();
        }
    }
}

/// Spawns tasks on the current `tokio::task::LocalSet`.
///
/// Test bodies can then hand `done` to other local tasks and finish
/// asynchronously. Supports [`Scheduler::schedule_after`], which makes
/// [`Config::with_test_timeout`](crate::Config::with_test_timeout) effective.
///
/// # Panics
///
/// Scheduling panics when called outside a `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Local;

impl Scheduler for Local {
    fn schedule(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> bool {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        true
    }
}

pub(crate) fn for_scheduling(scheduling: Scheduling) -> Rc<dyn Scheduler> {
    match scheduling {
        Scheduling::Immediate => Rc::new(Immediate),
        Scheduling::Queued => Rc::new(Queued::default()),
        Scheduling::Local => Rc::new(Local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let task = move |name: &'static str| -> Task {
            let l = l.clone();
            Box::new(move || l.borrow_mut().push(name))
        };
        (log, task)
    }

    #[test]
    fn immediate_nests_tasks() {
        let scheduler = Rc::new(Immediate);
        let (log, task) = recorder();
        let (l, s) = (log.clone(), scheduler.clone());
        scheduler.schedule(Box::new(move || {
            l.borrow_mut().push("outer start");
            s.schedule(task("inner"));
            l.borrow_mut().push("outer end");
        }));
        assert_eq!(*log.borrow(), ["outer start", "inner", "outer end"]);
    }

    #[test]
    fn queued_runs_nested_tasks_after_the_current_one() {
        let scheduler = Rc::new(Queued::default());
        let (log, task) = recorder();
        let (l, s) = (log.clone(), scheduler.clone());
        scheduler.schedule(Box::new(move || {
            l.borrow_mut().push("outer start");
            s.schedule(task("inner"));
            s.schedule(task("second"));
            l.borrow_mut().push("outer end");
        }));
        assert_eq!(
            *log.borrow(),
            ["outer start", "outer end", "inner", "second"]
        );
    }

    #[test]
    fn queued_recovers_after_a_panicking_task() {
        let scheduler = Queued::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scheduler.schedule(Box::new(|| panic!("task failed")));
        }));
        assert!(result.is_err());

        let (log, task) = recorder();
        scheduler.schedule(task("after"));
        assert_eq!(*log.borrow(), ["after"]);
    }

    #[test]
    fn synchronous_schedulers_do_not_delay() {
        let (log, task) = recorder();
        assert!(!Immediate.schedule_after(Duration::from_millis(1), task("never")));
        assert!(!Queued::default().schedule_after(Duration::from_millis(1), task("never")));
        assert!(log.borrow().is_empty());
    }

    #[tokio::test]
    async fn local_spawns_on_the_local_set() {
        let local = tokio::task::LocalSet::new();
        let (log, task) = recorder();
        local
            .run_until(async {
                Local.schedule(task("spawned"));
                assert!(log.borrow().is_empty());
                tokio::time::sleep(Duration::from_millis(5)).await;
            })
            .await;
        assert_eq!(*log.borrow(), ["spawned"]);
    }

    #[tokio::test]
    async fn local_supports_delays() {
        let local = tokio::task::LocalSet::new();
        let (log, task) = recorder();
        local
            .run_until(async {
                assert!(Local.schedule_after(Duration::from_millis(5), task("late")));
                Local.schedule(task("early"));
                tokio::time::sleep(Duration::from_millis(30)).await;
            })
            .await;
        assert_eq!(*log.borrow(), ["early", "late"]);
    }
}
