//! A bounded OS-thread worker pool implementing [`TaskScheduler`] (§4.4).
//!
//! # Logic (How)
//! `active` counts worker threads that count against `max_parallelism`
//! (busy running a task, or idle waiting for the next one); `suspended`
//! counts workers that called [`TaskScheduler::suspend`] and are parked
//! on some other primitive. `queue` spawns a fresh worker whenever the
//! number of live worker threads is below `max_parallelism`; beyond that
//! it relies on whichever worker becomes idle next to pick the task up
//! from the pending FIFO. `suspend` temporarily lets `active` exceed
//! `max_parallelism` by spawning a replacement worker, and that
//! replacement self-terminates the moment it finishes a unit of work
//! while the pool is over-capacity — this is what prevents a blocked
//! lock holder from starving every other task (§8 invariant 8, scenario
//! S5).

use super::{Runnable, SuspendGuard, TaskScheduler};
use crate::error::{Result, RuntimeError, ThreadingError};
use crate::timing::SchedulerConfig;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::Duration;

struct State {
    pending: VecDeque<Arc<dyn Runnable>>,
    active: usize,
    suspended: usize,
    closing: bool,
    drained: bool,
}

struct Inner {
    max_parallelism: usize,
    keep_alive: Duration,
    state: Mutex<State>,
    cond: Condvar,
    self_handle: OnceLock<Arc<dyn TaskScheduler>>,
}

/// Bounded worker-pool scheduler. Cheap to clone (shares one [`Inner`]).
#[derive(Clone)]
pub struct ConcurrentTaskScheduler(Arc<Inner>);

impl fmt::Debug for ConcurrentTaskScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.0.state.lock().unwrap();
        f.debug_struct("ConcurrentTaskScheduler")
            .field("max_parallelism", &self.0.max_parallelism)
            .field("active", &st.active)
            .field("suspended", &st.suspended)
            .field("pending", &st.pending.len())
            .finish()
    }
}

impl ConcurrentTaskScheduler {
    pub fn new(max_parallelism: usize, keep_alive: Duration) -> Self {
        let max_parallelism = max_parallelism.max(1);
        let inner = Arc::new(Inner {
            max_parallelism,
            keep_alive,
            state: Mutex::new(State {
                pending: VecDeque::new(),
                active: 0,
                suspended: 0,
                closing: false,
                drained: true,
            }),
            cond: Condvar::new(),
            self_handle: OnceLock::new(),
        });
        let scheduler = ConcurrentTaskScheduler(inner);
        let handle: Arc<dyn TaskScheduler> = Arc::new(scheduler.clone());
        // Infallible: nothing else can have set this cell yet.
        let _ = scheduler.0.self_handle.set(handle);
        scheduler
    }

    /// Builds a scheduler from a [`SchedulerConfig`] instead of
    /// positional arguments, for embedders that want to override the
    /// defaults sourced from hardware parallelism.
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self::new(config.max_parallelism, config.keep_alive)
    }

    fn handle(&self) -> Arc<dyn TaskScheduler> {
        Arc::clone(self.0.self_handle.get().expect("scheduler handle initialized in new()"))
    }

    fn maybe_spawn_worker(&self) {
        let mut st = self.0.state.lock().unwrap();
        if st.closing {
            return;
        }
        if st.active + st.suspended < self.0.max_parallelism || st.active == 0 {
            st.active += 1;
            st.drained = false;
            tracing::trace!(active = st.active, suspended = st.suspended, "spawning worker");
            drop(st);
            self.spawn_worker_thread(false);
        }
    }

    fn spawn_worker_thread(&self, is_replacement: bool) {
        let inner = Arc::clone(&self.0);
        let handle = self.handle();
        let builder = std::thread::Builder::new().name("weft-worker".into());
        builder
            .spawn(move || Self::worker_loop(inner, handle, is_replacement))
            .expect("failed to spawn weft worker thread");
    }

    fn worker_loop(inner: Arc<Inner>, handle: Arc<dyn TaskScheduler>, mut is_replacement: bool) {
        super::register(Arc::clone(&handle));
        loop {
            let task = match Self::dequeue(&inner) {
                Some(task) => task,
                None => break,
            };
            let name = task.name();
            tracing::trace!(task = %name, "running task");
            super::bind_current_task(Some(Arc::clone(&task)));
            task.run_synchronously();
            super::bind_current_task(None);

            if is_replacement {
                let mut st = inner.state.lock().unwrap();
                if st.active > inner.max_parallelism {
                    st.active -= 1;
                    if st.active + st.suspended == 0 {
                        st.drained = true;
                        inner.cond.notify_all();
                    }
                    break;
                }
                is_replacement = false;
            }
        }
        super::unregister();
    }

    /// Blocks until a task is available, the keep-alive elapses (worker
    /// retires), or the scheduler is closing and drained.
    fn dequeue(inner: &Inner) -> Option<Arc<dyn Runnable>> {
        let mut st = inner.state.lock().unwrap();
        loop {
            if let Some(task) = st.pending.pop_front() {
                return Some(task);
            }
            if st.closing {
                st.active = st.active.saturating_sub(1);
                if st.active + st.suspended == 0 {
                    st.drained = true;
                    inner.cond.notify_all();
                }
                return None;
            }
            let (guard, timeout) = inner.cond.wait_timeout(st, inner.keep_alive).unwrap();
            st = guard;
            if timeout.timed_out() && st.pending.is_empty() && !st.closing {
                st.active = st.active.saturating_sub(1);
                return None;
            }
        }
    }
}

impl TaskScheduler for ConcurrentTaskScheduler {
    fn queue(&self, task: Arc<dyn Runnable>) -> Result<()> {
        {
            let st = self.0.state.lock().unwrap();
            if st.closing {
                return Err(RuntimeError::Threading(ThreadingError::SchedulerClosed));
            }
        }
        {
            let mut st = self.0.state.lock().unwrap();
            st.pending.push_back(task);
        }
        self.0.cond.notify_one();
        self.maybe_spawn_worker();
        Ok(())
    }

    fn prioritise(&self, task: Arc<dyn Runnable>) -> Result<()> {
        let is_current_worker = super::current_task().is_some()
            && std::ptr::eq(
                Arc::as_ptr(&self.handle()) as *const (),
                Arc::as_ptr(&super::current()) as *const (),
            );
        if is_current_worker {
            task.run_synchronously();
            Ok(())
        } else {
            self.queue(task)
        }
    }

    fn suspend(&self) -> Box<dyn SuspendGuard> {
        let mut st = self.0.state.lock().unwrap();
        st.active = st.active.saturating_sub(1);
        st.suspended += 1;
        let need_replacement = st.active + st.suspended < self.0.max_parallelism || st.active == 0;
        if need_replacement {
            st.active += 1;
        }
        tracing::debug!(active = st.active, suspended = st.suspended, "suspending worker");
        drop(st);
        if need_replacement {
            self.spawn_worker_thread(true);
        }
        Box::new(ConcurrentSuspendGuard { inner: Arc::clone(&self.0) })
    }

    fn close(&self) {
        {
            let mut st = self.0.state.lock().unwrap();
            if st.closing {
                return;
            }
            st.closing = true;
        }
        tracing::debug!(max_parallelism = self.0.max_parallelism, "closing scheduler");
        self.0.cond.notify_all();
        let mut st = self.0.state.lock().unwrap();
        while !st.drained && (st.active + st.suspended) > 0 {
            let (guard, _) = self
                .0
                .cond
                .wait_timeout(st, Duration::from_millis(50))
                .unwrap();
            st = guard;
        }
    }
}

struct ConcurrentSuspendGuard {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConcurrentSuspendGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConcurrentSuspendGuard")
    }
}

impl SuspendGuard for ConcurrentSuspendGuard {}

impl Drop for ConcurrentSuspendGuard {
    fn drop(&mut self) {
        let mut st = self.inner.state.lock().unwrap();
        st.suspended -= 1;
        st.active += 1;
        tracing::debug!(active = st.active, suspended = st.suspended, "resuming worker");
        drop(st);
        self.inner.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        counter: Arc<AtomicUsize>,
    }
    impl Runnable for CountingTask {
        fn run_synchronously(self: Arc<Self>) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> String {
            "counting".into()
        }
    }

    #[test]
    fn runs_all_queued_tasks() {
        let scheduler = ConcurrentTaskScheduler::new(2, Duration::from_millis(200));
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            scheduler
                .queue(Arc::new(CountingTask { counter: Arc::clone(&counter) }))
                .unwrap();
        }
        scheduler.close();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tracing_test::traced_test]
    #[test]
    fn suspend_and_resume_are_logged_at_debug() {
        // Lock::acquire suspends on the ambient scheduler (the global
        // default, since this thread is not a registered worker of any
        // other one) once it has spun past SUSPEND_AFTER uncontended.
        let lock = crate::sync::Lock::non_reentrant();
        assert!(lock.acquire(Some(Duration::ZERO), None).unwrap());
        let other = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.acquire(Some(Duration::from_secs(2)), None).unwrap())
        };
        std::thread::sleep(Duration::from_millis(150));
        lock.release();
        assert!(other.join().unwrap());
        assert!(logs_contain("suspending worker"));
        assert!(logs_contain("resuming worker"));
    }

    /// Scenario S5: with `max_parallelism=1`, a task that suspends while
    /// waiting on another task queued later on the same scheduler must
    /// not deadlock the scheduler — the replacement worker spawned by
    /// `suspend()` has to actually be free to pick up the second task.
    #[test]
    fn suspended_task_does_not_starve_a_later_task_at_parallelism_one() {
        let scheduler = ConcurrentTaskScheduler::new(1, Duration::from_millis(200));
        let lock = crate::sync::Lock::non_reentrant();
        assert!(lock.acquire(Some(Duration::ZERO), None).unwrap());

        struct ReleaseAfterSuspend {
            lock: Arc<crate::sync::Lock>,
        }
        impl Runnable for ReleaseAfterSuspend {
            fn run_synchronously(self: Arc<Self>) {
                // Blocks on a lock already held by the calling thread,
                // forcing this worker to suspend and hand off to a
                // replacement before the lock is ever released.
                self.lock.acquire(Some(Duration::from_secs(2)), None).unwrap();
                self.lock.release();
            }
            fn name(&self) -> String {
                "release-after-suspend".into()
            }
        }

        let ran_second = Arc::new(AtomicUsize::new(0));
        scheduler
            .queue(Arc::new(ReleaseAfterSuspend { lock: Arc::clone(&lock) }))
            .unwrap();
        scheduler
            .queue(Arc::new(CountingTask { counter: Arc::clone(&ran_second) }))
            .unwrap();

        // Give the first task time to block inside acquire() and suspend.
        std::thread::sleep(Duration::from_millis(150));
        // The second task must have run on the replacement worker despite
        // max_parallelism=1 and the first task still being suspended.
        assert_eq!(ran_second.load(Ordering::SeqCst), 1);

        lock.release();
        scheduler.close();
    }

    #[test]
    fn queue_after_close_fails() {
        let scheduler = ConcurrentTaskScheduler::new(1, Duration::from_millis(50));
        scheduler.close();
        let counter = Arc::new(AtomicUsize::new(0));
        let err = scheduler
            .queue(Arc::new(CountingTask { counter }))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Threading(ThreadingError::SchedulerClosed)));
    }
}
