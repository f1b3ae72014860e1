//! The task scheduler contract and the process-wide default instance.
//!
//! # Design background (Why)
//! A scheduler is the only thing allowed to run a task's body. Every
//! synchronization primitive that might block (`Event::wait`, `Lock`,
//! `Semaphore`, `ProducerConsumerQueue::take`) needs a way to tell
//! *whichever scheduler owns the current worker* that it is about to
//! block, so that scheduler can keep its pool's useful parallelism at the
//! configured ceiling (§4.4). That means the scheduler trait has to be
//! object-safe and globally reachable from arbitrary code, not just from
//! code that was handed a scheduler handle explicitly — hence the
//! thread-local registry in this module.
//!
//! # Contract (What)
//! - [`Runnable`] is the only thing a scheduler needs to know about a
//!   task: "run me to completion on this thread". `Task<T>` implements
//!   it; the scheduler module itself never needs to know `T`.
//! - [`TaskScheduler::current`] / [`current_task`] read the calling
//!   thread's registry entry, falling back to the lazily-initialized
//!   default scheduler when the thread is not a worker of any scheduler.
//! - [`TaskScheduler::suspend`] returns a guard; dropping the guard is
//!   the resume half of the contract (see [`crate::scheduler::concurrent`]
//!   for the concrete mechanics).

mod concurrent;

pub use concurrent::ConcurrentTaskScheduler;

use crate::error::Result;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Anything a scheduler can run to completion on a worker thread.
///
/// Implemented by `Task<T>` for every `T`; the scheduler never needs to
/// be generic over a task's result type.
pub trait Runnable: Send + Sync + 'static {
    /// Runs this unit of work synchronously on the calling thread.
    fn run_synchronously(self: Arc<Self>);

    /// A human-readable name, used only for worker-thread naming and logs.
    fn name(&self) -> String;
}

/// An opaque token returned by [`TaskScheduler::suspend`]; releasing it
/// (by dropping) resumes the current worker.
pub trait SuspendGuard: fmt::Debug {}

/// The scheduler contract (§4.4). Implementations must be `Send + Sync`
/// so a handle can be shared across the tasks it schedules.
pub trait TaskScheduler: Send + Sync + 'static {
    /// Queues `task` for execution, FIFO with respect to other tasks
    /// queued on the same scheduler. Fails with
    /// [`crate::error::ThreadingError::SchedulerClosed`] if `close` has
    /// already been called.
    fn queue(&self, task: Arc<dyn Runnable>) -> Result<()>;

    /// Runs `task` inline if called from within a worker of this
    /// scheduler; otherwise falls back to `queue`.
    fn prioritise(&self, task: Arc<dyn Runnable>) -> Result<()>;

    /// Tells the scheduler the current worker is about to block. Returns
    /// a guard that, when dropped, resumes the worker. See §4.4 for the
    /// replacement-worker mechanism this enables.
    fn suspend(&self) -> Box<dyn SuspendGuard>;

    /// Signals the scheduler's close token and blocks until every
    /// worker has drained its queue and exited.
    fn close(&self);
}

thread_local! {
    static REGISTRY: RefCell<Option<(Arc<dyn TaskScheduler>, Option<Arc<dyn Runnable>>)>> =
        const { RefCell::new(None) };
}

static DEFAULT: OnceLock<Arc<dyn TaskScheduler>> = OnceLock::new();

/// The process-wide default scheduler: a lazily-initialized
/// [`ConcurrentTaskScheduler`] sized by available hardware parallelism.
///
/// # Design note
/// Implemented as a [`OnceLock`], never a mutable global: once created it
/// is never replaced, matching the "lazy static guarded by a one-time
/// initializer" note in §9.
pub fn default_scheduler() -> Arc<dyn TaskScheduler> {
    Arc::clone(DEFAULT.get_or_init(|| {
        Arc::new(ConcurrentTaskScheduler::from_config(crate::timing::SchedulerConfig::default()))
            as Arc<dyn TaskScheduler>
    }))
}

/// Returns the scheduler owning the current thread, or the process
/// default if the current thread is not registered to any scheduler.
pub fn current() -> Arc<dyn TaskScheduler> {
    REGISTRY.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|(scheduler, _)| Arc::clone(scheduler))
            .unwrap_or_else(default_scheduler)
    })
}

/// Returns the task currently running on this thread, if any.
pub fn current_task() -> Option<Arc<dyn Runnable>> {
    REGISTRY.with(|cell| cell.borrow().as_ref().and_then(|(_, task)| task.clone()))
}

/// Registers `scheduler` as the owner of the current thread with no
/// active task. Called once per worker thread at startup.
pub(crate) fn register(scheduler: Arc<dyn TaskScheduler>) {
    REGISTRY.with(|cell| *cell.borrow_mut() = Some((scheduler, None)));
}

/// Records `task` as the unit of work currently running on this thread.
pub(crate) fn bind_current_task(task: Option<Arc<dyn Runnable>>) {
    REGISTRY.with(|cell| {
        if let Some(entry) = cell.borrow_mut().as_mut() {
            entry.1 = task;
        }
    });
}

pub(crate) fn unregister() {
    REGISTRY.with(|cell| *cell.borrow_mut() = None);
}

/// Convenience used by primitives that want to suspend the current task
/// regardless of which scheduler owns it.
pub fn suspend_current() -> Box<dyn SuspendGuard> {
    current().suspend()
}

