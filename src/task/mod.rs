//! The `Task<T>` state machine (§3, §4.5) and its continuation machinery.
//!
//! # Design background (Why)
//! A task is a promise that also knows how to run itself: it carries both
//! the eventual value and the closure that produces it, and it implements
//! [`crate::scheduler::Runnable`] so a scheduler can drive it without ever
//! knowing `T`. Its own completion is exposed as a plain manual-reset
//! [`Event`], which is what lets [`Task::with_any`], [`Task::with_all`],
//! and `wait`/`result` all be built out of the same primitives as every
//! other blocking operation in this crate rather than a bespoke mechanism.
//!
//! # Contract (What)
//! - States form the total order `NotStarted < Scheduled < Running <
//!   {Completed, Failed, Canceled}` (§3); [`Task::run_synchronously`] is
//!   the only path that ever reaches a terminal state by *running* the
//!   target; cancellation of a not-yet-started task takes a direct
//!   `NotStarted -> Canceled` shortcut instead.
//! - A task's stored result or error is returned by every subsequent
//!   `result()` call — the error type is `Clone` for exactly this reason
//!   (see `error.rs`).

mod options;

pub use options::ContinuationOptions;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{AggregateError, Cancelled, Result, RuntimeError, TaskError, TokenId};
use crate::scheduler::{Runnable, TaskScheduler};
use crate::sync::{Continuation, Event, InterruptSignal, InterruptToken, Policy};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A task's position in the total order from §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    NotStarted,
    Scheduled,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Scheduled => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed | Self::Canceled => 3,
        }
    }
}

impl PartialOrd for TaskState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.is_terminal() && other.is_terminal() && self != other {
            return None;
        }
        Some(self.rank().cmp(&other.rank()))
    }
}

type TaskFn<T> = dyn FnOnce(&Task<T>) -> Result<T> + Send;

struct Inner<T> {
    id: u64,
    name: Mutex<String>,
    state: Mutex<TaskState>,
    result: Mutex<Option<T>>,
    error: Mutex<Option<RuntimeError>>,
    completion: Event,
    target: Mutex<Option<Box<TaskFn<T>>>>,
    interrupt_signal: InterruptSignal,
    scheduler: Mutex<Option<Arc<dyn TaskScheduler>>>,
    lazy: bool,
}

/// A unit of asynchronous work together with its eventual result (§3).
///
/// Cloning a `Task` shares the same underlying state (it is an `Arc`
/// handle around [`Inner`]).
pub struct Task<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &*self.inner.name.lock().unwrap())
            .field("state", &*self.inner.state.lock().unwrap())
            .finish()
    }
}

/// Builder returned by [`Task::create`] (§6).
pub struct TaskBuilder<T> {
    name: Option<String>,
    interrupt: Option<InterruptToken>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    lazy: bool,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Send + Sync + 'static> TaskBuilder<T> {
    fn new() -> Self {
        Self { name: None, interrupt: None, scheduler: None, lazy: false, _marker: std::marker::PhantomData }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interrupt(mut self, interrupt: InterruptToken) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Deferred execution: the task only runs once `result()` is first
    /// accessed, at which point it is prioritised on whichever scheduler
    /// is current at that moment (§4.5 "lazy tasks").
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Builds the task in `NotStarted`, without scheduling it.
    pub fn plan(self, target: impl FnOnce(&Task<T>) -> Result<T> + Send + 'static) -> Task<T> {
        let parents: Vec<InterruptToken> = self.interrupt.into_iter().collect();
        let inner = Arc::new(Inner {
            id: next_task_id(),
            name: Mutex::new(self.name.unwrap_or_else(|| format!("task-{}", next_task_id()))),
            state: Mutex::new(TaskState::NotStarted),
            result: Mutex::new(None),
            error: Mutex::new(None),
            completion: Event::new(),
            target: Mutex::new(Some(Box::new(target))),
            interrupt_signal: InterruptSignal::new(&parents),
            scheduler: Mutex::new(self.scheduler),
            lazy: self.lazy,
        });
        Task { inner }
    }

    /// Builds the task and immediately schedules it (§6 `Task.run`).
    pub fn run(self, target: impl FnOnce(&Task<T>) -> Result<T> + Send + 'static) -> Task<T> {
        let task = self.plan(target);
        // A fresh task can only fail to schedule if it raced another
        // scheduler call on the same task, which cannot happen before
        // the caller has a handle to it.
        let _ = task.schedule();
        task
    }
}

impl<T: Send + Sync + 'static> Task<T> {
    pub fn create() -> TaskBuilder<T> {
        TaskBuilder::new()
    }

    pub fn run(target: impl FnOnce(&Task<T>) -> Result<T> + Send + 'static) -> Task<T> {
        Self::create().run(target)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> String {
        self.inner.name.lock().unwrap().clone()
    }

    pub fn state(&self) -> TaskState {
        *self.inner.state.lock().unwrap()
    }

    pub fn interrupt(&self) -> InterruptToken {
        self.inner.interrupt_signal.interrupt()
    }

    pub(crate) fn completion_event(&self) -> Event {
        self.inner.completion.clone()
    }

    /// Transitions `NotStarted -> Scheduled` and hands the task to
    /// `scheduler` (or the caller's current scheduler).
    pub fn schedule(&self) -> Result<()> {
        let scheduler = {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                TaskState::NotStarted => *state = TaskState::Scheduled,
                TaskState::Scheduled | TaskState::Running => return Err(TaskError::AlreadyScheduled.into()),
                TaskState::Completed | TaskState::Failed | TaskState::Canceled => {
                    return Err(TaskError::Completed.into())
                }
            }
            let mut slot = self.inner.scheduler.lock().unwrap();
            let scheduler = slot.clone().unwrap_or_else(crate::scheduler::current);
            *slot = Some(Arc::clone(&scheduler));
            scheduler
        };
        tracing::trace!(task_id = self.inner.id, name = %self.name(), "task scheduled");
        scheduler.queue(self.as_runnable())
    }

    fn as_runnable(&self) -> Arc<dyn Runnable> {
        Arc::clone(&self.inner) as Arc<dyn Runnable>
    }

    /// `NotStarted` tasks cancel directly with no scheduler involvement;
    /// anything already running only has its interrupt signaled and
    /// settles into `Canceled` the next time its body checks in (§4.5).
    pub fn cancel(&self) {
        self.inner.interrupt_signal.signal();
        let mut state = self.inner.state.lock().unwrap();
        if *state == TaskState::NotStarted {
            *state = TaskState::Canceled;
            drop(state);
            *self.inner.error.lock().unwrap() = self.inner.interrupt_signal.interrupt().cancelled_error().map(Into::into);
            *self.inner.target.lock().unwrap() = None;
            self.inner.completion.signal();
        }
    }

    /// Used by continuation wiring to settle a continuation task that
    /// will never run because its antecedent(s) didn't match its
    /// `ContinuationOptions`.
    fn force_cancel_without_running(&self) {
        let id = self.inner.interrupt_signal.signal();
        let mut state = self.inner.state.lock().unwrap();
        if !state.is_terminal() {
            *state = TaskState::Canceled;
            drop(state);
            tracing::warn!(
                task_id = self.inner.id,
                name = %self.name(),
                "continuation observed a state outside its ContinuationOptions, cancelling without running"
            );
            *self.inner.error.lock().unwrap() = Some(Cancelled { token: TokenId(self.interrupt().id()), signal_id: id }.into());
            *self.inner.target.lock().unwrap() = None;
            self.inner.completion.signal();
        }
    }

    pub fn wait(&self, timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<bool> {
        self.inner.completion.wait(timeout, interrupt)
    }

    /// Blocks until terminal, then returns the stored value or re-raises
    /// the stored error — every call after the first observes the same
    /// outcome (§7). A lazy, not-yet-started task is prioritised on the
    /// caller's current scheduler on first access.
    pub fn result(&self) -> Result<T>
    where
        T: Clone,
    {
        if self.state() == TaskState::NotStarted {
            if self.inner.lazy {
                crate::scheduler::current().prioritise(self.as_runnable())?;
            } else {
                return Err(TaskError::NotScheduled.into());
            }
        }
        self.wait(None, None)?;
        match self.state() {
            TaskState::Completed => Ok(self.inner.result.lock().unwrap().clone().expect("completed task has a result")),
            TaskState::Failed | TaskState::Canceled => {
                Err(self.inner.error.lock().unwrap().clone().expect("failed/canceled task has an error"))
            }
            other => unreachable!("wait() only returns once terminal, got {other:?}"),
        }
    }

    pub fn exception(&self) -> Option<RuntimeError> {
        self.inner.error.lock().unwrap().clone()
    }

    /// Schedules a continuation task that observes `self`'s completion
    /// (§4.5). If `self` settles in a state matching `options`, the
    /// continuation runs (inline on the signaling thread if
    /// `ContinuationOptions::INLINE` is set, else queued normally);
    /// otherwise the continuation is cancelled without ever running.
    pub fn continue_with<U: Send + Sync + 'static>(
        &self,
        options: ContinuationOptions,
        target: impl FnOnce(&Task<U>, &Task<T>) -> Result<U> + Send + 'static,
    ) -> Task<U> {
        let antecedent = self.clone();
        let continuation_task: Task<U> = Task::create().plan(move |cont| target(cont, &antecedent));
        *continuation_task.inner.state.lock().unwrap() = TaskState::Scheduled;
        *continuation_task.inner.scheduler.lock().unwrap() = Some(crate::scheduler::current());

        let watched = self.clone();
        let fire = continuation_task.clone();
        let action = move || {
            if options.matches_state(watched.state()) {
                if options.is_inline() {
                    fire.inner.clone().run_synchronously();
                } else {
                    let _ = fire.inner.scheduler.lock().unwrap().clone().unwrap_or_else(crate::scheduler::current).queue(fire.as_runnable());
                }
            } else {
                fire.force_cancel_without_running();
            }
        };
        let gate = Arc::new(Continuation::new(Policy::All, 1, action));
        let event = self.completion_event();
        gate.track(event.clone());
        event.register(gate);
        continuation_task
    }

    /// Builds a continuation observing every task in `tasks` with ANY
    /// policy (§4.5): fires as soon as one task's terminal state matches
    /// `options`, or cancels once every task has finished without a
    /// match. `interrupt`, if given, lets an external token cancel the
    /// continuation itself independent of the watched tasks (§6).
    pub fn with_any(
        tasks: &[Task<T>],
        options: ContinuationOptions,
        interrupt: Option<InterruptToken>,
    ) -> ContinuationBuilder<T> {
        ContinuationBuilder { tasks: tasks.to_vec(), policy: Policy::Any, options, interrupt }
    }

    /// Builds a continuation observing every task in `tasks` with ALL
    /// policy (§4.5): fires once every task is terminal, running if the
    /// set of observed states is covered by `options`, else cancelling.
    /// `interrupt`, if given, lets an external token cancel the
    /// continuation itself independent of the watched tasks (§6).
    pub fn with_all(
        tasks: &[Task<T>],
        options: ContinuationOptions,
        interrupt: Option<InterruptToken>,
    ) -> ContinuationBuilder<T> {
        ContinuationBuilder { tasks: tasks.to_vec(), policy: Policy::All, options, interrupt }
    }

    /// Blocks until at least one of `tasks` is terminal. Returns `Ok(false)`
    /// on timeout. Raises the aggregate of any failed tasks observed once
    /// the wait returns, or `AwaitedTaskCancelled` if `fail_on_cancel` and
    /// one of them was cancelled.
    pub fn wait_any(
        tasks: &[Task<T>],
        timeout: Option<Duration>,
        fail_on_cancel: bool,
        interrupt: Option<&InterruptToken>,
    ) -> Result<bool> {
        wait_many(tasks, Policy::Any, timeout, fail_on_cancel, interrupt)
    }

    /// Blocks until every task in `tasks` is terminal. Returns `Ok(false)`
    /// on timeout, else raises the same aggregate/cancellation contract
    /// as [`Task::wait_any`].
    pub fn wait_all(
        tasks: &[Task<T>],
        timeout: Option<Duration>,
        fail_on_cancel: bool,
        interrupt: Option<&InterruptToken>,
    ) -> Result<bool> {
        wait_many(tasks, Policy::All, timeout, fail_on_cancel, interrupt)
    }
}

fn wait_many<T: Send + Sync + 'static>(
    tasks: &[Task<T>],
    policy: Policy,
    timeout: Option<Duration>,
    fail_on_cancel: bool,
    interrupt: Option<&InterruptToken>,
) -> Result<bool> {
    let events: Vec<Event> = tasks.iter().map(Task::completion_event).collect();
    let fired = match policy {
        Policy::Any => Event::wait_any(&events, timeout, interrupt)?,
        Policy::All => Event::wait_all(&events, timeout, interrupt)?,
    };
    if !fired {
        return Ok(false);
    }
    let mut failures = Vec::new();
    for task in tasks {
        match task.state() {
            TaskState::Failed => failures.push(task.exception().expect("failed task has an error")),
            TaskState::Canceled if fail_on_cancel => return Err(TaskError::AwaitedTaskCancelled.into()),
            _ => {}
        }
    }
    if !failures.is_empty() {
        return Err(AggregateError::new(failures).into());
    }
    Ok(true)
}

/// Fluent builder returned by [`Task::with_any`]/[`Task::with_all`].
pub struct ContinuationBuilder<T> {
    tasks: Vec<Task<T>>,
    policy: Policy,
    options: ContinuationOptions,
    interrupt: Option<InterruptToken>,
}

impl<T: Send + Sync + 'static> ContinuationBuilder<T> {
    /// Builds and schedules the continuation task.
    pub fn run<U: Send + Sync + 'static>(
        self,
        target: impl FnOnce(&Task<U>, &[Task<T>]) -> Result<U> + Send + 'static,
    ) -> Task<U> {
        let ContinuationBuilder { tasks, policy, options, interrupt } = self;
        let watched = tasks.clone();
        let mut builder = Task::create();
        if let Some(interrupt) = interrupt {
            builder = builder.interrupt(interrupt);
        }
        let continuation_task: Task<U> = builder.plan(move |cont| target(cont, &tasks));
        *continuation_task.inner.state.lock().unwrap() = TaskState::Scheduled;
        *continuation_task.inner.scheduler.lock().unwrap() = Some(crate::scheduler::current());
        let fire = continuation_task.clone();

        let run_or_cancel = move |matched: bool| {
            if matched {
                if options.is_inline() {
                    fire.inner.clone().run_synchronously();
                } else {
                    let _ = fire.inner.scheduler.lock().unwrap().clone().unwrap_or_else(crate::scheduler::current).queue(fire.as_runnable());
                }
            } else {
                fire.force_cancel_without_running();
            }
        };

        match policy {
            Policy::All => {
                let watched_for_gate = watched.clone();
                let gate = Arc::new(Continuation::new(Policy::All, watched.len(), move || {
                    let matched = watched_for_gate.iter().all(|t| options.matches_state(t.state()));
                    run_or_cancel(matched);
                }));
                for task in &watched {
                    let event = task.completion_event();
                    gate.track(event.clone());
                    event.register(Arc::clone(&gate));
                }
            }
            Policy::Any => {
                // Each task gets its own single-observer gate; a shared
                // decision flag makes the first matching task (or, if
                // none match, the last task to finish) the one that
                // fires the action, exactly once.
                let decided = Arc::new(std::sync::atomic::AtomicBool::new(false));
                let remaining = Arc::new(AtomicUsize::new(watched.len()));
                let run_or_cancel = Arc::new(Mutex::new(Some(run_or_cancel)));
                for task in &watched {
                    let task_for_action = task.clone();
                    let decided = Arc::clone(&decided);
                    let remaining = Arc::clone(&remaining);
                    let run_or_cancel = Arc::clone(&run_or_cancel);
                    let action = move || {
                        let matched = options.matches_state(task_for_action.state());
                        let is_last = remaining.fetch_sub(1, Ordering::AcqRel) == 1;
                        if matched || is_last {
                            if decided.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                                if let Some(f) = run_or_cancel.lock().unwrap().take() {
                                    f(matched);
                                }
                            }
                        }
                    };
                    let gate = Arc::new(Continuation::new(Policy::Any, 1, action));
                    let event = task.completion_event();
                    gate.track(event.clone());
                    event.register(gate);
                }
            }
        }
        continuation_task
    }
}

impl<T: Send + Sync + 'static> Runnable for Inner<T> {
    /// Runs the task body, classifying its outcome into a terminal state
    /// (§4.5): a plain `Ok` completes the task; an `Err(Cancelled)` whose
    /// token/signal match this task's own interrupt becomes `Canceled`;
    /// every other error (including a *different* cancellation observed
    /// from a nested call) becomes `Failed`.
    fn run_synchronously(self: Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.is_terminal() {
                return;
            }
            *state = TaskState::Running;
        }
        let target = self.target.lock().unwrap().take().expect("task body already consumed");
        let handle = Task { inner: Arc::clone(&self) };

        crate::scheduler::bind_current_task(Some(Arc::clone(&self) as Arc<dyn Runnable>));
        let outcome = target(&handle);
        crate::scheduler::bind_current_task(None);

        let own_signal = self.interrupt_signal.interrupt().signal_id();
        let final_state = match outcome {
            Ok(value) => {
                *self.result.lock().unwrap() = Some(value);
                TaskState::Completed
            }
            Err(err) => {
                let is_own_cancellation = matches!(
                    &err,
                    RuntimeError::Cancelled(c) if Some(c.signal_id) == own_signal && c.token == TokenId(handle.interrupt().id())
                );
                *self.error.lock().unwrap() = Some(err);
                if is_own_cancellation {
                    TaskState::Canceled
                } else {
                    TaskState::Failed
                }
            }
        };
        *self.state.lock().unwrap() = final_state;
        tracing::debug!(task_id = self.id, name = %self.name(), state = ?final_state, "task settled");
        self.completion.signal();
    }

    fn name(&self) -> String {
        self.name.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_completes_with_value() {
        let task = Task::run(|_| Ok(42));
        assert_eq!(task.result().unwrap(), 42);
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn run_propagates_failure() {
        let task: Task<i32> = Task::run(|_| Err(TaskError::AlreadyRunning.into()));
        assert!(task.result().is_err());
        assert_eq!(task.state(), TaskState::Failed);
        // Re-access must yield the same error, not panic.
        assert!(task.result().is_err());
    }

    #[test]
    fn cancel_before_start_short_circuits() {
        let task: Task<i32> = Task::create().plan(|_| Ok(1));
        task.cancel();
        assert_eq!(task.state(), TaskState::Canceled);
        assert!(task.result().unwrap_err().is_cancelled());
    }

    #[test]
    fn cooperative_cancellation_inside_body_yields_canceled() {
        let task: Task<i32> = Task::create().run(|t| {
            t.interrupt().raise_if_signaled()?;
            Ok(1)
        });
        task.cancel();
        std::thread::sleep(Duration::from_millis(50));
        let _ = task.result();
        assert_eq!(task.state(), TaskState::Canceled);
    }

    #[test]
    fn continue_with_runs_on_success() {
        let a = Task::run(|_| Ok(1));
        let b = a.continue_with(ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, |_, ant| Ok(ant.result()? + 1));
        assert_eq!(b.result().unwrap(), 2);
    }

    #[test]
    fn continue_with_cancels_on_mismatched_terminal_state() {
        let a: Task<i32> = Task::run(|_| Err(TaskError::AlreadyRunning.into()));
        let b = a.continue_with(ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, |_, _| Ok(0));
        let _ = a.result();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(b.state(), TaskState::Canceled);
    }

    #[test]
    fn with_all_runs_when_every_task_matches() {
        let a = Task::run(|_| Ok(1));
        let b = Task::run(|_| Ok(2));
        let sum = Task::with_all(&[a, b], ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, None)
            .run(|_, tasks| Ok(tasks.iter().map(|t| t.result()).sum::<Result<i32>>()?));
        assert_eq!(sum.result().unwrap(), 3);
    }

    #[test]
    fn with_all_cancels_when_one_task_fails() {
        let a = Task::run(|_| Ok(1));
        let b: Task<i32> = Task::run(|_| Err(TaskError::AlreadyRunning.into()));
        let sum = Task::with_all(&[a, b], ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, None).run(|_, _| Ok(0));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sum.state(), TaskState::Canceled);
    }

    #[test]
    fn with_any_runs_on_first_match() {
        let a = Task::run(|_| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(1)
        });
        let b: Task<i32> = Task::run(|_| Err(TaskError::AlreadyRunning.into()));
        let first = Task::with_any(&[a, b], ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, None).run(|_, _| Ok(99));
        assert_eq!(first.result().unwrap(), 99);
    }

    #[test]
    fn with_all_threads_its_own_interrupt_into_the_continuation() {
        // Signaled up front: the continuation task is born with an
        // already-signaled token, independent of whether `a` itself is
        // ever cancelled.
        let signal = InterruptSignal::default();
        signal.signal();
        let a = Task::run(|_| Ok(1));
        let joined = Task::with_all(&[a], ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, Some(signal.interrupt()))
            .run(|cont, _tasks| {
                cont.interrupt().raise_if_signaled()?;
                Ok(0)
            });
        assert!(joined.result().unwrap_err().is_cancelled());
        assert_eq!(joined.state(), TaskState::Canceled);
    }

    #[test]
    fn wait_all_times_out() {
        let task: Task<i32> = Task::create().plan(|_| Ok(1));
        // Never scheduled, so it never completes.
        assert!(!Task::wait_all(&[task], Some(Duration::from_millis(10)), false, None).unwrap());
    }

    #[test]
    fn wait_all_aggregates_failures() {
        let a: Task<i32> = Task::run(|_| Err(TaskError::AlreadyRunning.into()));
        let b: Task<i32> = Task::run(|_| Err(TaskError::NotScheduled.into()));
        let err = Task::wait_all(&[a, b], Some(Duration::from_secs(2)), false, None).unwrap_err();
        match err {
            RuntimeError::Aggregate(agg) => assert_eq!(agg.errors().len(), 2),
            other => panic!("expected aggregate, got {other:?}"),
        }
    }
}
