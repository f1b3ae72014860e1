//! weft: an in-process task and dataflow runtime.
//!
//! weft gives a program three things that normally come bundled with a
//! full async runtime, without requiring one: a promise-style [`Task<T>`]
//! state machine with cooperative cancellation, a bounded worker-pool
//! [`scheduler`] that a task's body can suspend out of without starving
//! its siblings, and a parallel pipeline layer ([`pipeline`], [`parallel`])
//! for fanning work out over bounded producer/consumer queues.
//!
//! # Layering
//! - [`sync`] — the primitives everything else is built from: manual-
//!   and auto-reset [`sync::Event`]s, multi-waiter [`sync::Continuation`]
//!   gates (not part of the public surface, used internally by `task`),
//!   a DAG of cooperative [`sync::InterruptToken`]/[`sync::InterruptSignal`]
//!   pairs, a fair [`sync::Lock`], and a [`sync::Semaphore`].
//! - [`scheduler`] — the [`scheduler::TaskScheduler`] contract and the
//!   process-wide default [`scheduler::ConcurrentTaskScheduler`].
//! - [`task`] — [`task::Task`], its continuation combinators, and the
//!   blocking wait family.
//! - [`pcq`] — [`pcq::ProducerConsumerQueue`], the bounded-in-spirit FIFO
//!   pipeline stages read from and write to.
//! - [`pipeline`] — [`pipeline::Stage`] and its `PFn`/`PFilter`/`PFork`
//!   implementations, run under an ambient [`pipeline::ParallelContext`].
//! - [`parallel`] — `background`/`for_each`/`map`/`process` convenience
//!   entry points and [`parallel::Distributor`], for callers who want the
//!   common cases without assembling a `Stage` chain by hand.
//!
//! # Error handling
//! Every fallible operation returns [`error::Result`]; see [`error::RuntimeError`]
//! for the full taxonomy. Cancellation is itself an error variant
//! ([`error::Cancelled`]) rather than a side channel, so a cancelled task
//! propagates the same way any other failure does.
//!
//! # Observability
//! Scheduler and task lifecycle events are emitted through `tracing`.
//! Callers wire up a subscriber (e.g. `tracing_subscriber::fmt`); weft
//! itself never installs one.

pub mod error;
pub mod parallel;
pub mod pcq;
pub mod pipeline;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod timing;

pub use error::{Result, RuntimeError};
pub use task::{ContinuationOptions, Task, TaskState};
