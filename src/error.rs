//! Error taxonomy for the runtime.
//!
//! # Design background (Why)
//! Every fallible operation in this crate returns a [`RuntimeError`] (or a
//! narrower type convertible into one) rather than panicking on a
//! caller-reachable misuse path. Because a [`crate::task::Task`] must
//! re-raise its stored exception on every `result()` access after the
//! first, the stored error has to be `Clone` — `Box<dyn std::error::Error>`
//! is not, so the hierarchy below is built entirely out of concrete,
//! cloneable enums instead.
//!
//! # Contract (What)
//! - [`RuntimeError`] is the top-level error every public API surfaces.
//! - [`Cancelled`] never holds a live [`crate::sync::InterruptToken`]; it
//!   holds the token's identity and the winning `signal_id`, so comparing
//!   two `Cancelled` values for "same token" never resurrects a reference
//!   cycle into the cancellation graph.
//! - [`AggregateError`] flattens nested aggregates at construction time.

use std::fmt;

/// The token identity carried by a [`Cancelled`] error.
///
/// This is an opaque handle, not the live token: holding it must not keep
/// the token's subgraph alive, and must not allow re-signaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenId(pub(crate) u64);

impl TokenId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Raised when a cooperative cancellation check observes a signaled token.
///
/// # Contract (What)
/// - `token`: identity of the token whose subgraph reached `self` at
///   signal time (not necessarily the token that was signaled first).
/// - `signal_id`: the id assigned at the moment of signaling; two
///   `Cancelled` values referring to the same logical cancellation compare
///   equal on this field, which is how a task tells "I was cancelled by
///   my own token" apart from "I observed someone else's cancellation".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    pub token: TokenId,
    pub signal_id: u64,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cancelled (signal {})", self.signal_id)
    }
}

impl std::error::Error for Cancelled {}

/// Misuse of a synchronization primitive (lock, semaphore, scheduler).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThreadingError {
    #[error("scheduler is closed")]
    SchedulerClosed,
    #[error("timeout must not be negative")]
    InvalidTimeout,
}

/// Task lifecycle misuse, mirroring the legal-transition table in §3.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task has not been scheduled")]
    NotScheduled,
    #[error("task has already been scheduled")]
    AlreadyScheduled,
    #[error("task is already running")]
    AlreadyRunning,
    #[error("task has already completed")]
    Completed,
    #[error("an awaited task was cancelled")]
    AwaitedTaskCancelled,
}

/// Pipeline and queue misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParallelError {
    #[error("queue has already completed")]
    Completed,
    #[error("queue is linked to an upstream feeder and cannot be mutated directly")]
    LinkedToAsync,
    #[error("distribution has already started")]
    DistributionAlreadyStarted,
}

/// A flattened collection of errors, e.g. from `Task::wait_all`.
///
/// # Logic (How)
/// Construction flattens any nested `Aggregate` member so an aggregate
/// never contains another aggregate, matching the "flattens nested
/// aggregates" contract in §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    errors: Vec<RuntimeError>,
}

impl AggregateError {
    pub fn new(errors: impl IntoIterator<Item = RuntimeError>) -> Self {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                RuntimeError::Aggregate(inner) => flat.extend(inner.errors),
                other => flat.push(other),
            }
        }
        Self { errors: flat }
    }

    pub fn errors(&self) -> &[RuntimeError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Rethrows `self` with every error not matching `pred` removed.
    ///
    /// Returns `None` if every error was handled (nothing left to raise).
    pub fn retain(mut self, mut pred: impl FnMut(&RuntimeError) -> bool) -> Option<Self> {
        self.errors.retain(|e| !pred(e));
        if self.errors.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} aggregated error(s)", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            write!(f, "\n  [{i}] {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl IntoIterator for AggregateError {
    type Item = RuntimeError;
    type IntoIter = std::vec::IntoIter<RuntimeError>;
    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// The top-level error type surfaced by every fallible public operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Threading(#[from] ThreadingError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}

impl RuntimeError {
    /// Returns the triggering token's identity if this is a cancellation.
    pub fn as_cancelled(&self) -> Option<&Cancelled> {
        match self {
            RuntimeError::Cancelled(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuntimeError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
