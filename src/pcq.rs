//! Bounded-in-spirit (backpressure-free, §9 open question) producer/consumer
//! queue with monotonic completion flags (§4.6).
//!
//! # Design background (Why)
//! A [`ProducerConsumerQueue`] is how one task's output becomes another's
//! input without either side blocking on a rendezvous. Completion and
//! failure are modeled as flags rather than sentinel values so that a
//! consumer mid-drain of real items never has to special-case "was that
//! the last one" — [`ProducerConsumerQueue::take`] only reports end-of-stream
//! once the queue is both complete *and* observed empty, re-checking once
//! after noticing completion to close the race against a producer that
//! enqueued its last item just before calling `complete`.
//!
//! # Contract (What)
//! - `put`/`complete`/`fail` on a queue linked to an async feeder
//!   ([`ProducerConsumerQueue::from_iter_task`]) fail with
//!   [`crate::error::ParallelError::LinkedToAsync`] — the feeder task owns
//!   the producer side exclusively.
//! - `complete`/`fail` are monotonic: once complete or failed, a second
//!   call (other than the idempotent [`ProducerConsumerQueue::fail_if_not_complete`])
//!   fails with [`crate::error::ParallelError::Completed`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{ParallelError, Result, RuntimeError};
use crate::sync::{AutoClearEvent, InterruptToken};
use crate::task::Task;

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    notify: AutoClearEvent,
    complete: AtomicBool,
    failure: Mutex<Option<RuntimeError>>,
    async_linked: AtomicBool,
}

/// A FIFO handed from producer(s) to consumer(s), terminated by
/// [`ProducerConsumerQueue::complete`] or [`ProducerConsumerQueue::fail`].
pub struct ProducerConsumerQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ProducerConsumerQueue<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Default for ProducerConsumerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProducerConsumerQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                notify: AutoClearEvent::new(),
                complete: AtomicBool::new(false),
                failure: Mutex::new(None),
                async_linked: AtomicBool::new(false),
            }),
        }
    }

    fn guard_direct_mutation(&self) -> Result<()> {
        if self.inner.async_linked.load(Ordering::Acquire) {
            Err(ParallelError::LinkedToAsync.into())
        } else {
            Ok(())
        }
    }

    pub fn put(&self, item: T) -> Result<()> {
        self.guard_direct_mutation()?;
        self.put_unchecked(item)
    }

    fn put_unchecked(&self, item: T) -> Result<()> {
        if self.inner.complete.load(Ordering::Acquire) {
            return Err(ParallelError::Completed.into());
        }
        self.inner.items.lock().unwrap().push_back(item);
        self.inner.notify.signal();
        Ok(())
    }

    pub fn put_many(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        self.guard_direct_mutation()?;
        for item in items {
            self.put_unchecked(item)?;
        }
        Ok(())
    }

    pub fn complete(&self) -> Result<()> {
        self.guard_direct_mutation()?;
        self.complete_unchecked()
    }

    fn complete_unchecked(&self) -> Result<()> {
        if self
            .inner
            .complete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ParallelError::Completed.into());
        }
        self.inner.notify.signal();
        Ok(())
    }

    pub fn fail(&self, error: RuntimeError) -> Result<()> {
        self.guard_direct_mutation()?;
        self.fail_unchecked(error)
    }

    fn fail_unchecked(&self, error: RuntimeError) -> Result<()> {
        if self.inner.complete.swap(true, Ordering::AcqRel) {
            return Err(ParallelError::Completed.into());
        }
        *self.inner.failure.lock().unwrap() = Some(error);
        self.inner.notify.signal();
        Ok(())
    }

    /// Idempotent failure: a no-op if the queue has already reached a
    /// terminal state, used by cleanup paths that don't want to race a
    /// legitimate producer completion (§4.8, the distributor's fan-in).
    pub fn fail_if_not_complete(&self, error: RuntimeError) {
        let _ = self.fail_unchecked(error);
    }

    pub fn is_complete(&self) -> bool {
        self.inner.complete.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failure.lock().unwrap().is_some()
    }

    pub fn try_take(&self) -> Result<Option<T>> {
        if let Some(err) = self.inner.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.inner.items.lock().unwrap().pop_front())
    }

    /// Blocks for up to `timeout` for an item. Returns `Ok(None)` on
    /// end-of-stream (queue complete and drained) or timeout — callers
    /// distinguish the two via [`ProducerConsumerQueue::is_complete`] if
    /// needed. Re-checks for a freshly enqueued item once after first
    /// observing completion, closing the race against a producer that
    /// enqueues its last item concurrently with calling `complete`.
    pub fn take(&self, timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<Option<T>> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut rechecked_after_complete = false;
        loop {
            if let Some(err) = self.inner.failure.lock().unwrap().clone() {
                return Err(err);
            }
            if let Some(item) = self.inner.items.lock().unwrap().pop_front() {
                return Ok(Some(item));
            }
            if self.inner.complete.load(Ordering::Acquire) {
                if rechecked_after_complete {
                    return Ok(None);
                }
                rechecked_after_complete = true;
                continue;
            }
            let remaining = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(None);
                    }
                    Some(d - now)
                }
                None => None,
            };
            if !self.inner.notify.wait(remaining, interrupt)? {
                return Ok(None);
            }
        }
    }

    /// A fallible iterator draining this queue to end-of-stream.
    pub fn iter(&self) -> Iter<T> {
        Iter { queue: self.clone() }
    }
}

impl<T: Send + Sync + 'static> ProducerConsumerQueue<T> {
    /// Builds a queue fed by a background task that drains `source` one
    /// item at a time, completing the queue on success or failing it with
    /// whatever the iteration itself raised. Direct `put`/`complete`/`fail`
    /// calls on the returned queue are rejected with
    /// [`crate::error::ParallelError::LinkedToAsync`] — grounded in the
    /// original's `ProducerConsumerQueueIterator.put_many_async`.
    pub fn from_iter_task(source: impl IntoIterator<Item = T> + Send + 'static) -> (Self, Task<()>) {
        let queue = Self::new();
        queue.inner.async_linked.store(true, Ordering::Release);
        let feeder = queue.clone();
        let task = Task::create().name("pcq-feeder").run(move |t| {
            for item in source {
                t.interrupt().raise_if_signaled()?;
                feeder.put_unchecked(item)?;
            }
            feeder.complete_unchecked()?;
            Ok(())
        });
        let cleanup = queue.clone();
        let watcher = task.clone();
        let _ = watcher.continue_with(
            crate::task::ContinuationOptions::ON_FAILED | crate::task::ContinuationOptions::ON_CANCELED,
            move |_cont, antecedent| {
                let err = antecedent.exception().unwrap_or(ParallelError::Completed.into());
                cleanup.fail_if_not_complete(err);
                Ok(())
            },
        );
        (queue, task)
    }
}

/// Fallible iterator over a [`ProducerConsumerQueue`]'s items, yielding
/// `None` at end-of-stream.
pub struct Iter<T> {
    queue: ProducerConsumerQueue<T>,
}

impl<T> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.queue.take(None, None) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order_then_ends() {
        let queue: ProducerConsumerQueue<i32> = ProducerConsumerQueue::new();
        queue.put(1).unwrap();
        queue.put(2).unwrap();
        queue.complete().unwrap();
        let items: Vec<i32> = queue.iter().map(Result::unwrap).collect();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn take_blocks_until_item_or_completion() {
        let queue: ProducerConsumerQueue<i32> = ProducerConsumerQueue::new();
        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.take(Some(Duration::from_secs(2)), None).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.put(7).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn fail_propagates_to_consumers() {
        let queue: ProducerConsumerQueue<i32> = ProducerConsumerQueue::new();
        queue.fail(ParallelError::Completed.into()).unwrap();
        assert!(queue.take(Some(Duration::ZERO), None).is_err());
    }

    #[test]
    fn second_complete_call_fails() {
        let queue: ProducerConsumerQueue<i32> = ProducerConsumerQueue::new();
        queue.complete().unwrap();
        assert!(queue.complete().is_err());
    }

    #[test]
    fn direct_mutation_rejected_once_async_linked() {
        let (queue, task) = ProducerConsumerQueue::from_iter_task(vec![1, 2, 3]);
        assert!(queue.put(9).is_err());
        let items: Vec<i32> = queue.iter().map(Result::unwrap).collect();
        assert_eq!(items, vec![1, 2, 3]);
        task.result().unwrap();
    }
}
