//! Parallel pipeline operators built on [`crate::pcq::ProducerConsumerQueue`]
//! and [`crate::task::Task`] (§4.7), grounded in the original's
//! `PFn`/`PFilter`/`PFork`/`PContext` quartet.
//!
//! # Design background (Why)
//! Every stage shares one shape: fan a bounded number of worker tasks out
//! over a shared input iterator, push each worker's output into a shared
//! output queue, and wire three continuations onto the worker tasks —
//! complete the output on `with_all` success, fail it on `with_any`
//! failure, fail it on `with_any` cancellation — so the output queue's
//! terminal state always reflects what actually happened upstream without
//! the consumer having to watch the worker tasks itself (§4.8).
//! [`PFork`] is the one stage that needs more than a single shared output:
//! it gives each branch its own input queue and merges every branch's
//! output into one.

mod context;
mod pfn;
mod pfork;

pub use context::{ParallelContext, Parallelism};
pub use pfn::PFn;
pub use pfork::PFork;

use crate::error::Result;
use crate::pcq::ProducerConsumerQueue;

/// A fallible, boxed iterator of stage output — the common currency
/// every [`Stage`] consumes and produces.
pub type PIter<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

pub fn iter_of<T: Send + 'static>(queue: ProducerConsumerQueue<T>) -> PIter<T> {
    Box::new(queue.iter())
}

/// One stage of a pipeline: consumes items under the ambient
/// [`ParallelContext`] and produces the next stage's input.
pub trait Stage<In, Out>: Send + Sync {
    fn call(&self, items: PIter<In>, ctx: &ParallelContext) -> Result<PIter<Out>>;

    /// Runs this stage standalone against `items`, entering a fresh root
    /// context sized to the caller's default scheduler (§6 convenience).
    fn run<I: IntoIterator<Item = In> + Send + 'static>(&self, items: I) -> Result<PIter<Out>>
    where
        In: Send + 'static,
        Self: Sized,
        I::IntoIter: Send,
    {
        let ctx = ParallelContext::current();
        let _guard = ctx.enter();
        let input: PIter<In> = Box::new(items.into_iter().map(Ok));
        self.call(input, &ctx)
    }

    /// Sequentially composes `self` with `next`: `next` consumes
    /// whatever `self` produces.
    fn then<Out2>(self, next: impl Stage<Out, Out2> + Send + Sync + 'static) -> Chain<In, Out, Out2>
    where
        Self: Sized + Send + Sync + 'static,
        Out: 'static,
    {
        Chain { first: Box::new(self), second: Box::new(next) }
    }
}

/// The result of [`Stage::then`]: runs `first`, then feeds its output
/// into `second`.
pub struct Chain<In, Mid, Out> {
    first: Box<dyn Stage<In, Mid> + Send + Sync>,
    second: Box<dyn Stage<Mid, Out> + Send + Sync>,
}

impl<In, Mid, Out> Stage<In, Out> for Chain<In, Mid, Out>
where
    In: Send,
    Mid: Send,
    Out: Send,
{
    fn call(&self, items: PIter<In>, ctx: &ParallelContext) -> Result<PIter<Out>> {
        let mid = self.first.call(items, ctx)?;
        self.second.call(mid, ctx)
    }
}

/// A unary predicate stage: passes items through unchanged, dropping
/// those that don't match (§4.7, grounded in the original's `PFilter`).
pub struct PFilter<T> {
    inner: PFn<T, T>,
}

impl<T: Send + Sync + 'static> PFilter<T> {
    pub fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            inner: PFn::new(move |_task, item: T| if predicate(&item) { vec![item] } else { Vec::new() }),
        }
    }

    pub fn with_parallelism(self, parallelism: impl Into<Parallelism>) -> Self {
        Self { inner: self.inner.with_parallelism(parallelism) }
    }
}

impl<T: Send + Sync + 'static> Stage<T, T> for PFilter<T> {
    fn call(&self, items: PIter<T>, ctx: &ParallelContext) -> Result<PIter<T>> {
        self.inner.call(items, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_runs_both_stages_in_order() {
        let double = PFn::new(|_task, item: i32| vec![item * 2]);
        let plus_one = PFn::new(|_task, item: i32| vec![item + 1]);
        let pipeline = double.then(plus_one);
        let mut out: Vec<i32> = pipeline.run(vec![1, 2, 3]).unwrap().map(Result::unwrap).collect();
        out.sort();
        assert_eq!(out, vec![3, 5, 7]);
    }

    #[test]
    fn filter_drops_nonmatching_items() {
        let evens = PFilter::new(|i: &i32| i % 2 == 0);
        let mut out: Vec<i32> = evens.run(vec![1, 2, 3, 4, 5]).unwrap().map(Result::unwrap).collect();
        out.sort();
        assert_eq!(out, vec![2, 4]);
    }
}
