//! High-level parallel entry points (§4.9): `background`, `for_each`,
//! `map`, `process`, and the §4.8 [`Distributor`] — thin sugar over
//! [`crate::task`] and [`crate::pipeline`] for the common cases, grounded
//! in the originals `background.py`, `for_each.py`, `map.py`, `process.py`,
//! and `distributor.py`.

use crate::error::Result;
use crate::pcq::ProducerConsumerQueue;
use crate::pipeline::{PFn, ParallelContext, Stage};
use crate::task::Task;

/// Runs `f` on a background task under the current scheduler, returning
/// immediately with a handle to its eventual result (grounded in
/// `background.py`).
pub fn background<T: Send + Sync + 'static>(f: impl FnOnce(&Task<T>) -> Result<T> + Send + 'static) -> Task<T> {
    Task::run(f)
}

/// Runs `f` over every item of `items` in parallel, for side effects
/// only; the returned task completes once every item has been processed
/// (grounded in `for_each.py`).
pub fn for_each<T: Send + Sync + 'static, I: IntoIterator<Item = T> + Send + 'static>(
    items: I,
    f: impl Fn(&Task<()>, &T) + Send + Sync + 'static,
) -> Result<Task<()>>
where
    I::IntoIter: Send,
{
    let ctx = ParallelContext::current();
    let _guard = ctx.enter();
    let stage = PFn::<T, ()>::new(move |task, item| {
        f(task, &item);
        Vec::new()
    })
    .with_parallelism(ctx.max_parallelism());
    let mut drained = stage.run(items)?;
    Ok(Task::run(move |_| {
        for result in drained.by_ref() {
            result?;
        }
        Ok(())
    }))
}

/// Runs `f` over every item of `items` in parallel, collecting the
/// mapped outputs (grounded in `map.py`). Output order is not
/// guaranteed to match input order — the workers race.
pub fn map<In: Send + Sync + 'static, Out: Send + Sync + 'static, I: IntoIterator<Item = In> + Send + 'static>(
    items: I,
    f: impl Fn(&Task<()>, In) -> Out + Send + Sync + 'static,
) -> Result<impl Iterator<Item = Result<Out>>>
where
    I::IntoIter: Send,
{
    let ctx = ParallelContext::current();
    let _guard = ctx.enter();
    let stage = PFn::new(move |task, item| vec![f(task, item)]).with_parallelism(ctx.max_parallelism());
    stage.run(items)
}

/// Runs `stage` over `items`, consuming the output queue without
/// collecting it — the returned task completes once the pipeline has
/// fully drained (grounded in `process.py`).
pub fn process<In: Send + Sync + 'static, Out: Send + Sync + 'static, I: IntoIterator<Item = In> + Send + 'static>(
    items: I,
    stage: impl Stage<In, Out> + Send + Sync + 'static,
) -> Result<Task<()>>
where
    I::IntoIter: Send,
{
    let mut out = stage.run(items)?;
    Ok(Task::run(move |_| {
        for result in out.by_ref() {
            result?;
        }
        Ok(())
    }))
}

/// Fans a single upstream iterator out to any number of independently
/// consumed output queues (§4.8, grounded in `distributor.py`). Each
/// [`Distributor::take`] call adds one more output; once
/// [`Distributor::start`] has run, `take` can no longer be called.
pub struct Distributor<T> {
    source: std::sync::Mutex<Option<Box<dyn Iterator<Item = T> + Send>>>,
    outputs: std::sync::Mutex<Vec<ProducerConsumerQueue<T>>>,
    sealed: std::sync::atomic::AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> Distributor<T> {
    pub fn new<I>(source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            source: std::sync::Mutex::new(Some(Box::new(source.into_iter()))),
            outputs: std::sync::Mutex::new(Vec::new()),
            sealed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Registers a new output queue fed by the shared upstream iterator.
    /// Fails with [`crate::error::ParallelError::DistributionAlreadyStarted`]
    /// once [`Distributor::start`] has been called.
    pub fn take(&self) -> Result<crate::pcq::Iter<T>> {
        if self.sealed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(crate::error::ParallelError::DistributionAlreadyStarted.into());
        }
        let queue = ProducerConsumerQueue::new();
        self.outputs.lock().unwrap().push(queue.clone());
        Ok(queue.iter())
    }

    /// Seals registration and spawns the feeder task that drives every
    /// registered output from the shared upstream iterator (§4.8's
    /// `for_each(...).do(distribute)`, wired with the same
    /// success/failure/cancellation continuations as a pipeline stage).
    pub fn start(&self) -> Result<Task<()>> {
        if self.sealed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return Err(crate::error::ParallelError::DistributionAlreadyStarted.into());
        }
        let source = self.source.lock().unwrap().take().expect("start called once");
        let outputs = self.outputs.lock().unwrap().clone();

        let feed_outputs = outputs.clone();
        let feeder = Task::run(move |task| {
            for item in source {
                task.interrupt().raise_if_signaled()?;
                for out in &feed_outputs {
                    out.put(item.clone())?;
                }
            }
            Ok(())
        });

        let complete_outputs = outputs.clone();
        feeder.continue_with(crate::task::ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, move |_cont, _ant| {
            for out in &complete_outputs {
                let _ = out.complete();
            }
            Ok(())
        });
        feeder.continue_with(
            crate::task::ContinuationOptions::ON_FAILED | crate::task::ContinuationOptions::INLINE,
            move |_cont, ant| {
                let err = ant.exception().unwrap_or(crate::error::ParallelError::Completed.into());
                for out in &outputs {
                    out.fail_if_not_complete(err.clone());
                }
                Ok(())
            },
        );

        Ok(feeder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_each_visits_every_item() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = std::sync::Arc::clone(&counter);
        let task = for_each(vec![1, 2, 3, 4], move |_task, _item| {
            c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();
        task.result().unwrap();
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[test]
    fn map_collects_every_mapped_output() {
        let mut out: Vec<i32> = map(vec![1, 2, 3], |_task, item| item * 10).unwrap().map(Result::unwrap).collect();
        out.sort();
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn distributor_feeds_every_registered_output() {
        let dist = Distributor::new(vec![1, 2, 3]);
        let a = dist.take().unwrap();
        let b = dist.take().unwrap();
        let task = dist.start().unwrap();
        let a_items: Vec<i32> = a.map(Result::unwrap).collect();
        let b_items: Vec<i32> = b.map(Result::unwrap).collect();
        task.result().unwrap();
        assert_eq!(a_items, vec![1, 2, 3]);
        assert_eq!(b_items, vec![1, 2, 3]);
    }

    #[test]
    fn distributor_rejects_take_after_start() {
        let dist = Distributor::new(vec![1]);
        dist.start().unwrap();
        assert!(dist.take().is_err());
    }
}
