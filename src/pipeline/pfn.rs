//! `PFn`: the base parallel-map stage every other stage builds on (§4.7).

use std::sync::{Arc, Mutex};

use crate::error::{AggregateError, ParallelError, Result, RuntimeError};
use crate::pcq::ProducerConsumerQueue;
use crate::task::{ContinuationOptions, Task};

use super::context::{Parallelism, ParallelContext};
use super::{iter_of, PIter, Stage};

type MapFn<In, Out> = dyn Fn(&Task<()>, In) -> Result<Vec<Out>> + Send + Sync;

/// Runs `f` over each input item on up to `parallelism` worker tasks,
/// flat-mapping each item into zero or more outputs (grounded in the
/// original's `PFn.__call__`).
pub struct PFn<In, Out> {
    f: Arc<MapFn<In, Out>>,
    parallelism: Parallelism,
}

impl<In, Out> Clone for PFn<In, Out> {
    fn clone(&self) -> Self {
        Self { f: Arc::clone(&self.f), parallelism: self.parallelism }
    }
}

impl<In: Send + Sync + 'static, Out: Send + Sync + 'static> PFn<In, Out> {
    pub fn new(f: impl Fn(&Task<()>, In) -> Vec<Out> + Send + Sync + 'static) -> Self {
        Self::try_new(move |task, item| Ok(f(task, item)))
    }

    /// Like [`PFn::new`], but `f` may itself fail an item, aborting the
    /// worker task that was processing it.
    pub fn try_new(f: impl Fn(&Task<()>, In) -> Result<Vec<Out>> + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f), parallelism: Parallelism::Threads(2) }
    }

    pub fn with_parallelism(mut self, parallelism: impl Into<Parallelism>) -> Self {
        self.parallelism = parallelism.into();
        self
    }
}

impl<In: Send + Sync + 'static, Out: Send + Sync + 'static> Stage<In, Out> for PFn<In, Out> {
    fn call(&self, items: PIter<In>, ctx: &ParallelContext) -> Result<PIter<Out>> {
        let parallelism = ctx.resolve(self.parallelism);
        let shared_input = Arc::new(Mutex::new(items));
        let out_queue: ProducerConsumerQueue<Out> = ProducerConsumerQueue::new();

        let workers: Vec<Task<()>> = (0..parallelism)
            .map(|i| {
                let shared_input = Arc::clone(&shared_input);
                let out_queue = out_queue.clone();
                let f = Arc::clone(&self.f);
                Task::create()
                    .name(format!("pfn-worker-{i}"))
                    .scheduler(ctx.scheduler())
                    .interrupt(ctx.interrupt())
                    .run(move |task| {
                        loop {
                            task.interrupt().raise_if_signaled()?;
                            let next = shared_input.lock().unwrap().next();
                            match next {
                                Some(Ok(item)) => {
                                    for output in f(task, item)? {
                                        out_queue.put(output)?;
                                    }
                                }
                                Some(Err(err)) => return Err(err),
                                None => return Ok(()),
                            }
                        }
                    })
            })
            .collect();

        wire_output(&workers, out_queue.clone());
        Ok(iter_of(out_queue))
    }
}

/// Wires the standard success/failure/cancellation continuations from a
/// worker-task fan-out onto its shared output queue (§4.7, §4.8):
/// complete on universal success, fail with the aggregated worker errors
/// on any failure, fail with a cancellation-derived error on any
/// cancellation.
pub(super) fn wire_output(workers: &[Task<()>], out_queue: ProducerConsumerQueue<impl Send + Sync + 'static>) {
    {
        let out_queue = out_queue.clone();
        Task::with_all(workers, ContinuationOptions::ON_COMPLETED_SUCCESSFULLY, None).run(move |_cont, _tasks| {
            let _ = out_queue.complete();
            Ok(())
        });
    }
    {
        let out_queue = out_queue.clone();
        Task::with_any(workers, ContinuationOptions::ON_FAILED | ContinuationOptions::INLINE, None).run(
            move |_cont, tasks: &[Task<()>]| {
                let failures: Vec<RuntimeError> =
                    tasks.iter().filter_map(|t| if t.state() == crate::task::TaskState::Failed { t.exception() } else { None }).collect();
                out_queue.fail_if_not_complete(AggregateError::new(failures).into());
                Ok(())
            },
        );
    }
    {
        Task::with_any(workers, ContinuationOptions::ON_CANCELED | ContinuationOptions::INLINE, None).run(
            move |_cont, tasks: &[Task<()>]| {
                if let Some(err) = tasks.iter().find_map(|t| if t.state() == crate::task::TaskState::Canceled { t.exception() } else { None }) {
                    out_queue.fail_if_not_complete(err);
                }
                Ok(())
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_item() {
        let stage = PFn::new(|_task, item: i32| vec![item * 3]);
        let mut out: Vec<i32> = stage.run(vec![1, 2, 3]).unwrap().map(Result::unwrap).collect();
        out.sort();
        assert_eq!(out, vec![3, 6, 9]);
    }

    #[test]
    fn worker_failure_fails_the_output_queue() {
        let stage: PFn<i32, i32> = PFn::try_new(|_task, _item| Err(ParallelError::Completed.into()));
        let mut iter = stage.run(vec![1]).unwrap();
        assert!(iter.next().unwrap().is_err());
    }
}
