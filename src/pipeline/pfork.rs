//! `PFork`: fan an input stream out to several parallel branches and
//! merge their outputs back into one stream (§4.7, §4.8), grounded in
//! the original's `PFork.__call__`.
//!
//! # Design background (Why)
//! Each branch needs its own queue rather than sharing one with the
//! others, because every branch runs a full, independent [`Stage`] that
//! may itself fan out further — sharing one input queue across branches
//! would mean each item is consumed by whichever branch happens to pull
//! it first instead of by every branch, which is a broadcast, not a
//! work-split. Fanning out therefore costs one clone of each item per
//! branch (`In: Clone`), the one place this module's bound diverges from
//! the original, which relies on Python's reference semantics for the
//! same broadcast.

use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::pcq::ProducerConsumerQueue;
use crate::task::Task;

use super::context::{Parallelism, ParallelContext};
use super::pfn::wire_output;
use super::{iter_of, PIter, Stage};

pub struct PFork<In, Out> {
    branches: Vec<Box<dyn Stage<In, Out> + Send + Sync>>,
    fanout_parallelism: Parallelism,
}

impl<In: Clone + Send + Sync + 'static, Out: Send + Sync + 'static> PFork<In, Out> {
    pub fn new(branches: Vec<Box<dyn Stage<In, Out> + Send + Sync>>) -> Self {
        let fanout_parallelism = Parallelism::Threads(branches.len().max(1));
        Self { branches, fanout_parallelism }
    }

    pub fn with_parallelism(mut self, parallelism: impl Into<Parallelism>) -> Self {
        self.fanout_parallelism = parallelism.into();
        self
    }
}

impl<In: Clone + Send + Sync + 'static, Out: Send + Sync + 'static> Stage<In, Out> for PFork<In, Out> {
    fn call(&self, items: PIter<In>, ctx: &ParallelContext) -> Result<PIter<Out>> {
        let branch_inputs: Vec<ProducerConsumerQueue<In>> =
            (0..self.branches.len()).map(|_| ProducerConsumerQueue::new()).collect();

        let shared_input = Arc::new(Mutex::new(items));
        let fanout_count = ctx.resolve(self.fanout_parallelism);
        let fanout: Vec<Task<()>> = (0..fanout_count)
            .map(|i| {
                let shared_input = Arc::clone(&shared_input);
                let branch_inputs = branch_inputs.clone();
                Task::create()
                    .name(format!("pfork-fanout-{i}"))
                    .scheduler(ctx.scheduler())
                    .interrupt(ctx.interrupt())
                    .run(move |task| loop {
                        task.interrupt().raise_if_signaled()?;
                        let next = shared_input.lock().unwrap().next();
                        match next {
                            Some(Ok(item)) => {
                                for queue in &branch_inputs {
                                    queue.put(item.clone())?;
                                }
                            }
                            Some(Err(err)) => return Err(err),
                            None => return Ok(()),
                        }
                    })
            })
            .collect();

        for queue in &branch_inputs {
            wire_output(&fanout, queue.clone());
        }

        let merged_out: ProducerConsumerQueue<Out> = ProducerConsumerQueue::new();
        let mut drain_tasks = Vec::with_capacity(self.branches.len());
        for (branch, input_queue) in self.branches.iter().zip(branch_inputs.into_iter()) {
            let branch_out = branch.call(iter_of(input_queue), ctx)?;
            let merged_out = merged_out.clone();
            let drain = Task::create()
                .name("pfork-merge")
                .scheduler(ctx.scheduler())
                .interrupt(ctx.interrupt())
                .run(move |task| {
                    for item in branch_out {
                        task.interrupt().raise_if_signaled()?;
                        merged_out.put(item?)?;
                    }
                    Ok(())
                });
            drain_tasks.push(drain);
        }

        wire_output(&drain_tasks, merged_out.clone());
        Ok(iter_of(merged_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PFn;

    #[test]
    fn forks_and_merges_all_branches() {
        let double: Box<dyn Stage<i32, i32> + Send + Sync> = Box::new(PFn::new(|_task, item: i32| vec![item * 2]));
        let triple: Box<dyn Stage<i32, i32> + Send + Sync> = Box::new(PFn::new(|_task, item: i32| vec![item * 3]));
        let fork = PFork::new(vec![double, triple]);
        let mut out: Vec<i32> = fork.run(vec![1, 2]).unwrap().map(Result::unwrap).collect();
        out.sort();
        assert_eq!(out, vec![2, 3, 4, 6]);
    }
}
