//! `ParallelContext`: the thread-local stack of ambient pipeline settings
//! (§4.7), grounded in the original's `PContext`/`Stack` pairing.
//!
//! # Design background (Why)
//! A pipeline stage (`PFn`, `PFilter`, `PFork`) doesn't take a scheduler
//! or an interrupt as an explicit argument at every call site — it reads
//! whichever [`ParallelContext`] is innermost on the calling thread. That
//! lets `PFork` push a narrower context (its own interrupt, its own slice
//! of `max_parallelism`) for the branches it spawns tasks on, without
//! every stage constructor threading the same three arguments through.

use std::cell::RefCell;
use std::sync::Arc;

use crate::scheduler::{self, TaskScheduler};
use crate::sync::InterruptToken;

struct Frame {
    max_parallelism: usize,
    scheduler: Arc<dyn TaskScheduler>,
    interrupt: InterruptToken,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// An ambient pipeline configuration: a max parallelism ceiling, a
/// scheduler, and an interrupt, all inherited by nested stages unless a
/// narrower [`ParallelContext`] is pushed first.
#[derive(Clone)]
pub struct ParallelContext {
    max_parallelism: usize,
    scheduler: Arc<dyn TaskScheduler>,
    interrupt: InterruptToken,
}

impl ParallelContext {
    pub fn new(max_parallelism: usize) -> Self {
        Self::with(max_parallelism, None, None)
    }

    pub fn with(
        max_parallelism: usize,
        interrupt: Option<InterruptToken>,
        scheduler: Option<Arc<dyn TaskScheduler>>,
    ) -> Self {
        let max_parallelism = max_parallelism.max(1);
        Self {
            max_parallelism,
            scheduler: scheduler.unwrap_or_else(scheduler::current),
            interrupt: interrupt.unwrap_or_else(|| InterruptToken::none()),
        }
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    pub fn scheduler(&self) -> Arc<dyn TaskScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn interrupt(&self) -> InterruptToken {
        self.interrupt.clone()
    }

    /// The innermost context pushed on this thread, or a root context
    /// sized to the available hardware parallelism if none has been
    /// pushed yet.
    pub fn current() -> Self {
        STACK.with(|stack| match stack.borrow().last() {
            Some(frame) => ParallelContext {
                max_parallelism: frame.max_parallelism,
                scheduler: Arc::clone(&frame.scheduler),
                interrupt: frame.interrupt.clone(),
            },
            None => {
                let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
                ParallelContext::new(parallelism)
            }
        })
    }

    /// Pushes `self` as the current thread's innermost context until the
    /// returned guard is dropped.
    pub fn enter(&self) -> ContextGuard {
        STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                max_parallelism: self.max_parallelism,
                scheduler: Arc::clone(&self.scheduler),
                interrupt: self.interrupt.clone(),
            })
        });
        ContextGuard { _private: () }
    }

    /// Resolves a branch's effective parallelism (an absolute thread
    /// count or a fraction of this context's ceiling) against
    /// `self.max_parallelism`.
    pub fn resolve(&self, parallelism: Parallelism) -> usize {
        match parallelism {
            Parallelism::Threads(n) => n.max(1),
            Parallelism::Fraction(f) => ((self.max_parallelism as f64) * f).ceil().max(1.0) as usize,
        }
    }
}

/// How many worker tasks a stage should run: either an absolute count or
/// a fraction of the ambient context's `max_parallelism` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parallelism {
    Threads(usize),
    Fraction(f64),
}

impl From<usize> for Parallelism {
    fn from(n: usize) -> Self {
        Parallelism::Threads(n)
    }
}

impl From<f64> for Parallelism {
    fn from(f: f64) -> Self {
        Parallelism::Fraction(f)
    }
}

/// RAII guard popping the pushed [`ParallelContext`] on drop.
pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_context_is_visible_until_dropped() {
        let outer = ParallelContext::current().max_parallelism();
        let ctx = ParallelContext::new(outer + 7);
        {
            let _guard = ctx.enter();
            assert_eq!(ParallelContext::current().max_parallelism(), outer + 7);
        }
        assert_eq!(ParallelContext::current().max_parallelism(), outer);
    }

    #[test]
    fn resolve_handles_threads_and_fraction() {
        let ctx = ParallelContext::new(8);
        assert_eq!(ctx.resolve(Parallelism::Threads(3)), 3);
        assert_eq!(ctx.resolve(Parallelism::Fraction(0.5)), 4);
    }
}
