//! The at-most-once ANY/ALL gate that sits between [`super::Event`] and
//! whatever it dispatches (§4.1, §8 invariant 2).
//!
//! # Logic (How)
//! A `Continuation` is registered on every [`Event`](super::Event) it
//! observes. Each observed event calls [`Continuation::notify`] exactly
//! once, when (and if) it signals. For an `All` policy the continuation
//! counts down a `remaining` counter and only fires when the last
//! observer reports in; for `Any` policy the first report fires it. A
//! `compare_exchange` on `fired` is what makes firing — and therefore the
//! `true` return that triggers cross-event cleanup — happen at most once,
//! even if multiple events signal concurrently.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Any,
    All,
}

pub struct Continuation {
    policy: Policy,
    remaining: AtomicUsize,
    fired: AtomicBool,
    events: Mutex<Vec<Event>>,
    action: Mutex<Option<Box<dyn FnOnce() + Send + 'static>>>,
}

impl Continuation {
    pub fn new(policy: Policy, observed_count: usize, action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            policy,
            remaining: AtomicUsize::new(observed_count.max(1)),
            fired: AtomicBool::new(false),
            events: Mutex::new(Vec::with_capacity(observed_count)),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    pub fn track(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Called by an observed event when it signals. Returns `true` if
    /// this call caused the continuation to fire (at most one call ever
    /// returns `true` for a given continuation — invariant 2).
    pub fn notify(&self) -> bool {
        let should_attempt_fire = match self.policy {
            Policy::Any => true,
            Policy::All => self.remaining.fetch_sub(1, Ordering::AcqRel) == 1,
        };
        if !should_attempt_fire {
            return false;
        }
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Cross-event cleanup: detach from every observed event so a
        // later signal never re-notifies an already-fired continuation.
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        for event in events {
            event.forget(self);
        }

        if let Some(action) = self.action.lock().unwrap().take() {
            action();
        }
        true
    }
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("policy", &self.policy)
            .field("fired", &self.is_fired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    #[test]
    fn all_policy_fires_once_last_observer_reports() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let gate = Continuation::new(Policy::All, 3, move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!gate.notify());
        assert!(!gate.notify());
        assert!(gate.notify());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    /// §8 invariant 2: across every observed event, `notify` returns
    /// `true` for at most one call, even when events signal
    /// concurrently from different threads.
    #[test]
    fn any_policy_fires_at_most_once_under_concurrent_notify() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let gate = Arc::new(Continuation::new(Policy::Any, 8, move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let barrier = Arc::new(Barrier::new(8));
        let true_count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let barrier = Arc::clone(&barrier);
                let true_count = Arc::clone(&true_count);
                std::thread::spawn(move || {
                    barrier.wait();
                    if gate.notify() {
                        true_count.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(true_count.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
