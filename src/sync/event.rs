//! Manual-reset and auto-clear signaling primitives (§3, §4.1).
//!
//! # Design background (Why)
//! Every blocking wait in this crate — on an event, a lock, a semaphore,
//! a queue — ultimately bottoms out in [`Event::wait`]'s two-tier timing:
//! spin on the underlying condvar for `SUSPEND_AFTER`, and only once that
//! window elapses tell the scheduler the current worker is about to
//! block, so a replacement worker can keep the pool's useful parallelism
//! at its configured ceiling. Getting this one function right is most of
//! what makes `suspend`-based liveness (§8 invariant 8) work at all.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Cancelled, Result, RuntimeError, TokenId};
use crate::sync::continuation::{Continuation, Policy};
use crate::sync::interrupt::InterruptToken;
use crate::timing::{POLL_INTERVAL, SUSPEND_AFTER};

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    auto_clear: bool,
}

struct State {
    signaled: bool,
    continuations: Vec<Arc<Continuation>>,
}

/// A manual-reset event with an attached continuation registry.
///
/// Cloning an `Event` shares the same underlying flag and registry (it is
/// an `Arc` handle), matching the original's reference semantics.
#[derive(Clone)]
pub struct Event {
    shared: Arc<Shared>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self::with_auto_clear(false)
    }

    fn with_auto_clear(auto_clear: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State { signaled: false, continuations: Vec::new() }),
                cond: Condvar::new(),
                auto_clear,
            }),
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.shared.state.lock().unwrap().signaled
    }

    pub fn clear(&self) {
        self.shared.state.lock().unwrap().signaled = false;
    }

    /// Sets the flag and, while still holding the event's lock, takes a
    /// snapshot of pending continuations — but dispatches them only
    /// *after* releasing the lock (§9 "split the critical section"), so a
    /// continuation action can itself touch this event without
    /// deadlocking.
    pub fn signal(&self) {
        let fired = {
            let mut state = self.shared.state.lock().unwrap();
            if state.signaled {
                return; // re-signaling an already-set event is a no-op
            }
            state.signaled = true;
            std::mem::take(&mut state.continuations)
        };
        self.shared.cond.notify_all();
        for continuation in fired {
            continuation.notify();
        }
    }

    /// Registers `continuation` with this event, firing it immediately
    /// (outside any lock) if the event is already signaled.
    pub(crate) fn register(&self, continuation: Arc<Continuation>) {
        let already_signaled = {
            let mut state = self.shared.state.lock().unwrap();
            if state.signaled {
                true
            } else {
                state.continuations.push(continuation.clone());
                false
            }
        };
        if already_signaled {
            continuation.notify();
        }
    }

    /// Removes `continuation` from this event's registry. Called once a
    /// continuation fires, for every event it was registered on.
    pub(crate) fn forget(&self, continuation: &Continuation) {
        let mut state = self.shared.state.lock().unwrap();
        state
            .continuations
            .retain(|c| !std::ptr::eq(Arc::as_ptr(c), continuation as *const Continuation));
    }

    fn try_consume(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.signaled {
            if self.shared.auto_clear {
                state.signaled = false;
            }
            true
        } else {
            false
        }
    }

    /// Blocks on this event alone, with the two-tier `SUSPEND_AFTER`
    /// timing described in §4.1, no interrupt.
    fn wait_uninterruptible(&self, timeout: Option<Duration>) -> bool {
        if self.try_consume() {
            return true;
        }
        if timeout == Some(Duration::ZERO) {
            return false;
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let first_phase = match timeout {
            Some(t) => t.min(SUSPEND_AFTER),
            None => SUSPEND_AFTER,
        };

        let state = self.shared.state.lock().unwrap();
        let (state, _) = self.shared.cond.wait_timeout_while(state, first_phase, |s| !s.signaled).unwrap();
        drop(state);
        if self.try_consume() {
            return true;
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }

        // Long wait: tell the scheduler we're about to block so it can
        // spawn a replacement worker (§4.4), then poll.
        let _suspend_guard = crate::scheduler::suspend_current();
        loop {
            if self.try_consume() {
                return true;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return false;
                }
            }
            let state = self.shared.state.lock().unwrap();
            if !state.signaled {
                let _ = self.shared.cond.wait_timeout(state, POLL_INTERVAL).unwrap();
            }
        }
    }

    /// Waits for this event, optionally racing an [`InterruptToken`].
    /// `timeout == Some(Duration::ZERO)` is a non-blocking poll.
    /// `timeout == None` waits unbounded. Negative durations cannot be
    /// represented by [`Duration`], so the `InvalidTimeout` case in §5 is
    /// unreachable through this API and is not re-validated here.
    pub fn wait(&self, timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<bool> {
        match interrupt {
            None => Ok(self.wait_uninterruptible(timeout)),
            Some(token) => {
                if let Some(cancelled) = token.cancelled_error() {
                    return Err(RuntimeError::Cancelled(cancelled));
                }
                match wait_any_raw(&[self.clone(), token.event()], timeout)? {
                    Some(0) => Ok(true),
                    Some(_) => Err(RuntimeError::Cancelled(
                        token
                            .cancelled_error()
                            .unwrap_or(Cancelled { token: TokenId(token.id()), signal_id: 0 }),
                    )),
                    None => Ok(false),
                }
            }
        }
    }

    /// Waits until at least one of `events` signals (or `interrupt`
    /// fires, or `timeout` elapses).
    pub fn wait_any(events: &[Event], timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<bool> {
        build_composite(events, Policy::Any).wait(timeout, interrupt)
    }

    /// Waits until every one of `events` has signaled (or `interrupt`
    /// fires, or `timeout` elapses).
    pub fn wait_all(events: &[Event], timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<bool> {
        build_composite(events, Policy::All).wait(timeout, interrupt)
    }
}

fn build_composite(events: &[Event], policy: Policy) -> Event {
    let composite = Event::new();
    let sink = composite.clone();
    let continuation = Arc::new(Continuation::new(policy, events.len().max(1), move || sink.signal()));
    if events.is_empty() {
        // Vacuously true for ALL, impossible for ANY; signal immediately
        // either way since there is nothing left to observe.
        composite.signal();
        return composite;
    }
    for event in events {
        continuation.track(event.clone());
        event.register(Arc::clone(&continuation));
    }
    composite
}

/// Returns `Ok(Some(index))` of the first event in `events` observed
/// signaled once the composite gate fires, `Ok(None)` on timeout.
fn wait_any_raw(events: &[Event], timeout: Option<Duration>) -> Result<Option<usize>> {
    let composite = build_composite(events, Policy::Any);
    if !composite.wait_uninterruptible(timeout) {
        return Ok(None);
    }
    for (i, event) in events.iter().enumerate() {
        if event.is_signaled() {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// An [`Event`] whose wait consumes the signal: each successful wait
/// clears the flag, giving one-shot producer/consumer notification
/// semantics (§3).
#[derive(Clone)]
pub struct AutoClearEvent {
    inner: Event,
}

impl Default for AutoClearEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoClearEvent {
    pub fn new() -> Self {
        Self { inner: Event::with_auto_clear(true) }
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.is_signaled()
    }

    pub fn signal(&self) {
        self.inner.signal();
    }

    pub fn wait(&self, timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<bool> {
        self.inner.wait(timeout, interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn signal_wakes_waiter() {
        let event = Event::new();
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait(Some(Duration::from_secs(2)), None).unwrap())
        };
        thread::sleep(Duration::from_millis(10));
        event.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn resignal_is_noop_for_already_fired_continuations() {
        let event = Event::new();
        event.signal();
        event.signal(); // must not panic or double-fire anything
        assert!(event.is_signaled());
    }

    #[test]
    fn auto_clear_consumes_signal_once() {
        let event = AutoClearEvent::new();
        event.signal();
        assert!(event.wait(Some(Duration::ZERO), None).unwrap());
        assert!(!event.wait(Some(Duration::ZERO), None).unwrap());
    }

    #[test]
    fn wait_any_reports_first_signaled() {
        let a = Event::new();
        let b = Event::new();
        b.signal();
        assert!(Event::wait_any(&[a, b], Some(Duration::from_millis(100)), None).unwrap());
    }

    #[test]
    fn wait_all_waits_for_every_event() {
        let a = Event::new();
        let b = Event::new();
        let handle = {
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || Event::wait_all(&[a, b], Some(Duration::from_secs(2)), None).unwrap())
        };
        thread::sleep(Duration::from_millis(5));
        a.signal();
        thread::sleep(Duration::from_millis(5));
        b.signal();
        assert!(handle.join().unwrap());
    }
}
