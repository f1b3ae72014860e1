//! Reentrant lock with the scheduler-aware `acquire` contract (§4.2).
//!
//! Both [`Lock`] and [`Semaphore`](super::Semaphore) share the same
//! three-step `acquire`: fail fast if already interrupted, try the
//! underlying primitive for up to `SUSPEND_AFTER`, and only then suspend
//! the current task and poll. This module implements that contract once
//! against a raw, non-reentrant `std::sync::Mutex`-backed permit and a
//! reentrancy counter on top, rather than duplicating the timing logic
//! for both a reentrant and non-reentrant variant as the original does —
//! a non-reentrant lock is simply one whose reentrancy counter never
//! exceeds 1.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, RuntimeError, ThreadingError};
use crate::sync::event::AutoClearEvent;
use crate::sync::interrupt::InterruptToken;
use crate::timing::WaitTiming;

struct State {
    held_by: Option<u64>,
    depth: u32,
}

/// A mutual-exclusion lock. Reentrant by default (matching the
/// original's `Lock(reentrant=True)`); construct with
/// [`Lock::non_reentrant`] for a lock that forbids a thread from
/// acquiring it twice.
pub struct Lock {
    state: Mutex<State>,
    released: AutoClearEvent,
    reentrant: bool,
    timing: WaitTiming,
}

/// A thread identity stable for the lifetime of the thread, used by
/// [`Lock`] to detect reentrant acquisition without relying on
/// `ThreadId`'s unstable internal representation.
fn current_thread_token() -> u64 {
    thread_local! {
        static TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
    }
    static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);
    TOKEN.with(|t| *t)
}

impl Lock {
    pub fn new() -> Arc<Self> {
        Self::with_timing(true, WaitTiming::default())
    }

    pub fn non_reentrant() -> Arc<Self> {
        Self::with_timing(false, WaitTiming::default())
    }

    /// Like [`Lock::new`]/[`Lock::non_reentrant`], but overriding the
    /// default suspend/poll cadence.
    pub fn with_timing(reentrant: bool, timing: WaitTiming) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State { held_by: None, depth: 0 }),
            released: AutoClearEvent::new(),
            reentrant,
            timing,
        })
    }

    fn try_acquire(&self) -> bool {
        let me = current_thread_token();
        let mut state = self.state.lock().unwrap();
        match state.held_by {
            None => {
                state.held_by = Some(me);
                state.depth = 1;
                true
            }
            Some(owner) if owner == me && self.reentrant => {
                state.depth += 1;
                true
            }
            _ => false,
        }
    }

    /// The shared three-step contract (§4.2): fail fast on an already
    /// signaled interrupt, try-acquire within `SUSPEND_AFTER`, then
    /// suspend and poll until acquired, cancelled, or timed out.
    pub fn acquire(&self, timeout: Option<Duration>, interrupt: Option<&InterruptToken>) -> Result<bool> {
        if let Some(d) = timeout {
            if d < Duration::ZERO {
                return Err(RuntimeError::Threading(ThreadingError::InvalidTimeout));
            }
        }
        if let Some(token) = interrupt {
            token.raise_if_signaled()?;
        }
        if self.try_acquire() {
            return Ok(true);
        }
        if timeout == Some(Duration::ZERO) {
            return Ok(false);
        }

        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        let first_wait = timeout.map(|d| d.min(self.timing.suspend_after)).unwrap_or(self.timing.suspend_after);
        if self.released.wait(Some(first_wait), interrupt)? && self.try_acquire() {
            return Ok(true);
        }
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                return Ok(false);
            }
        }

        let _suspend = crate::scheduler::suspend_current();
        loop {
            if let Some(token) = interrupt {
                token.raise_if_signaled()?;
            }
            if self.try_acquire() {
                return Ok(true);
            }
            if let Some(deadline) = deadline {
                if std::time::Instant::now() >= deadline {
                    return Ok(false);
                }
            }
            let _ = self.released.wait(Some(self.timing.poll_interval), interrupt)?;
        }
    }

    pub fn release(&self) {
        let me = current_thread_token();
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(state.held_by, Some(me), "release() called by a thread that does not hold the lock");
        state.depth -= 1;
        if state.depth == 0 {
            state.held_by = None;
            drop(state);
            self.released.signal();
        }
    }
}

/// RAII guard released on drop; returned by
/// [`acquire_or_fail`](crate::sync::acquire_or_fail).
pub struct LockGuard {
    lock: Arc<Lock>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Scoped-acquisition sugar (§4.2): acquires `lock` within `timeout` or
/// raises `make_error()`, guaranteeing release on every exit path.
pub fn acquire_or_fail(
    lock: &Arc<Lock>,
    timeout: Option<Duration>,
    interrupt: Option<&InterruptToken>,
    make_error: impl FnOnce() -> RuntimeError,
) -> Result<LockGuard> {
    if lock.acquire(timeout, interrupt)? {
        Ok(LockGuard { lock: Arc::clone(lock) })
    } else {
        Err(make_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_lock_allows_nested_acquire_on_same_thread() {
        let lock = Lock::new();
        assert!(lock.acquire(Some(Duration::ZERO), None).unwrap());
        assert!(lock.acquire(Some(Duration::ZERO), None).unwrap());
        lock.release();
        lock.release();
    }

    #[test]
    fn non_reentrant_lock_rejects_nested_acquire_on_same_thread() {
        let lock = Lock::non_reentrant();
        assert!(lock.acquire(Some(Duration::ZERO), None).unwrap());
        assert!(!lock.acquire(Some(Duration::ZERO), None).unwrap());
        lock.release();
    }

    #[test]
    fn already_signaled_interrupt_fails_fast() {
        let signal = crate::sync::InterruptSignal::default();
        signal.signal();
        let lock = Lock::new();
        let err = lock.acquire(Some(Duration::from_secs(1)), Some(&signal.interrupt())).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn contended_lock_is_eventually_acquired_across_threads() {
        let lock = Lock::non_reentrant();
        assert!(lock.acquire(None, None).unwrap());
        let other = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.acquire(Some(Duration::from_secs(2)), None).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        lock.release();
        assert!(other.join().unwrap());
    }
}
