//! Counting semaphore sharing the `acquire(timeout, interrupt)` contract
//! with [`super::Lock`] (§4.2).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, RuntimeError, ThreadingError};
use crate::sync::event::AutoClearEvent;
use crate::sync::interrupt::InterruptToken;
use crate::timing::WaitTiming;

pub struct Semaphore {
    permits: AtomicUsize,
    max_permits: usize,
    released: AutoClearEvent,
    timing: WaitTiming,
}

impl Semaphore {
    pub fn new(max_permits: usize) -> Arc<Self> {
        Self::with_timing(max_permits, WaitTiming::default())
    }

    /// Like [`Semaphore::new`], but overriding the default suspend/poll
    /// cadence.
    pub fn with_timing(max_permits: usize, timing: WaitTiming) -> Arc<Self> {
        Arc::new(Self {
            permits: AtomicUsize::new(max_permits),
            max_permits,
            released: AutoClearEvent::new(),
            timing,
        })
    }

    fn try_acquire(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1))
            .is_ok()
    }

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

        let deadline = timeout.map(|d| Instant::now() + d);
        let first_wait = timeout.map(|d| d.min(self.timing.suspend_after)).unwrap_or(self.timing.suspend_after);
        if self.released.wait(Some(first_wait), interrupt)? && self.try_acquire() {
            return Ok(true);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
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
                if Instant::now() >= deadline {
                    return Ok(false);
                }
            }
            let _ = self.released.wait(Some(self.timing.poll_interval), interrupt)?;
        }
    }

    pub fn release(&self) {
        let prev = self.permits.fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
            Some((p + 1).min(self.max_permits))
        });
        debug_assert!(prev.is_ok());
        // Only one waiter consumes this signal (AutoClearEvent is
        // one-shot); any waiter that misses it still re-checks
        // `try_acquire` on its own poll cadence, so no permit is stranded.
        self.released.signal();
    }

    pub fn available_permits(&self) -> usize {
        self.permits.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_consumes_a_permit() {
        let sem = Semaphore::new(1);
        assert!(sem.acquire(Some(Duration::ZERO), None).unwrap());
        assert!(!sem.acquire(Some(Duration::ZERO), None).unwrap());
        sem.release();
        assert!(sem.acquire(Some(Duration::ZERO), None).unwrap());
    }

    #[test]
    fn contended_semaphore_wakes_waiter_on_release() {
        let sem = Semaphore::new(1);
        assert!(sem.acquire(None, None).unwrap());
        let other = {
            let sem = Arc::clone(&sem);
            std::thread::spawn(move || sem.acquire(Some(Duration::from_secs(2)), None).unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        sem.release();
        assert!(other.join().unwrap());
    }
}
