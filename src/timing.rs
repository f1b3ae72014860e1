//! Shared wait-timing constants.
//!
//! `SUSPEND_AFTER` bounds how long a blocking primitive spins on its
//! underlying OS wait before telling the scheduler it is about to block
//! (so a replacement worker can be spawned, §4.4). `POLL_INTERVAL` is the
//! granularity of the subsequent suspended poll loop, re-checking the
//! interrupt on every tick.
use std::time::Duration;

pub const SUSPEND_AFTER: Duration = Duration::from_millis(50);
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Timing knobs exposed to embedders who construct a non-default
/// [`crate::scheduler::ConcurrentTaskScheduler`] and want to tune the
/// suspend/poll cadence, e.g. in tests that want tighter polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTiming {
    pub suspend_after: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitTiming {
    fn default() -> Self {
        Self {
            suspend_after: SUSPEND_AFTER,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Construction knobs for [`crate::scheduler::ConcurrentTaskScheduler`]:
/// how many worker threads it keeps at the parallelism ceiling, and how
/// long an idle worker waits for the next task before retiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_parallelism: usize,
    pub keep_alive: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallelism: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            keep_alive: Duration::from_secs(30),
        }
    }
}
