//! Low-level synchronization primitives: events, continuations,
//! interrupts, locks, and semaphores (§3, §4.1-§4.3).

mod continuation;
mod event;
mod interrupt;
mod lock;
mod semaphore;

pub use event::{AutoClearEvent, Event};
pub use interrupt::{InterruptSignal, InterruptToken};
pub use lock::{acquire_or_fail, Lock, LockGuard};
pub use semaphore::Semaphore;

pub(crate) use continuation::{Continuation, Policy};
