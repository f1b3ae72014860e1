//! Cooperative cancellation: a DAG of linked tokens that signal together
//! (§3, §4.3).
//!
//! # Design background (Why)
//! Cancellation here is never preemptive — a token being signaled only
//! changes what the *next* cooperative check observes. What makes it
//! useful across a task tree is transitive linking: a child task's token
//! is created with its parent's token as a link, so cancelling the parent
//! reaches every descendant in one logical step, all adopting the same
//! `signal_id`. That id is what later lets a task tell "I was cancelled
//! by my own token" (→ CANCELED) apart from "I observed someone else's
//! cancellation" (→ FAILED), per §4.5.
//!
//! # Logic (How)
//! Links are stored as [`Weak`] references from parent to child so a
//! signaled subgraph can be dropped once nothing else is holding its
//! tokens (§9). Propagation is a plain recursive walk; cycle-tolerance
//! falls out for free because a token can only ever transition from
//! unsignaled to signaled once — the same `signal_id`-is-already-set
//! check that gives at-most-once signaling also doubles as the DFS
//! visited set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Cancelled, Result, TokenId};
use crate::sync::event::Event;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

fn next_token_id() -> u64 {
    NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)
}

fn next_signal_id() -> u64 {
    NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed)
}

struct TokenInner {
    id: u64,
    signal_id: Mutex<Option<u64>>,
    event: Event,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

/// An immutable-after-signal cancellation handle. Cheap to clone (it's an
/// `Arc` wrapper); every clone observes the same signal.
#[derive(Clone)]
pub struct InterruptToken {
    inner: Arc<TokenInner>,
}

impl InterruptToken {
    fn new_linked(parents: &[InterruptToken]) -> Self {
        let inner = Arc::new(TokenInner {
            id: next_token_id(),
            signal_id: Mutex::new(None),
            event: Event::new(),
            children: Mutex::new(Vec::new()),
        });
        let token = InterruptToken { inner };

        for parent in parents {
            if let Some(id) = parent.signal_id() {
                // Parent already fired: no link is needed, the child is
                // born signaled with the same id (§4.3).
                token.force_signal(id);
                continue;
            }
            parent.inner.children.lock().unwrap().push(Arc::downgrade(&token.inner));
        }
        token
    }

    /// A token that can never be signaled, for call sites that don't
    /// want cancellation at all.
    pub fn none() -> Self {
        Self::new_linked(&[])
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.signal_id.lock().unwrap().is_some()
    }

    pub fn signal_id(&self) -> Option<u64> {
        *self.inner.signal_id.lock().unwrap()
    }

    pub fn cancelled_error(&self) -> Option<Cancelled> {
        self.signal_id().map(|signal_id| Cancelled { token: TokenId(self.id()), signal_id })
    }

    pub fn raise_if_signaled(&self) -> Result<()> {
        match self.cancelled_error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn wait(&self, timeout: Option<std::time::Duration>) -> Result<bool> {
        self.inner.event.wait(timeout, None)
    }

    pub(crate) fn event(&self) -> Event {
        self.inner.event.clone()
    }

    fn force_signal(&self, id: u64) {
        let children = {
            let mut signal_id = self.inner.signal_id.lock().unwrap();
            if signal_id.is_some() {
                return;
            }
            *signal_id = Some(id);
            drop(signal_id);
            self.inner.event.signal();
            std::mem::take(&mut *self.inner.children.lock().unwrap())
        };
        for weak_child in children {
            if let Some(child) = weak_child.upgrade() {
                InterruptToken { inner: child }.force_signal(id);
            }
        }
    }

    /// True iff signaling `self` would (transitively) signal `other`,
    /// i.e. `other` is reachable from `self` in the link graph. Tolerates
    /// cycles via an explicit visited set (propagation itself doesn't
    /// need one; this static check walks unsignaled tokens where the
    /// "already signaled" shortcut doesn't apply yet).
    pub fn propagates_to(&self, other: &InterruptToken) -> bool {
        let mut visited = HashSet::new();
        Self::dfs(&self.inner, &other.inner, &mut visited)
    }

    fn dfs(node: &Arc<TokenInner>, target: &Arc<TokenInner>, visited: &mut HashSet<usize>) -> bool {
        if Arc::ptr_eq(node, target) {
            return true;
        }
        if !visited.insert(Arc::as_ptr(node) as *const () as usize) {
            return false;
        }
        let children = node.children.lock().unwrap().clone();
        for weak_child in children {
            if let Some(child) = weak_child.upgrade() {
                if Self::dfs(&child, target, visited) {
                    return true;
                }
            }
        }
        false
    }
}

impl std::fmt::Debug for InterruptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptToken")
            .field("id", &self.id())
            .field("signal_id", &self.signal_id())
            .finish()
    }
}

/// Owner-side handle: constructs a fresh [`InterruptToken`] linked to
/// zero or more parents, and is the only thing that can fire it.
pub struct InterruptSignal {
    token: InterruptToken,
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl InterruptSignal {
    pub fn new(parents: &[InterruptToken]) -> Self {
        Self { token: InterruptToken::new_linked(parents) }
    }

    pub fn interrupt(&self) -> InterruptToken {
        self.token.clone()
    }

    /// Signals this token's subgraph with a fresh `signal_id`, if not
    /// already signaled. Returns the id that ended up recorded (either
    /// the fresh one, or whatever id won a concurrent race).
    pub fn signal(&self) -> u64 {
        let id = next_signal_id();
        self.token.force_signal(id);
        self.token.signal_id().unwrap_or(id)
    }
}
