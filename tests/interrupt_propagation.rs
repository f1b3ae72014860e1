//! Property test for §8 invariant 3 (interrupt propagation soundness)
//! against the public `InterruptSignal`/`InterruptToken` API.

use proptest::prelude::*;
use weft::sync::{InterruptSignal, InterruptToken};

/// Builds a chain of `depth + 1` linked tokens, each the sole parent of
/// the next, returning the owning root signal and every token in the
/// chain (root first, deepest leaf last). The whole chain is returned so
/// the caller keeps every link alive — an intermediate token dropped
/// early would sever propagation through it.
fn linked_chain(depth: usize) -> (InterruptSignal, Vec<InterruptToken>) {
    let root = InterruptSignal::default();
    let mut chain = vec![root.interrupt()];
    for _ in 0..depth {
        let parent = chain.last().unwrap().clone();
        let link = InterruptSignal::new(&[parent]);
        chain.push(link.interrupt());
    }
    (root, chain)
}

proptest! {
    /// Signaling the root of a chain propagates to every descendant with
    /// the same `signal_id`, however long the chain.
    #[test]
    fn signal_propagates_through_a_chain(depth in 0usize..16) {
        let (root, chain) = linked_chain(depth);
        let leaf = chain.last().unwrap();
        prop_assert!(root.interrupt().propagates_to(leaf));
        let id = root.signal();
        for token in &chain {
            prop_assert!(token.is_signaled());
            prop_assert_eq!(token.signal_id(), Some(id));
        }
    }

    /// The link graph only flows parent to child: the leaf of a chain
    /// never reaches back up to an ancestor.
    #[test]
    fn signal_does_not_propagate_upward(depth in 1usize..16) {
        let (root, chain) = linked_chain(depth);
        let leaf = chain.last().unwrap();
        prop_assert!(!leaf.propagates_to(&root.interrupt()));
    }
}
