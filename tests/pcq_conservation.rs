//! Property tests for §8 invariant 5 (PCQ conservation) and invariant 9
//! (idempotent completion) against the public `ProducerConsumerQueue` API.

use proptest::prelude::*;
use weft::pcq::ProducerConsumerQueue;

proptest! {
    /// For any completed queue that never failed, every item put is
    /// eventually taken, in the same order, with nothing lost or
    /// duplicated.
    #[test]
    fn put_then_take_preserves_every_item(items in proptest::collection::vec(any::<i32>(), 0..64)) {
        let queue: ProducerConsumerQueue<i32> = ProducerConsumerQueue::new();
        for item in &items {
            queue.put(*item).unwrap();
        }
        queue.complete().unwrap();

        let mut taken = Vec::new();
        while let Some(item) = queue.try_take().unwrap() {
            taken.push(item);
        }
        prop_assert_eq!(taken, items);
    }

    /// Completing a queue twice always fails, and failing it after
    /// completion always fails — terminal transitions never silently
    /// succeed a second time.
    #[test]
    fn completion_is_monotonic(items in proptest::collection::vec(any::<i32>(), 0..16)) {
        let queue: ProducerConsumerQueue<i32> = ProducerConsumerQueue::new();
        for item in items {
            queue.put(item).unwrap();
        }
        queue.complete().unwrap();
        prop_assert!(queue.complete().is_err());
        queue.fail_if_not_complete(weft::error::ParallelError::Completed.into());
        prop_assert!(!queue.is_failed());
    }
}
