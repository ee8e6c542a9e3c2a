//! Bounded FIFO that evicts its oldest entry instead of blocking.
//!
//! Enqueue and dequeue go through a lock-free `crossbeam` channel. Only the
//! overflow path takes `evict`, so that "pop the oldest, push the newest"
//! happens atomically with respect to other overflowing producers.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct FixedCapacityQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    evict: Mutex<()>,
    capacity: usize,
}

impl<T> FixedCapacityQueue<T> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            evict: Mutex::new(()),
            capacity,
        }
    }

    /// Append `item`, evicting the oldest entries while the queue is full.
    /// Returns the number of entries evicted.
    pub fn push(&self, item: T) -> usize {
        let mut item = match self.tx.try_send(item) {
            Ok(()) => return 0,
            Err(TrySendError::Full(item)) => item,
            Err(TrySendError::Disconnected(_)) => return 0,
        };
        let _guard = self.evict.lock();
        let mut evicted = 0;
        loop {
            if self.rx.try_recv().is_ok() {
                evicted += 1;
            }
            match self.tx.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(rejected)) => item = rejected,
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Consumer side, for use in `select!`.
    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn drain<T>(queue: &FixedCapacityQueue<T>) -> Vec<T> {
        std::iter::from_fn(|| queue.try_pop()).collect()
    }

    #[rstest]
    fn keeps_entries_below_capacity() {
        let queue = FixedCapacityQueue::new(3);
        assert_eq!(queue.push("a"), 0);
        assert_eq!(queue.push("b"), 0);
        assert_eq!(queue.len(), 2);
        assert_eq!(drain(&queue), vec!["a", "b"]);
    }

    #[rstest]
    fn overflow_evicts_the_oldest() {
        let queue = FixedCapacityQueue::new(2);
        queue.push("Event 1");
        queue.push("Event 2");
        assert_eq!(queue.push("Event 3"), 1);
        assert_eq!(drain(&queue), vec!["Event 2", "Event 3"]);
    }

    #[rstest]
    fn zero_capacity_holds_one_entry() {
        let queue = FixedCapacityQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(1);
        queue.push(2);
        assert_eq!(drain(&queue), vec![2]);
    }

    #[rstest]
    fn concurrent_overflow_never_exceeds_capacity() {
        let queue = Arc::new(FixedCapacityQueue::new(8));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    (0..500)
                        .map(|n| queue.push(p * 1000 + n))
                        .sum::<usize>()
                })
            })
            .collect();
        let evicted: usize = producers
            .into_iter()
            .map(|h| h.join().expect("producer"))
            .sum();
        assert_eq!(queue.len(), 8);
        assert_eq!(evicted, 2000 - 8);
    }

    proptest! {
        #[test]
        fn retains_the_last_k_in_order(capacity in 1usize..16, extra in 0usize..32) {
            let queue = FixedCapacityQueue::new(capacity);
            let total = capacity + extra;
            let evicted: usize = (0..total).map(|n| queue.push(n)).sum();
            prop_assert_eq!(evicted, extra);
            let expected: Vec<_> = (extra..total).collect();
            prop_assert_eq!(drain(&queue), expected);
        }
    }
}
