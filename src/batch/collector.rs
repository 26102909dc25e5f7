//! Batch collector: the pending-item buffer.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Insertion-ordered buffer of items awaiting a flush.
///
/// `add` and `take` share one lock and never hold it across an await, so an
/// item is either in the snapshot a flush takes or in the fresh buffer after it.
#[derive(Debug)]
pub struct BatchCollector<T> {
    flush_at: usize,
    pending: Mutex<Vec<T>>,
}

impl<T> BatchCollector<T> {
    pub fn new(flush_at: usize) -> Self {
        Self {
            flush_at: flush_at.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    // The buffer is a plain Vec; a panic while locked cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, item: T) -> BatchAddResult {
        let mut pending = self.lock();
        pending.push(item);
        let count = pending.len();
        if count >= self.flush_at {
            BatchAddResult::ShouldFlush { count }
        } else {
            BatchAddResult::Added { count }
        }
    }

    /// Swap the buffer for an empty one and return what it held.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchAddResult {
    Added { count: usize },
    ShouldFlush { count: usize },
}

impl BatchAddResult {
    pub fn should_flush(&self) -> bool {
        matches!(self, BatchAddResult::ShouldFlush { .. })
    }
    pub fn count(&self) -> usize {
        match self {
            BatchAddResult::Added { count } | BatchAddResult::ShouldFlush { count } => *count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_collector_empty() {
        let collector: BatchCollector<String> = BatchCollector::new(5);
        assert!(collector.is_empty());
        assert_eq!(collector.len(), 0);
    }

    #[test]
    fn test_add_reports_flush_threshold() {
        let collector: BatchCollector<i32> = BatchCollector::new(3);
        assert_eq!(collector.add(1), BatchAddResult::Added { count: 1 });
        assert!(!collector.add(2).should_flush());
        let result = collector.add(3);
        assert!(result.should_flush());
        assert_eq!(result.count(), 3);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let collector: BatchCollector<i32> = BatchCollector::new(0);
        assert!(collector.add(1).should_flush());
    }

    #[test]
    fn test_take_preserves_order_and_resets() {
        let collector = BatchCollector::new(10);
        collector.add("a");
        collector.add("b");
        collector.add("c");

        assert_eq!(collector.take(), vec!["a", "b", "c"]);
        assert!(collector.is_empty());
        assert!(collector.take().is_empty());
    }

    #[test]
    fn test_concurrent_add_and_take_lose_nothing() {
        let collector: Arc<BatchCollector<i32>> = Arc::new(BatchCollector::new(usize::MAX));

        let producers: Vec<_> = (0..8)
            .map(|i| {
                let c = Arc::clone(&collector);
                thread::spawn(move || {
                    for j in 0..250 {
                        c.add(i * 1000 + j);
                    }
                })
            })
            .collect();

        let drainer = {
            let c = Arc::clone(&collector);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..100 {
                    seen.extend(c.take());
                    thread::yield_now();
                }
                seen
            })
        };

        for p in producers {
            p.join().unwrap();
        }
        let mut all = drainer.join().unwrap();
        all.extend(collector.take());
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 250);
    }
}
