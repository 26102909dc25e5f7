//! In-flight publish tracking.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;

#[derive(Debug)]
struct Ledger {
    next_seq: u64,
    pending: BTreeSet<u64>,
}

/// `watermark` is the lowest unsettled dispatch number: every dispatch
/// numbered below it has settled. It never decreases.
#[derive(Debug)]
struct Settled {
    ledger: Mutex<Ledger>,
    watermark: watch::Sender<u64>,
}

impl Settled {
    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, seq: u64) {
        let mut ledger = self.lock();
        ledger.pending.remove(&seq);
        let low = ledger.pending.first().copied().unwrap_or(ledger.next_seq);
        self.watermark.send_if_modified(|w| {
            if low > *w {
                *w = low;
                true
            } else {
                false
            }
        });
    }
}

/// Marks its dispatch settled when dropped, so a panicking or cancelled
/// publish still releases waiting drains.
struct SettleOnDrop {
    seq: u64,
    settled: Arc<Settled>,
}

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        self.settled.settle(self.seq);
    }
}

/// Tracks dispatched publish tasks from spawn until they settle.
///
/// `drain` waits only for dispatches made before it was called; work
/// dispatched while it waits does not extend the wait.
#[derive(Debug)]
pub struct InFlightTracker {
    runtime: Handle,
    settled: Arc<Settled>,
}

impl InFlightTracker {
    pub fn new(runtime: Handle) -> Self {
        let (watermark, _) = watch::channel(0);
        Self {
            runtime,
            settled: Arc::new(Settled {
                ledger: Mutex::new(Ledger {
                    next_seq: 0,
                    pending: BTreeSet::new(),
                }),
                watermark,
            }),
        }
    }

    /// Spawn `task` on the tracker's runtime. Safe to call from any thread.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = {
            let mut ledger = self.settled.lock();
            let seq = ledger.next_seq;
            ledger.next_seq += 1;
            ledger.pending.insert(seq);
            seq
        };
        let guard = SettleOnDrop {
            seq,
            settled: Arc::clone(&self.settled),
        };
        self.runtime.spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Dispatches that have not settled yet.
    pub fn len(&self) -> usize {
        self.settled.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dispatches made so far.
    pub fn dispatched(&self) -> u64 {
        self.settled.lock().next_seq
    }

    /// Wait until every task dispatched before this call has settled.
    pub async fn drain(&self) {
        let target = self.dispatched();
        let mut watermark = self.settled.watermark.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = watermark.wait_for(|low| *low >= target).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drain_waits_for_all_tasks() {
        let tracker = InFlightTracker::new(Handle::current());
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..5u64 {
            let done = Arc::clone(&done);
            tracker.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(tracker.len(), 5);
        assert_eq!(tracker.dispatched(), 5);
        tracker.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_drain_when_empty_returns_and_is_repeatable() {
        let tracker = InFlightTracker::new(Handle::current());
        tracker.drain().await;
        tracker.drain().await;

        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        tracker.spawn(async move {
            d.fetch_add(1, Ordering::SeqCst);
        });
        tracker.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_drains_both_complete() {
        let tracker = Arc::new(InFlightTracker::new(Handle::current()));
        tracker.spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        let a = tokio::spawn({
            let t = Arc::clone(&tracker);
            async move { t.drain().await }
        });
        let b = tokio::spawn({
            let t = Arc::clone(&tracker);
            async move { t.drain().await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .expect("drains should not hang");
    }

    #[tokio::test]
    async fn test_drain_ignores_later_dispatches() {
        let tracker = Arc::new(InFlightTracker::new(Handle::current()));
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        tracker.spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
        });

        let drain = tokio::spawn({
            let t = Arc::clone(&tracker);
            async move { t.drain().await }
        });
        tokio::task::yield_now().await;
        // Never settles until released after the drain has finished.
        tracker.spawn(async move {
            let _ = gate.await;
        });

        tokio::time::timeout(Duration::from_secs(2), drain)
            .await
            .expect("drain should only wait for earlier dispatches")
            .unwrap();
        release.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), tracker.drain())
            .await
            .expect("released dispatch settles");
    }

    #[tokio::test]
    async fn test_out_of_order_completion_holds_watermark() {
        let tracker = InFlightTracker::new(Handle::current());
        let (release_first, first) = tokio::sync::oneshot::channel::<()>();
        tracker.spawn(async move {
            let _ = first.await;
        });
        tracker.spawn(async {});

        let pending = tokio::time::timeout(Duration::from_millis(50), tracker.drain()).await;
        assert!(pending.is_err(), "first dispatch is still running");

        release_first.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), tracker.drain())
            .await
            .expect("drain completes once the first dispatch settles");
    }

    #[tokio::test]
    async fn test_panicking_task_still_settles() {
        let tracker = InFlightTracker::new(Handle::current());
        tracker.spawn(async {
            panic!("publish blew up");
        });
        tokio::time::timeout(Duration::from_secs(2), tracker.drain())
            .await
            .expect("a panicked task counts as settled");
    }
}
