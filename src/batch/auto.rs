//! Auto-batcher: accumulate, then flush on size or interval.

use super::collector::BatchCollector;
use super::entry::EntryBuilder;
use super::inflight::InFlightTracker;
use super::publisher::{BatchPublisher, PublishCounters, PublishSummary};
use crate::config::BatcherConfig;
use crate::events::{EventBus, Subscription};
use crate::transport::BatchSender;
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Facts about a batcher at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatcherStats {
    pub running: bool,
    pub buffered: usize,
    pub in_flight: usize,
    pub items_added: u64,
    pub batches_dispatched: u64,
    pub publish: PublishCounters,
}

struct Inner<T> {
    config: BatcherConfig,
    buffer: BatchCollector<T>,
    publisher: Arc<BatchPublisher<T>>,
    in_flight: InFlightTracker,
    ticker: Mutex<Option<JoinHandle<()>>>,
    items_added: AtomicU64,
    batches_dispatched: AtomicU64,
}

/// Buffers items and hands them to a [`BatchPublisher`] when the buffer
/// reaches `batch_size` or the interval timer fires.
///
/// Cheap to clone; clones share the same buffer and in-flight set. Orderly
/// shutdown is `stop`, then `flush`, then `drain` (or just
/// [`crate::lifecycle::Lifecycle::on_stop`]).
pub struct AutoBatcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for AutoBatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Serialize + Send + Sync + 'static> AutoBatcher<T> {
    /// Batcher with JSON-encoded entries.
    pub fn json(config: BatcherConfig, sender: Arc<dyn BatchSender>) -> Result<Self> {
        Self::new(config, sender, EntryBuilder::json())
    }
}

impl<T: Send + Sync + 'static> AutoBatcher<T> {
    /// Must be called from within a Tokio runtime; dispatches run on it.
    pub fn new(
        config: BatcherConfig,
        sender: Arc<dyn BatchSender>,
        entries: EntryBuilder<T>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::configuration_with_context(
                "AutoBatcher requires a Tokio runtime",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("auto_batcher"),
            )
        })?;
        Self::with_runtime(config, sender, entries, runtime)
    }

    pub fn with_runtime(
        config: BatcherConfig,
        sender: Arc<dyn BatchSender>,
        entries: EntryBuilder<T>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let publisher = BatchPublisher::new(config.publisher_config(), sender, entries)?;
        Ok(Self {
            inner: Arc::new(Inner {
                buffer: BatchCollector::new(config.batch_size),
                publisher: Arc::new(publisher),
                in_flight: InFlightTracker::new(runtime),
                ticker: Mutex::new(None),
                items_added: AtomicU64::new(0),
                batches_dispatched: AtomicU64::new(0),
                config,
            }),
        })
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    /// Buffer one item. Never blocks on I/O; flushes inline once the buffer
    /// reaches `batch_size`.
    pub fn add(&self, item: T) {
        self.inner.add(item);
    }

    /// Arm the interval trigger with the configured `max_batch_interval_ms`.
    pub fn start(&self) -> Result<()> {
        self.start_with_interval(self.inner.config.max_batch_interval())
    }

    pub fn start_with_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::configuration_with_context(
                "flush interval must be greater than 0",
                ErrorContext::new()
                    .with_field_path("max_batch_interval_ms")
                    .with_source("auto_batcher"),
            ));
        }
        let mut ticker = self.inner.lock_ticker();
        if ticker.is_some() {
            return Err(Error::runtime_with_context(
                "batcher already started",
                ErrorContext::new()
                    .with_details(self.inner.config.topic.clone())
                    .with_source("auto_batcher"),
            ));
        }
        let weak = Arc::downgrade(&self.inner);
        *ticker = Some(self.inner.in_flight_runtime().spawn(tick_loop(weak, interval)));
        debug!(
            topic = %self.inner.config.topic,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "flush timer armed"
        );
        Ok(())
    }

    /// Disarm the interval trigger. Does not flush or drain. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.lock_ticker().take() {
            handle.abort();
            debug!(topic = %self.inner.config.topic, "flush timer disarmed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_ticker().is_some()
    }

    /// Dispatch the current buffer as one background publish. Returns the
    /// number of items dispatched; 0 means nothing was sent.
    pub fn flush(&self) -> usize {
        self.inner.flush()
    }

    /// Wait for every publish dispatched before this call to settle.
    ///
    /// Publishes dispatched while waiting do not extend the wait.
    pub async fn drain(&self) {
        self.inner.in_flight.drain().await;
    }

    /// Send `items` directly, bypassing the buffer, and propagate hard errors.
    pub async fn publish_batch(&self, items: &[T]) -> Result<PublishSummary> {
        self.inner.publisher.publish(items).await
    }

    /// Forward every emission of the configured `event_name` to [`Self::add`].
    pub fn subscribe(&self, bus: &EventBus<T>) -> Result<Subscription>
    where
        T: Clone,
    {
        let name = self.inner.config.event_name.clone().ok_or_else(|| {
            Error::configuration_with_context(
                "event_name is required to subscribe",
                ErrorContext::new()
                    .with_field_path("event_name")
                    .with_source("auto_batcher"),
            )
        })?;
        let weak = Arc::downgrade(&self.inner);
        Ok(bus.subscribe(name, move |item: T| {
            if let Some(inner) = weak.upgrade() {
                inner.add(item);
            }
        }))
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            running: self.is_running(),
            buffered: self.inner.buffer.len(),
            in_flight: self.inner.in_flight.len(),
            items_added: self.inner.items_added.load(Ordering::Relaxed),
            batches_dispatched: self.inner.batches_dispatched.load(Ordering::Relaxed),
            publish: self.inner.publisher.counters(),
        }
    }

    /// Stop, flush once, then wait for everything dispatched up to that point.
    ///
    /// Items added concurrently after the final flush stay buffered.
    pub async fn shutdown(&self) {
        self.stop();
        let flushed = self.flush();
        self.drain().await;
        info!(
            topic = %self.inner.config.topic,
            flushed,
            left_buffered = self.inner.buffer.len(),
            "batcher stopped"
        );
    }

    pub(crate) fn log_start(&self) {
        let cfg = &self.inner.config;
        info!(
            topic = %cfg.topic,
            event_name = cfg.event_name.as_deref().unwrap_or("-"),
            batch_size = cfg.batch_size,
            max_batch_size = cfg.max_batch_size,
            interval_ms = cfg.max_batch_interval_ms,
            verbose_beginning = cfg.verbose_beginning,
            "batcher started"
        );
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn lock_ticker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight_runtime(&self) -> &Handle {
        self.in_flight.runtime()
    }

    fn add(self: &Arc<Self>, item: T) {
        self.items_added.fetch_add(1, Ordering::Relaxed);
        if self.buffer.add(item).should_flush() {
            self.flush();
        }
    }

    fn flush(self: &Arc<Self>) -> usize {
        let items = self.buffer.take();
        if items.is_empty() {
            return 0;
        }
        let count = items.len();
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        let publisher = Arc::clone(&self.publisher);
        self.in_flight.spawn(async move {
            publisher.publish_quietly(&items).await;
        });
        count
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn tick_loop<T: Send + Sync + 'static>(inner: Weak<Inner<T>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match inner.upgrade() {
            Some(inner) => {
                inner.flush();
            }
            None => break,
        }
    }
}
