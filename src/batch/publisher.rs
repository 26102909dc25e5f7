//! Batch splitter / sender.

use super::entry::{EntryBuilder, WireEntry};
use super::throttle::{VerboseLogThrottle, VerboseSlot};
use crate::config::PublisherConfig;
use crate::transport::{BatchSender, SendOutcome};
use crate::{Error, Result};
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Aggregated result of one `publish` call across all of its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub item_count: usize,
    pub chunks: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Chunks whose send call itself failed.
    pub hard_failures: usize,
}

impl PublishSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0 && self.hard_failures == 0
    }
}

/// Log level chosen for an accepted batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeLevel {
    /// Zero failures, verbose allowance remaining: info with payload.
    Verbose { last: bool },
    /// Zero failures, allowance exhausted or disabled: debug.
    Quiet,
    /// Any failed entries: warn, regardless of throttle state.
    Warn,
}

impl OutcomeLevel {
    /// Pick the level for `outcome`, taking a verbose slot from `throttle`
    /// when the call had no failures. Partial failures never consume a slot.
    pub fn acquire_for(outcome: &SendOutcome, throttle: &VerboseLogThrottle) -> Self {
        if outcome.failure_count > 0 {
            return OutcomeLevel::Warn;
        }
        match throttle.try_acquire() {
            VerboseSlot::Granted { last } => OutcomeLevel::Verbose { last },
            VerboseSlot::Quiet => OutcomeLevel::Quiet,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishCounters {
    pub batches_sent: u64,
    pub entries_succeeded: u64,
    pub entries_failed: u64,
    pub hard_failures: u64,
}

#[derive(Debug, Default)]
struct PublishStats {
    batches_sent: AtomicU64,
    entries_succeeded: AtomicU64,
    entries_failed: AtomicU64,
    hard_failures: AtomicU64,
}

impl PublishStats {
    fn record_outcome(&self, outcome: &SendOutcome) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.entries_succeeded
            .fetch_add(outcome.success_count as u64, Ordering::Relaxed);
        self.entries_failed
            .fetch_add(outcome.failure_count as u64, Ordering::Relaxed);
    }

    fn record_hard_failure(&self) {
        self.hard_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PublishCounters {
        PublishCounters {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            entries_succeeded: self.entries_succeeded.load(Ordering::Relaxed),
            entries_failed: self.entries_failed.load(Ordering::Relaxed),
            hard_failures: self.hard_failures.load(Ordering::Relaxed),
        }
    }
}

/// Splits input into endpoint-sized chunks and sends them concurrently.
///
/// Stateless across calls apart from the verbose-log throttle and counters.
pub struct BatchPublisher<T> {
    config: PublisherConfig,
    entries: EntryBuilder<T>,
    sender: Arc<dyn BatchSender>,
    throttle: VerboseLogThrottle,
    stats: PublishStats,
}

impl<T: Serialize + 'static> BatchPublisher<T> {
    pub fn json(config: PublisherConfig, sender: Arc<dyn BatchSender>) -> Result<Self> {
        Self::new(config, sender, EntryBuilder::json())
    }
}

impl<T> BatchPublisher<T> {
    pub fn new(
        config: PublisherConfig,
        sender: Arc<dyn BatchSender>,
        entries: EntryBuilder<T>,
    ) -> Result<Self> {
        config.validate()?;
        let throttle = VerboseLogThrottle::new(config.verbose_beginning);
        Ok(Self {
            config,
            entries,
            sender,
            throttle,
            stats: PublishStats::default(),
        })
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn counters(&self) -> PublishCounters {
        self.stats.snapshot()
    }

    /// Number of send calls `publish` makes for `n` items.
    pub fn chunk_count(&self, n: usize) -> usize {
        n.div_ceil(self.config.max_batch_size)
    }
}

impl<T: Sync> BatchPublisher<T> {
    /// Publish and propagate the first hard send error, if any.
    ///
    /// Resolves once every chunk has settled. An empty slice makes no calls.
    pub async fn publish(&self, items: &[T]) -> Result<PublishSummary> {
        let (summary, first_error) = self.publish_chunks(items).await;
        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    pub async fn publish_one(&self, item: &T) -> Result<PublishSummary> {
        self.publish(std::slice::from_ref(item)).await
    }

    /// Fire-and-forget variant: hard errors are logged and dropped.
    pub async fn publish_quietly(&self, items: &[T]) -> PublishSummary {
        self.publish_chunks(items).await.0
    }

    async fn publish_chunks(&self, items: &[T]) -> (PublishSummary, Option<Error>) {
        let mut summary = PublishSummary {
            item_count: items.len(),
            ..PublishSummary::default()
        };
        if items.is_empty() {
            return (summary, None);
        }

        let results = join_all(
            items
                .chunks(self.config.max_batch_size)
                .map(|chunk| self.send_chunk(chunk)),
        )
        .await;

        summary.chunks = results.len();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(outcome) => {
                    summary.success_count += outcome.success_count;
                    summary.failure_count += outcome.failure_count;
                }
                Err(e) => {
                    summary.hard_failures += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        (summary, first_error)
    }

    async fn send_chunk(&self, chunk: &[T]) -> Result<SendOutcome> {
        let topic = self.config.topic.as_str();
        let sent = match self.entries.build_chunk(chunk) {
            Ok(entries) => match self.sender.send_batch(topic, &entries).await {
                Ok(outcome) => Ok((entries, outcome)),
                Err(e) => Err(Error::from(e)),
            },
            Err(e) => Err(e),
        };

        match sent {
            Ok((entries, outcome)) => {
                self.stats.record_outcome(&outcome);
                self.log_outcome(&entries, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.stats.record_hard_failure();
                error!(
                    topic,
                    item_count = chunk.len(),
                    error = %e,
                    "failed to publish batch"
                );
                Err(e)
            }
        }
    }

    fn log_outcome(&self, entries: &[WireEntry], outcome: &SendOutcome) {
        let topic = self.config.topic.as_str();
        match OutcomeLevel::acquire_for(outcome, &self.throttle) {
            OutcomeLevel::Warn => {
                let failed_ids: Vec<&str> = outcome.failed.iter().map(|f| f.id.as_str()).collect();
                warn!(
                    topic,
                    item_count = entries.len(),
                    success_count = outcome.success_count,
                    failure_count = outcome.failure_count,
                    failed_ids = ?failed_ids,
                    "batch published with failures"
                );
            }
            OutcomeLevel::Verbose { last } => {
                let payload = serde_json::to_string(entries).unwrap_or_default();
                info!(
                    topic,
                    item_count = entries.len(),
                    success_count = outcome.success_count,
                    payload = %payload,
                    "batch published"
                );
                if last {
                    info!(
                        topic,
                        limit = self.throttle.used(),
                        "verbose publish logging limit reached, switching to quiet mode"
                    );
                }
            }
            OutcomeLevel::Quiet => {
                debug!(
                    topic,
                    item_count = entries.len(),
                    success_count = outcome.success_count,
                    "batch published"
                );
            }
        }
    }
}
