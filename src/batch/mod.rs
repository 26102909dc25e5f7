//! Event batching core.
//!
//! # Batching Module
//!
//! Items arrive one at a time, are buffered, and leave as batched calls to an
//! endpoint that accepts at most `max_batch_size` entries per call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AutoBatcher`] | Buffers items; flushes on size, interval, or demand |
//! | [`BatchPublisher`] | Splits input into chunks and sends them concurrently |
//! | [`BatchCollector`] | The pending-item buffer with an atomic swap |
//! | [`InFlightTracker`] | Tracks dispatched publishes so shutdown can wait for them |
//! | [`EntryBuilder`] | Converts items into [`WireEntry`] values |
//! | [`VerboseLogThrottle`] | Limits full-payload logging to the first few batches |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use topic_batcher::batch::AutoBatcher;
//! use topic_batcher::config::BatcherConfig;
//! use topic_batcher::transport::{HttpBatchSender, HttpSenderConfig};
//!
//! # async fn run() -> topic_batcher::Result<()> {
//! let sender = HttpBatchSender::new(HttpSenderConfig::new("http://localhost:9324/batch")?)?;
//! let batcher = AutoBatcher::json(BatcherConfig::new("page-views"), Arc::new(sender))?;
//! batcher.start()?;
//!
//! batcher.add(serde_json::json!({"path": "/pricing"}));
//!
//! batcher.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure handling
//!
//! - Partially applied batches are logged at warn and counted, never raised.
//! - A failing send call is logged at error. [`AutoBatcher::publish_batch`]
//!   and [`BatchPublisher::publish`] return it; automatic flushes drop it.
//! - Nothing is retried.

mod auto;
mod collector;
mod entry;
mod inflight;
mod publisher;
mod throttle;

pub use auto::{AutoBatcher, BatcherStats};
pub use collector::{BatchAddResult, BatchCollector};
pub use entry::{EntryBuilder, PrepareEntry, Serializer, WireEntry};
pub use inflight::InFlightTracker;
pub use publisher::{BatchPublisher, OutcomeLevel, PublishCounters, PublishSummary};
pub use throttle::{VerboseLogThrottle, VerboseSlot, VERBOSE_PUBLISH_LIMIT};
