//! # topic-batcher
//!
//! Size- and time-bounded batching of application events for messaging
//! endpoints that accept a limited number of entries per call.
//!
//! ## Overview
//!
//! Producers hand items to an [`AutoBatcher`] one at a time. The batcher
//! buffers them and flushes when the buffer reaches `batch_size` or when the
//! flush interval elapses. Each flush is split into endpoint-sized chunks by a
//! [`BatchPublisher`], and every chunk is sent concurrently through a
//! [`BatchSender`].
//!
//! ## Key Features
//!
//! - **Deterministic splitting**: `n` items always produce `ceil(n / max_batch_size)` calls
//! - **Non-blocking intake**: `add` never waits on the network
//! - **Orderly shutdown**: every dispatched publish is tracked and awaited on stop
//! - **Partial-failure aware**: per-entry failures are logged, never raised
//! - **Quiet by default after warm-up**: only the first few batches are logged with payloads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use topic_batcher::{AutoBatcher, BatcherConfig, Lifecycle};
//! use topic_batcher::transport::{HttpBatchSender, HttpSenderConfig};
//!
//! #[tokio::main]
//! async fn main() -> topic_batcher::Result<()> {
//!     let sender = HttpBatchSender::new(HttpSenderConfig::new("http://localhost:9324/batch")?)?;
//!     let config = BatcherConfig::new("signups").with_batch_size(50);
//!     let batcher = AutoBatcher::json(config, Arc::new(sender))?;
//!
//!     batcher.on_start().await?;
//!     batcher.add(serde_json::json!({"user": "ada"}));
//!     batcher.on_stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Buffering, splitting, sending, in-flight tracking |
//! | [`config`] | Batcher and publisher settings |
//! | [`transport`] | The send-one-batch seam and an HTTP implementation |
//! | [`events`] | Named in-process event bus feeding batchers |
//! | [`lifecycle`] | Start/stop hooks for hosts |

pub mod batch;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod transport;

pub use batch::{AutoBatcher, BatchPublisher, BatcherStats, EntryBuilder, PublishSummary, WireEntry};
pub use config::{BatcherConfig, PublisherConfig};
pub use events::{EventBus, Subscription};
pub use lifecycle::{Lifecycle, LifecycleGroup};
pub use transport::{BatchSender, SendOutcome, TransportError};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
