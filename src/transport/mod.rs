//! Remote send primitive.
//!
//! The batching core only needs one operation from the messaging endpoint:
//! deliver between 1 and `max_batch_size` entries in a single call and report
//! how many were accepted. [`BatchSender`] is that seam; [`HttpBatchSender`]
//! is a JSON-over-HTTP implementation of it.

mod http;

pub use http::{HttpBatchSender, HttpSenderConfig};

use crate::batch::WireEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-entry failure detail reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(default, alias = "Code", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, alias = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FailedEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: None,
            message: None,
        }
    }
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of one accepted batch call. The endpoint may apply a batch partially,
/// so both counts can be non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub failed: Vec<FailedEntry>,
}

impl SendOutcome {
    pub fn new(success_count: usize, failure_count: usize) -> Self {
        Self {
            success_count,
            failure_count,
            failed: Vec::new(),
        }
    }

    /// Build from the endpoint's per-entry report.
    pub fn from_entries(successful: &[String], failed: Vec<FailedEntry>) -> Self {
        Self {
            success_count: successful.len(),
            failure_count: failed.len(),
            failed,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("send rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// The send-one-batch primitive.
///
/// Implementations must accept 1..=`max_batch_size` entries per call. Timeouts
/// are the implementation's concern; the batching core imposes none.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send_batch(
        &self,
        topic: &str,
        entries: &[WireEntry],
    ) -> std::result::Result<SendOutcome, TransportError>;
}

#[async_trait]
impl<S: BatchSender + ?Sized> BatchSender for std::sync::Arc<S> {
    async fn send_batch(
        &self,
        topic: &str,
        entries: &[WireEntry],
    ) -> std::result::Result<SendOutcome, TransportError> {
        (**self).send_batch(topic, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_entries() {
        let outcome = SendOutcome::from_entries(
            &["0".to_string(), "2".to_string()],
            vec![FailedEntry::new("1").with_code("InternalError")],
        );
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failure_count, 1);
        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.failed[0].code.as_deref(), Some("InternalError"));
    }

    #[test]
    fn test_empty_outcome_is_success() {
        assert!(SendOutcome::from_entries(&[], vec![]).all_succeeded());
    }
}
