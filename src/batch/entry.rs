//! Wire entry conversion.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One item in the shape the endpoint accepts.
///
/// `id` only has to be unique within a single call. `attributes` carries any
/// extra endpoint-specific fields a custom preparer wants to attach; they are
/// flattened next to `id` and `message` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEntry {
    pub id: String,
    pub message: String,
    #[serde(flatten, default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl WireEntry {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

pub type Serializer<T> = Arc<dyn Fn(&T) -> Result<String> + Send + Sync>;
pub type PrepareEntry<T> = Arc<dyn Fn(&T, usize) -> WireEntry + Send + Sync>;

/// Turns items into [`WireEntry`] values for one chunk.
///
/// A configured `prepare_entry` always wins; otherwise the entry is
/// `{ id: index_within_chunk, message: serializer(item) }`.
pub struct EntryBuilder<T> {
    serializer: Serializer<T>,
    prepare_entry: Option<PrepareEntry<T>>,
}

impl<T> Clone for EntryBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            serializer: Arc::clone(&self.serializer),
            prepare_entry: self.prepare_entry.clone(),
        }
    }
}

impl<T: Serialize + 'static> EntryBuilder<T> {
    /// JSON-encodes each item.
    pub fn json() -> Self {
        Self::with_serializer(|item: &T| Ok(serde_json::to_string(item)?))
    }
}

impl<T: Serialize + 'static> Default for EntryBuilder<T> {
    fn default() -> Self {
        Self::json()
    }
}

impl<T> EntryBuilder<T> {
    pub fn with_serializer<F>(serializer: F) -> Self
    where
        F: Fn(&T) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            serializer: Arc::new(serializer),
            prepare_entry: None,
        }
    }

    pub fn with_prepare_entry<F>(mut self, prepare: F) -> Self
    where
        F: Fn(&T, usize) -> WireEntry + Send + Sync + 'static,
    {
        self.prepare_entry = Some(Arc::new(prepare));
        self
    }

    pub fn has_custom_entries(&self) -> bool {
        self.prepare_entry.is_some()
    }

    /// Convert one chunk. Ids restart at `"0"` for every chunk.
    pub fn build_chunk(&self, chunk: &[T]) -> Result<Vec<WireEntry>> {
        chunk
            .iter()
            .enumerate()
            .map(|(index, item)| self.build(item, index))
            .collect()
    }

    fn build(&self, item: &T, index: usize) -> Result<WireEntry> {
        if let Some(prepare) = &self.prepare_entry {
            return Ok(prepare(item, index));
        }
        Ok(WireEntry::new(index.to_string(), (self.serializer)(item)?))
    }
}
