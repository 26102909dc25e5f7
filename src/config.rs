//! Batcher configuration.
//!
//! Configuration can be built in code with the `with_*` builders, loaded from
//! YAML, and adjusted from `TOPIC_BATCHER_*` environment variables. Every
//! constructor that consumes a config validates it first, so a bad value fails
//! at construction rather than on the first flush.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_BATCH_INTERVAL_MS: u64 = 10_000;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}
fn default_interval_ms() -> u64 {
    DEFAULT_MAX_BATCH_INTERVAL_MS
}
fn default_true() -> bool {
    true
}

/// Settings for the splitter/sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub topic: String,
    /// Endpoint per-call item limit.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_true")]
    pub verbose_beginning: bool,
}

impl PublisherConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            verbose_beginning: true,
        }
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn with_verbose_beginning(mut self, v: bool) -> Self {
        self.verbose_beginning = v;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(invalid("topic", "topic must not be empty"));
        }
        if self.max_batch_size == 0 {
            return Err(invalid(
                "max_batch_size",
                "max_batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Settings for an [`crate::batch::AutoBatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherConfig {
    pub topic: String,
    /// Event name to subscribe to on an [`crate::events::EventBus`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    /// Buffer length that triggers an inline flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_interval_ms")]
    pub max_batch_interval_ms: u64,
    #[serde(default = "default_true")]
    pub verbose_beginning: bool,
}

impl BatcherConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            event_name: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_interval_ms: DEFAULT_MAX_BATCH_INTERVAL_MS,
            verbose_beginning: true,
        }
    }

    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    pub fn with_max_batch_interval(mut self, interval: Duration) -> Self {
        self.max_batch_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_verbose_beginning(mut self, v: bool) -> Self {
        self.verbose_beginning = v;
        self
    }

    pub fn max_batch_interval(&self) -> Duration {
        Duration::from_millis(self.max_batch_interval_ms)
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            topic: self.topic.clone(),
            max_batch_size: self.max_batch_size,
            verbose_beginning: self.verbose_beginning,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.publisher_config().validate()?;
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "batch_size must be at least 1"));
        }
        if self.max_batch_interval_ms == 0 {
            return Err(invalid(
                "max_batch_interval_ms",
                "max_batch_interval_ms must be greater than 0",
            ));
        }
        if matches!(self.event_name.as_deref(), Some(n) if n.trim().is_empty()) {
            return Err(invalid("event_name", "event_name must not be empty"));
        }
        Ok(())
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Apply `TOPIC_BATCHER_BATCH_SIZE`, `TOPIC_BATCHER_MAX_BATCH_SIZE`,
    /// `TOPIC_BATCHER_INTERVAL_MS` and `TOPIC_BATCHER_VERBOSE_BEGINNING`.
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(n) = env_parse::<usize>("TOPIC_BATCHER_BATCH_SIZE") {
            self.batch_size = n;
        }
        if let Some(n) = env_parse::<usize>("TOPIC_BATCHER_MAX_BATCH_SIZE") {
            self.max_batch_size = n;
        }
        if let Some(ms) = env_parse::<u64>("TOPIC_BATCHER_INTERVAL_MS") {
            self.max_batch_interval_ms = ms;
        }
        if let Some(v) = env_parse::<bool>("TOPIC_BATCHER_VERBOSE_BEGINNING") {
            self.verbose_beginning = v;
        }
        self
    }
}

fn env_parse<V: std::str::FromStr>(key: &str) -> Option<V> {
    env::var(key).ok().and_then(|s| s.trim().parse::<V>().ok())
}

fn invalid(field: &str, msg: &str) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config"),
    )
}
