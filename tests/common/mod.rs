//! Shared test doubles: a scripted send primitive and a log-capturing layer.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use topic_batcher::transport::{BatchSender, SendOutcome, TransportError};
use topic_batcher::WireEntry;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Records every call and answers from a script; unscripted calls succeed fully.
#[derive(Default)]
pub struct ScriptedSender {
    calls: Mutex<Vec<(String, Vec<WireEntry>)>>,
    script: Mutex<VecDeque<Result<SendOutcome, TransportError>>>,
    delay: Option<Duration>,
}

impl ScriptedSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn push_response(&self, response: Result<SendOutcome, TransportError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<(String, Vec<WireEntry>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.len())
            .collect()
    }

    pub fn entries_sent(&self) -> usize {
        self.call_sizes().iter().sum()
    }
}

#[async_trait]
impl BatchSender for ScriptedSender {
    async fn send_batch(
        &self,
        topic: &str,
        entries: &[WireEntry],
    ) -> Result<SendOutcome, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((topic.to_string(), entries.to_vec()));
        let scripted = self.script.lock().unwrap().pop_front();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        scripted.unwrap_or_else(|| Ok(SendOutcome::new(entries.len(), 0)))
    }
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Collects events emitted while installed as the thread's default subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Install for the current thread until the guard is dropped.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::registry().with(logs.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level, message: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level && e.message == message)
            .count()
    }

    pub fn find(&self, level: Level, message: &str) -> Option<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.level == level && e.message == message)
            .cloned()
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}
