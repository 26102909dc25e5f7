//! Host lifecycle hooks.

use crate::batch::AutoBatcher;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Start/stop hooks a host calls around its own running state.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    async fn on_start(&self) -> Result<()>;

    /// Must not return until everything accepted before the call is settled.
    async fn on_stop(&self) -> Result<()>;
}

#[async_trait]
impl<T: Send + Sync + 'static> Lifecycle for AutoBatcher<T> {
    fn name(&self) -> &str {
        &self.config().topic
    }

    /// Arms the interval trigger and logs the effective configuration.
    async fn on_start(&self) -> Result<()> {
        self.start()?;
        self.log_start();
        Ok(())
    }

    /// Disarms the trigger, flushes what is buffered and waits for every
    /// in-flight publish.
    async fn on_stop(&self) -> Result<()> {
        self.shutdown().await;
        Ok(())
    }
}

/// Starts members in order and stops them in reverse.
#[derive(Default)]
pub struct LifecycleGroup {
    members: Vec<Arc<dyn Lifecycle>>,
}

impl LifecycleGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, member: Arc<dyn Lifecycle>) -> Self {
        self.members.push(member);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Lifecycle for LifecycleGroup {
    fn name(&self) -> &str {
        "group"
    }

    /// Stops at the first member that fails to start.
    async fn on_start(&self) -> Result<()> {
        for m in &self.members {
            m.on_start().await?;
        }
        Ok(())
    }

    /// Stops every member even if one fails; returns the first error.
    async fn on_stop(&self) -> Result<()> {
        let mut first_error = None;
        for m in self.members.iter().rev() {
            if let Err(e) = m.on_stop().await {
                warn!(member = m.name(), error = %e, "member failed to stop");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
