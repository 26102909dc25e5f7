//! Verbose-log throttle for the publish path.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of successful publishes logged with full payload per instance.
pub const VERBOSE_PUBLISH_LIMIT: usize = 10;

/// Outcome of asking the throttle for a verbose slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerboseSlot {
    /// Log verbosely. `last` is set for the call that took the final slot.
    Granted { last: bool },
    /// Allowance exhausted or disabled.
    Quiet,
}

/// Caps elevated-detail logging to the first N successful publishes.
///
/// The check and the increment are one atomic step, so concurrent chunk
/// completions can never take more than `limit` slots between them. Once
/// exhausted the throttle stays quiet for the life of the instance.
#[derive(Debug)]
pub struct VerboseLogThrottle {
    count: AtomicUsize,
    limit: usize,
    enabled: bool,
}

impl VerboseLogThrottle {
    pub fn new(enabled: bool) -> Self {
        Self::with_limit(enabled, VERBOSE_PUBLISH_LIMIT)
    }

    pub fn with_limit(enabled: bool, limit: usize) -> Self {
        Self {
            count: AtomicUsize::new(0),
            limit,
            enabled,
        }
    }

    pub fn allowed(&self) -> bool {
        self.enabled && self.count.load(Ordering::Acquire) < self.limit
    }

    pub fn try_acquire(&self) -> VerboseSlot {
        if !self.enabled {
            return VerboseSlot::Quiet;
        }
        let limit = self.limit;
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < limit).then_some(c + 1)
            }) {
            Ok(prev) => VerboseSlot::Granted {
                last: prev + 1 == limit,
            },
            Err(_) => VerboseSlot::Quiet,
        }
    }

    pub fn used(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for VerboseLogThrottle {
    fn default() -> Self {
        Self::new(true)
    }
}
