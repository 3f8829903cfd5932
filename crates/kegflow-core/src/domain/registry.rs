//! Flow id allocation.
//!
//! Ids come from a single atomic counter. Every call to
//! [`FlowIdRegistry::next_id`] observes a value strictly greater than any id
//! the same registry issued before, including under concurrent callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_REGISTRY: FlowIdRegistry = FlowIdRegistry::new();

/// Value object: Flow ID
///
/// Only a registry can mint a fresh one, so ids handed to
/// [`crate::Flow::build`] are unique within that registry. Deserialised ids
/// are plain values and carry no such guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(u64);

impl FlowId {
    /// Raw numeric value of the id
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic flow id counter
#[derive(Debug)]
pub struct FlowIdRegistry {
    last: AtomicU64,
}

impl FlowIdRegistry {
    /// Create a registry whose first id is 1
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// The process-wide registry
    pub fn global() -> &'static FlowIdRegistry {
        &GLOBAL_REGISTRY
    }

    /// Allocate the next id
    pub fn next_id(&self) -> FlowId {
        FlowId(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Most recently issued raw id, 0 when nothing was issued yet
    pub fn last_issued(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

impl Default for FlowIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
