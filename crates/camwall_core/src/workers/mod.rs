//! Machine-vision worker pool.
//!
//! Workers are started once per process and live outside the graph
//! rebuild cycle. Callers only see acquire/release of worker slots,
//! expressed as a [`WorkerLease`] that hands the worker back on drop.

mod pool;

pub use pool::{WorkerCommand, WorkerEvent, WorkerId, WorkerLease, WorkerPool, EVENT_CAPACITY};

use serde::{Deserialize, Serialize};

/// Definition of one kind of machine-vision worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Human-readable name shown in menus.
    pub name: String,
    /// Symbolic tag used in layouts and `acquire()`.
    pub tag: String,
    /// Number of worker threads started for this tag.
    pub max_instances: u32,
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, max_instances: u32) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            max_instances,
        }
    }
}
