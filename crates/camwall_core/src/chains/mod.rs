//! Per-camera processing chains.
//!
//! A chain binds a device's stream slots to its source, to the GPU pool
//! for display and, when recording, to block storage. Chains are managed
//! in two groups: live (fed by capture threads) and playback (fed by
//! storage).

mod chain;
mod group;

pub use chain::{ChainError, ChainState, FilterChain};
pub use group::{
    ChainGroupKind, FilterChainGroup, LiveTargets, PlaybackTargets, ReadReport, RecordSink,
};
