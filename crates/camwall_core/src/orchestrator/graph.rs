//! The live resource graph.

use std::collections::BTreeMap;

use super::types::{GraphConfig, GraphParts};
use crate::chains::{ChainGroupKind, FilterChainGroup};
use crate::models::RecordingMode;
use crate::native::{CpuPlan, NativeHandle};
use crate::storage::{Decision, StorageHandle};

/// Every resource of one successful open, owned by the orchestrator.
///
/// Containers never hold this directly; they keep a `GraphHandle` and
/// borrow the graph through the orchestrator when needed.
#[derive(Debug)]
pub struct ResourceGraph {
    config: GraphConfig,
    cpu_scheme: NativeHandle,
    cpu_plan: CpuPlan,
    gpu_pool: NativeHandle,
    live_thread: NativeHandle,
    usb_thread: NativeHandle,
    storage: StorageHandle,
    storage_decision: Decision,
    playback_manager: NativeHandle,
    live_chains: FilterChainGroup,
    playback_chains: FilterChainGroup,
}

impl ResourceGraph {
    /// Assemble from fully opened parts, or hand them back if any is missing.
    pub(crate) fn from_parts(config: GraphConfig, parts: GraphParts) -> Result<Self, GraphParts> {
        match (
            parts.cpu_scheme,
            parts.cpu_plan,
            parts.gpu_pool,
            parts.live_thread,
            parts.usb_thread,
            parts.storage,
            parts.storage_decision,
            parts.playback_manager,
            parts.live_chains,
            parts.playback_chains,
        ) {
            (
                Some(cpu_scheme),
                Some(cpu_plan),
                Some(gpu_pool),
                Some(live_thread),
                Some(usb_thread),
                Some(storage),
                Some(storage_decision),
                Some(playback_manager),
                Some(live_chains),
                Some(playback_chains),
            ) => Ok(Self {
                config,
                cpu_scheme,
                cpu_plan,
                gpu_pool,
                live_thread,
                usb_thread,
                storage,
                storage_decision,
                playback_manager,
                live_chains,
                playback_chains,
            }),
            (
                cpu_scheme,
                cpu_plan,
                gpu_pool,
                live_thread,
                usb_thread,
                storage,
                storage_decision,
                playback_manager,
                live_chains,
                playback_chains,
            ) => Err(GraphParts {
                cpu_scheme,
                cpu_plan,
                gpu_pool,
                live_thread,
                usb_thread,
                storage,
                storage_decision,
                playback_manager,
                live_chains,
                playback_chains,
            }),
        }
    }

    /// Hand every resource back for teardown.
    pub(crate) fn into_parts(self) -> (GraphConfig, GraphParts) {
        let parts = GraphParts {
            cpu_scheme: Some(self.cpu_scheme),
            cpu_plan: Some(self.cpu_plan),
            gpu_pool: Some(self.gpu_pool),
            live_thread: Some(self.live_thread),
            usb_thread: Some(self.usb_thread),
            storage: Some(self.storage),
            storage_decision: Some(self.storage_decision),
            playback_manager: Some(self.playback_manager),
            live_chains: Some(self.live_chains),
            playback_chains: Some(self.playback_chains),
        };
        (self.config, parts)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn cpu_plan(&self) -> &CpuPlan {
        &self.cpu_plan
    }

    pub fn gpu_pool(&self) -> NativeHandle {
        self.gpu_pool
    }

    pub fn capture_threads(&self) -> (NativeHandle, NativeHandle) {
        (self.live_thread, self.usb_thread)
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// Whether opening reused or recreated block storage.
    pub fn storage_decision(&self) -> Decision {
        self.storage_decision
    }

    pub fn playback_manager(&self) -> NativeHandle {
        self.playback_manager
    }

    pub fn live_chains(&self) -> &FilterChainGroup {
        &self.live_chains
    }

    pub fn playback_chains(&self) -> &FilterChainGroup {
        &self.playback_chains
    }

    pub fn chains(&self, kind: ChainGroupKind) -> &FilterChainGroup {
        match kind {
            ChainGroupKind::Live => &self.live_chains,
            ChainGroupKind::Playback => &self.playback_chains,
        }
    }

    pub fn chains_mut(&mut self, kind: ChainGroupKind) -> &mut FilterChainGroup {
        match kind {
            ChainGroupKind::Live => &mut self.live_chains,
            ChainGroupKind::Playback => &mut self.playback_chains,
        }
    }

    /// Slot to device mapping of the live group.
    pub fn slot_map(&self) -> BTreeMap<u32, u64> {
        self.live_chains.slot_map()
    }

    pub fn recording_mode(&self) -> RecordingMode {
        self.live_chains.recording_mode()
    }
}
