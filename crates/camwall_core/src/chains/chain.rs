//! One camera's processing chain and its state.

use std::fmt;

use thiserror::Error;

use crate::models::{Device, StreamSlots};
use crate::native::{BindTarget, BindingId, NativeError};

/// Chain lifecycle: `Unbound -> Bound -> Streaming -> (Recording) -> Unbound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No bindings held.
    Unbound,
    /// Stream slots fed by their source.
    Bound,
    /// Frames flowing into the GPU pool for display.
    Streaming,
    /// Streaming, and the record slot is written into storage.
    Recording,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainState::Unbound => write!(f, "unbound"),
            ChainState::Bound => write!(f, "bound"),
            ChainState::Streaming => write!(f, "streaming"),
            ChainState::Recording => write!(f, "recording"),
        }
    }
}

/// A chain failed to bind. Recorded on the chain, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Chain for slot {slot} failed: {source}")]
pub struct ChainError {
    pub slot: u32,
    pub source: NativeError,
}

/// Processing chain of one device.
#[derive(Debug, Clone)]
pub struct FilterChain {
    device: Device,
    slots: StreamSlots,
    state: ChainState,
    last_error: Option<ChainError>,
    /// Source and display bindings, in the order they were made.
    bindings: Vec<(BindingId, BindTarget)>,
    record_binding: Option<BindingId>,
}

impl FilterChain {
    pub(super) fn new(device: Device, slots: StreamSlots) -> Self {
        Self {
            device,
            slots,
            state: ChainState::Unbound,
            last_error: None,
            bindings: Vec::new(),
            record_binding: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn slots(&self) -> StreamSlots {
        self.slots
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn last_error(&self) -> Option<&ChainError> {
        self.last_error.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.record_binding.is_some()
    }

    /// Bound or streaming, so it can start recording.
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ChainState::Bound | ChainState::Streaming | ChainState::Recording
        )
    }

    pub(super) fn push_binding(&mut self, binding: BindingId, target: BindTarget) {
        self.bindings.push((binding, target));
        self.state = match (self.state, target) {
            (_, BindTarget::Display) => ChainState::Streaming,
            (ChainState::Unbound, _) => ChainState::Bound,
            (state, _) => state,
        };
    }

    pub(super) fn set_record_binding(&mut self, binding: BindingId) {
        self.record_binding = Some(binding);
        self.state = ChainState::Recording;
    }

    pub(super) fn take_record_binding(&mut self) -> Option<BindingId> {
        let binding = self.record_binding.take()?;
        if self.state == ChainState::Recording {
            self.state = ChainState::Streaming;
        }
        Some(binding)
    }

    /// Remove every binding, newest first. State becomes `Unbound`.
    pub(super) fn take_all_bindings(&mut self) -> Vec<BindingId> {
        let mut all: Vec<BindingId> = self.record_binding.take().into_iter().collect();
        all.extend(self.bindings.drain(..).rev().map(|(b, _)| b));
        self.state = ChainState::Unbound;
        all
    }

    pub(super) fn fail(&mut self, error: NativeError) {
        self.last_error = Some(ChainError {
            slot: self.device.slot,
            source: error,
        });
    }

    pub(super) fn clear_error(&mut self) {
        self.last_error = None;
    }
}
