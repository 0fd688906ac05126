//! Chain groups: the set of chains for every bound camera.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::chain::{ChainState, FilterChain};
use crate::models::{CaptureKind, Device, RecordingMode};
use crate::native::{
    BindRequest, BindTarget, BindingId, NativeError, NativeHandle, NativeServices,
};

/// Which side of the system a group serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainGroupKind {
    /// Capture threads to GPU, optionally recording.
    Live,
    /// Block storage to GPU.
    Playback,
}

impl fmt::Display for ChainGroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainGroupKind::Live => write!(f, "live"),
            ChainGroupKind::Playback => write!(f, "playback"),
        }
    }
}

/// Services the live group binds against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTargets {
    pub live_thread: NativeHandle,
    pub usb_thread: NativeHandle,
    pub gpu_pool: NativeHandle,
}

/// Services the playback group binds against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTargets {
    pub manager: NativeHandle,
    pub gpu_pool: NativeHandle,
}

#[derive(Debug, Clone, Copy)]
enum Targets {
    Live(LiveTargets),
    Playback(PlaybackTargets),
}

/// Where recordings go: the playback manager and the store epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSink {
    pub manager: NativeHandle,
    pub epoch: u64,
}

/// Bind and unbind work done by one `read()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReport {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Chains left `Unbound` because binding failed.
    pub failed: usize,
}

impl ReadReport {
    /// `true` when nothing was bound or unbound.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Chains for every active device of one group kind.
pub struct FilterChainGroup {
    kind: ChainGroupKind,
    native: Arc<dyn NativeServices>,
    targets: Targets,
    chains: BTreeMap<u32, FilterChain>,
    recording: RecordingMode,
    sink: Option<RecordSink>,
}

impl fmt::Debug for FilterChainGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChainGroup")
            .field("kind", &self.kind)
            .field("chains", &self.chains.len())
            .field("recording", &self.recording)
            .finish()
    }
}

impl FilterChainGroup {
    /// Group fed by the capture threads.
    pub fn live(native: Arc<dyn NativeServices>, targets: LiveTargets) -> Self {
        Self::with_targets(ChainGroupKind::Live, native, Targets::Live(targets))
    }

    /// Group fed by the playback manager.
    pub fn playback(native: Arc<dyn NativeServices>, targets: PlaybackTargets) -> Self {
        Self::with_targets(ChainGroupKind::Playback, native, Targets::Playback(targets))
    }

    fn with_targets(kind: ChainGroupKind, native: Arc<dyn NativeServices>, targets: Targets) -> Self {
        Self {
            kind,
            native,
            targets,
            chains: BTreeMap::new(),
            recording: RecordingMode::Never,
            sink: None,
        }
    }

    pub fn kind(&self) -> ChainGroupKind {
        self.kind
    }

    pub fn recording_mode(&self) -> RecordingMode {
        self.recording
    }

    /// Chain in a camera slot.
    pub fn chain(&self, slot: u32) -> Option<&FilterChain> {
        self.chains.get(&slot)
    }

    /// All chains in slot order.
    pub fn chains(&self) -> impl Iterator<Item = &FilterChain> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Chain of the device with row identity `device_id`.
    pub fn chain_for_device(&self, device_id: u64) -> Option<&FilterChain> {
        self.chains.values().find(|c| c.device().id == device_id)
    }

    /// Slot to device mapping of the current chains.
    pub fn slot_map(&self) -> BTreeMap<u32, u64> {
        self.chains
            .iter()
            .map(|(slot, chain)| (*slot, chain.device().id))
            .collect()
    }

    /// Make the chains match `devices`.
    ///
    /// Active devices get a chain bound to their stream slots; chains whose
    /// slot is gone, emptied, or now holds another device are torn down.
    /// A device identical to the one already chained causes no work.
    pub fn read(&mut self, devices: &[Device]) -> ReadReport {
        let mut report = ReadReport::default();

        let wanted: HashMap<u32, &Device> = devices
            .iter()
            .filter(|d| d.is_active())
            .map(|d| (d.slot, d))
            .collect();

        let stale: Vec<u32> = self
            .chains
            .iter()
            .filter(|(slot, chain)| wanted.get(*slot).map_or(true, |d| *d != chain.device()))
            .map(|(slot, _)| *slot)
            .collect();
        for slot in stale {
            if let Some(mut chain) = self.chains.remove(&slot) {
                self.teardown(&mut chain);
                report.removed += 1;
            }
        }

        for device in devices.iter().filter(|d| d.is_active()) {
            if self.chains.contains_key(&device.slot) {
                report.unchanged += 1;
                continue;
            }
            let slots = match device.stream_slots() {
                Ok(slots) => slots,
                Err(e) => {
                    tracing::warn!(device = device.id, "Skipping device: {}", e);
                    continue;
                }
            };

            let mut chain = FilterChain::new(device.clone(), slots);
            self.build(&mut chain);
            if chain.state() == ChainState::Unbound {
                report.failed += 1;
            } else if let (RecordingMode::Always, Some(sink)) = (self.recording, self.sink) {
                self.start_recording(&mut chain, sink);
            }
            self.chains.insert(device.slot, chain);
            report.added += 1;
        }

        tracing::debug!(
            group = %self.kind,
            added = report.added,
            removed = report.removed,
            unchanged = report.unchanged,
            failed = report.failed,
            "Chain group read"
        );
        report
    }

    /// Set the recording policy.
    ///
    /// `Always` routes the record slot of every bound chain into `sink`;
    /// `Never` removes only the record bindings and leaves display alone.
    /// Playback groups never record.
    pub fn set_recording(&mut self, mode: RecordingMode, sink: Option<RecordSink>) {
        if self.kind == ChainGroupKind::Playback {
            tracing::debug!("Playback chains do not record, ignoring {}", mode);
            return;
        }

        let sink_changed = self.sink != sink;
        self.recording = mode;
        self.sink = sink;

        let slots: Vec<u32> = self.chains.keys().copied().collect();
        for slot in slots {
            let Some(mut chain) = self.chains.remove(&slot) else {
                continue;
            };
            match (mode, sink) {
                (RecordingMode::Always, Some(sink)) => {
                    if sink_changed {
                        self.stop_recording(&mut chain);
                    }
                    if chain.is_live() && !chain.is_recording() {
                        self.start_recording(&mut chain, sink);
                    }
                }
                (RecordingMode::Always, None) => {
                    tracing::warn!(slot, "Recording requested without storage");
                    self.stop_recording(&mut chain);
                }
                (RecordingMode::Never, _) => self.stop_recording(&mut chain),
            }
            self.chains.insert(slot, chain);
        }

        tracing::info!(group = %self.kind, mode = %mode, "Recording policy set");
    }

    /// Unbind every chain. Returns the unbind failures.
    pub fn close(&mut self) -> Vec<NativeError> {
        let mut failures = Vec::new();
        let chains = std::mem::take(&mut self.chains);
        for (_, mut chain) in chains.into_iter().rev() {
            failures.extend(self.unbind_all(&mut chain));
        }
        self.sink = None;
        tracing::debug!(group = %self.kind, failures = failures.len(), "Chain group closed");
        failures
    }

    fn build(&self, chain: &mut FilterChain) {
        chain.clear_error();
        let result = match self.targets {
            Targets::Live(targets) => self.bind_live(chain, targets),
            Targets::Playback(targets) => self.bind_playback(chain, targets),
        };
        if let Err(e) = result {
            tracing::warn!(slot = chain.device().slot, "Chain bind failed: {}", e);
            self.unbind_all(chain);
            chain.fail(e);
        }
    }

    fn bind_live(&self, chain: &mut FilterChain, targets: LiveTargets) -> Result<(), NativeError> {
        let device = chain.device().clone();
        let slots = chain.slots();
        let capture = match device.capture_kind() {
            Some(CaptureKind::Usb) => targets.usb_thread,
            _ => targets.live_thread,
        };

        let main = device
            .main_address()
            .ok_or_else(|| NativeError::bind_failed(slots.live_main, "device has no address"))?;
        self.bind(chain, capture, BindRequest::source(slots.live_main, main))?;

        if let Some(sub) = device.sub_address() {
            self.bind(chain, capture, BindRequest::source(slots.live_sub, sub))?;
        }

        self.bind(chain, targets.gpu_pool, BindRequest::display(slots.live_main))
    }

    fn bind_playback(
        &self,
        chain: &mut FilterChain,
        targets: PlaybackTargets,
    ) -> Result<(), NativeError> {
        let slots = chain.slots();
        let source = BindRequest {
            stream_slot: slots.record,
            address: None,
            target: BindTarget::Source,
        };
        self.bind(chain, targets.manager, source)?;
        self.bind(chain, targets.gpu_pool, BindRequest::display(slots.record))
    }

    fn bind(
        &self,
        chain: &mut FilterChain,
        handle: NativeHandle,
        request: BindRequest,
    ) -> Result<(), NativeError> {
        let binding = self.native.bind(handle, &request)?;
        chain.push_binding(binding, request.target);
        Ok(())
    }

    fn start_recording(&self, chain: &mut FilterChain, sink: RecordSink) {
        let slots = chain.slots();
        let mut request = BindRequest::record(slots.record, sink.epoch);
        request.address = chain.device().record_address();
        match self.native.bind(sink.manager, &request) {
            Ok(binding) => chain.set_record_binding(binding),
            Err(e) => {
                tracing::warn!(slot = chain.device().slot, "Could not start recording: {}", e);
                chain.fail(e);
            }
        }
    }

    fn stop_recording(&self, chain: &mut FilterChain) {
        if let Some(binding) = chain.take_record_binding() {
            self.release(binding);
        }
    }

    fn teardown(&self, chain: &mut FilterChain) {
        for e in self.unbind_all(chain) {
            tracing::warn!(slot = chain.device().slot, "Unbind failed: {}", e);
        }
    }

    fn unbind_all(&self, chain: &mut FilterChain) -> Vec<NativeError> {
        chain
            .take_all_bindings()
            .into_iter()
            .filter_map(|binding| self.native.unbind(binding).err())
            .collect()
    }

    fn release(&self, binding: BindingId) {
        if let Err(e) = self.native.unbind(binding) {
            tracing::warn!("Unbind of {} failed: {}", binding, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::models::RtspCamera;
    use crate::native::{CpuPlan, GpuPoolPlan, PlaybackStorage, ServiceParams, SimulatedServices};
    use std::path::PathBuf;

    struct Fixture {
        native: Arc<SimulatedServices>,
        live: LiveTargets,
        manager: NativeHandle,
    }

    fn fixture() -> Fixture {
        let native = Arc::new(SimulatedServices::new());
        let cpu = CpuPlan::unpinned();
        let gpu_pool = native
            .open(&ServiceParams::GpuPool(GpuPoolPlan::from_memory(
                &MemoryConfig::default(),
                &cpu,
            )))
            .unwrap();
        let live_thread = native
            .open(&ServiceParams::CaptureThread {
                kind: CaptureKind::Live,
                affinity: None,
            })
            .unwrap();
        let usb_thread = native
            .open(&ServiceParams::CaptureThread {
                kind: CaptureKind::Usb,
                affinity: None,
            })
            .unwrap();
        let manager = native
            .open(&ServiceParams::PlaybackManager {
                storage: PlaybackStorage {
                    dir: PathBuf::from("/tmp/fs"),
                    block_size_bytes: 1024,
                    block_count: 4,
                    epoch: 7,
                },
            })
            .unwrap();
        Fixture {
            native,
            live: LiveTargets {
                live_thread,
                usb_thread,
                gpu_pool,
            },
            manager,
        }
    }

    fn live_group(fx: &Fixture) -> FilterChainGroup {
        FilterChainGroup::live(fx.native.clone(), fx.live)
    }

    fn devices() -> Vec<Device> {
        vec![
            Device::rtsp(1, 1, RtspCamera::new("10.0.0.1", "admin", "pw")),
            Device::usb(2, 2, "/dev/video0"),
            Device::empty(3, 3),
        ]
    }

    #[test]
    fn read_binds_active_devices() {
        let fx = fixture();
        let mut group = live_group(&fx);

        let report = group.read(&devices());
        assert_eq!(report.added, 2);
        assert_eq!(group.len(), 2);
        assert_eq!(group.chain(1).unwrap().state(), ChainState::Streaming);
        assert_eq!(group.chain(2).unwrap().state(), ChainState::Streaming);
        assert!(group.chain(3).is_none());
        // source + display per device
        assert_eq!(fx.native.bind_calls(), 4);
    }

    #[test]
    fn identical_read_does_no_work() {
        let fx = fixture();
        let mut group = live_group(&fx);
        group.read(&devices());
        let (binds, unbinds) = (fx.native.bind_calls(), fx.native.unbind_calls());

        let report = group.read(&devices());
        assert!(report.is_noop());
        assert_eq!(report.unchanged, 2);
        assert_eq!(fx.native.bind_calls(), binds);
        assert_eq!(fx.native.unbind_calls(), unbinds);
    }

    #[test]
    fn removed_device_is_torn_down() {
        let fx = fixture();
        let mut group = live_group(&fx);
        group.read(&devices());

        let mut changed = devices();
        changed[1] = Device::empty(4, 2);
        let report = group.read(&changed);
        assert_eq!(report.removed, 1);
        assert!(group.chain(2).is_none());
        assert_eq!(fx.native.unbind_calls(), 2);
    }

    #[test]
    fn replaced_device_is_rebound() {
        let fx = fixture();
        let mut group = live_group(&fx);
        group.read(&devices());

        let mut changed = devices();
        changed[0] = Device::rtsp(9, 1, RtspCamera::new("10.0.0.99", "admin", "pw"));
        let report = group.read(&changed);
        assert_eq!((report.removed, report.added), (1, 1));
        assert_eq!(group.chain(1).unwrap().device().id, 9);
    }

    #[test]
    fn bind_failure_is_isolated() {
        let fx = fixture();
        fx.native.mark_unreachable("rtsp://admin:pw@10.0.0.1");
        let mut group = live_group(&fx);

        let report = group.read(&devices());
        assert_eq!(report.failed, 1);
        let failed = group.chain(1).unwrap();
        assert_eq!(failed.state(), ChainState::Unbound);
        assert!(failed.last_error().is_some());
        assert_eq!(group.chain(2).unwrap().state(), ChainState::Streaming);
    }

    #[test]
    fn sub_stream_gets_its_own_slot() {
        let fx = fixture();
        let mut group = live_group(&fx);
        let mut camera = RtspCamera::new("10.0.0.5", "admin", "pw");
        camera.live_sub = true;
        group.read(&[Device::rtsp(1, 2, camera)]);

        let slots: Vec<u32> = fx
            .native
            .active_bindings()
            .iter()
            .filter(|b| b.target == BindTarget::Source)
            .map(|b| b.stream_slot)
            .collect();
        assert_eq!(slots, vec![4, 5]);
    }

    #[test]
    fn recording_toggles_without_touching_display() {
        let fx = fixture();
        let mut group = live_group(&fx);
        group.read(&devices());
        let sink = RecordSink {
            manager: fx.manager,
            epoch: 7,
        };

        group.set_recording(RecordingMode::Always, Some(sink));
        assert_eq!(group.chain(1).unwrap().state(), ChainState::Recording);
        assert_eq!(fx.native.bindings_with(BindTarget::Record { epoch: 7 }), 2);

        group.set_recording(RecordingMode::Never, Some(sink));
        assert_eq!(group.chain(1).unwrap().state(), ChainState::Streaming);
        assert_eq!(fx.native.bindings_with(BindTarget::Record { epoch: 7 }), 0);
        assert_eq!(fx.native.bindings_with(BindTarget::Display), 2);
    }

    #[test]
    fn new_chains_inherit_recording() {
        let fx = fixture();
        let mut group = live_group(&fx);
        group.set_recording(
            RecordingMode::Always,
            Some(RecordSink {
                manager: fx.manager,
                epoch: 7,
            }),
        );
        group.read(&devices());
        assert!(group.chains().all(|c| c.is_recording()));
    }

    #[test]
    fn playback_binds_record_slot() {
        let fx = fixture();
        let mut group = FilterChainGroup::playback(
            fx.native.clone(),
            PlaybackTargets {
                manager: fx.manager,
                gpu_pool: fx.live.gpu_pool,
            },
        );
        group.read(&devices());

        let chain = group.chain(2).unwrap();
        assert_eq!(chain.state(), ChainState::Streaming);
        assert!(fx
            .native
            .active_bindings()
            .iter()
            .any(|b| b.stream_slot == 6 && b.target == BindTarget::Source));
    }

    #[test]
    fn close_unbinds_everything() {
        let fx = fixture();
        let mut group = live_group(&fx);
        group.read(&devices());
        group.set_recording(
            RecordingMode::Always,
            Some(RecordSink {
                manager: fx.manager,
                epoch: 7,
            }),
        );

        assert!(group.close().is_empty());
        assert!(group.is_empty());
        assert!(fx.native.active_bindings().is_empty());
    }
}
