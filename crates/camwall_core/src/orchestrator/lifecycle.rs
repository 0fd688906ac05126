//! Open, close and reopen of the resource graph.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::arena::{GenerationalArena, GraphHandle};
use super::errors::{OrchestratorError, OrchestratorResult, StepError};
use super::graph::ResourceGraph;
use super::pipeline::ResourcePipeline;
use super::types::{GraphConfig, GraphParts, OpenContext, RuntimeContext, TeardownReport};
use super::standard_pipeline;
use crate::layout::{InjectedRefs, LayoutStore, RestoreReport, ViewState};
use crate::models::validate_device_set;
use crate::storage::Decision;
use crate::workers::WorkerPool;

/// Where the orchestrator stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No graph is open.
    Idle,
    /// A graph of this generation is open.
    Live { generation: u64 },
    /// A reconfiguration failed; nothing is open and nothing will open.
    Broken { reason: String },
}

/// Shared "please wait" indicator, set for the duration of a reopen.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn hold(&self) -> BusyGuard<'_> {
        self.0.store(true, Ordering::Release);
        BusyGuard(self)
    }
}

struct BusyGuard<'a>(&'a BusyFlag);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::Release);
    }
}

/// Outcome of a successful reopen.
#[derive(Debug)]
pub struct ReopenReport {
    pub handle: GraphHandle,
    /// Teardown of the graph that was replaced.
    pub teardown: TeardownReport,
    pub storage_decision: Decision,
    pub restored: RestoreReport,
}

/// Owns the live resource graph. Single-threaded and synchronous.
pub struct Orchestrator {
    runtime: RuntimeContext,
    pipeline: ResourcePipeline,
    graphs: GenerationalArena<ResourceGraph>,
    current: Option<GraphHandle>,
    broken: Option<String>,
    busy: BusyFlag,
}

impl Orchestrator {
    /// Orchestrator running the standard pipeline.
    pub fn new(runtime: RuntimeContext) -> Self {
        Self::with_pipeline(runtime, standard_pipeline())
    }

    pub fn with_pipeline(runtime: RuntimeContext, pipeline: ResourcePipeline) -> Self {
        Self {
            runtime,
            pipeline,
            graphs: GenerationalArena::new(),
            current: None,
            broken: None,
            busy: BusyFlag::default(),
        }
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn state(&self) -> OrchestratorState {
        match (&self.broken, self.current) {
            (Some(reason), _) => OrchestratorState::Broken {
                reason: reason.clone(),
            },
            (None, Some(handle)) => OrchestratorState::Live {
                generation: handle.generation(),
            },
            (None, None) => OrchestratorState::Idle,
        }
    }

    /// Build a graph from `config` in dependency order.
    ///
    /// On failure everything acquired by this call has been released.
    pub fn open(&mut self, config: GraphConfig) -> OrchestratorResult<GraphHandle> {
        if let Some(reason) = &self.broken {
            return Err(OrchestratorError::Broken(reason.clone()));
        }
        if self.current.is_some() {
            return Err(OrchestratorError::AlreadyOpen);
        }
        validate_device_set(&config.devices)?;

        let mut parts = GraphParts::new();
        let run = {
            let ctx = OpenContext::new(&self.runtime, &config);
            self.pipeline.open(&ctx, &mut parts)
        };
        let run = run.map_err(|failure| {
            tracing::error!(
                step = %failure.step_name,
                rollback_failures = failure.rollback.failures.len(),
                "Open failed, acquired resources released"
            );
            OrchestratorError::from_step(failure.step_name, failure.source)
        })?;

        let graph = match ResourceGraph::from_parts(config, parts) {
            Ok(graph) => graph,
            Err(mut parts) => {
                self.pipeline.close(self.runtime.native.as_ref(), &mut parts);
                return Err(OrchestratorError::from_step(
                    "Graph",
                    StepError::precondition_failed("pipeline left the graph incomplete"),
                ));
            }
        };

        let decision = graph.storage_decision();
        let handle = self.graphs.insert(graph);
        self.current = Some(handle);
        tracing::info!(
            graph = %handle,
            steps = run.total_steps(),
            storage = %decision,
            "Resource graph open"
        );
        Ok(handle)
    }

    /// Tear the current graph down in reverse dependency order.
    ///
    /// Failures are collected, never fatal.
    pub fn close(&mut self) -> OrchestratorResult<TeardownReport> {
        let handle = self.current.take().ok_or(OrchestratorError::NotOpen)?;
        let graph = self
            .graphs
            .remove(handle)
            .ok_or(OrchestratorError::StaleHandle {
                generation: handle.generation(),
            })?;

        let (_config, mut parts) = graph.into_parts();
        let report = self.pipeline.close(self.runtime.native.as_ref(), &mut parts);
        if report.is_clean() {
            tracing::info!(graph = %handle, "Resource graph closed");
        } else {
            tracing::warn!(
                graph = %handle,
                failures = report.failures.len(),
                "Resource graph closed with teardown failures"
            );
        }
        Ok(report)
    }

    /// Replace the graph with one built from `config`, carrying the open
    /// view across.
    ///
    /// The view is captured and saved, its containers closed, the old graph
    /// torn down, the new one opened and the view restored against it. A
    /// failed open leaves the orchestrator broken with nothing open.
    pub fn reopen(
        &mut self,
        config: GraphConfig,
        view: &mut ViewState,
        layouts: &LayoutStore,
        workers: Option<&WorkerPool>,
    ) -> OrchestratorResult<ReopenReport> {
        if let Some(reason) = &self.broken {
            return Err(OrchestratorError::Broken(reason.clone()));
        }
        let busy = self.busy.clone();
        let _guard = busy.hold();

        let snapshot = layouts.capture(view);
        if let Err(e) = layouts.save(&snapshot) {
            tracing::warn!("Could not save layout before reopen: {}", e);
        }
        view.clear();

        let teardown = match self.current {
            Some(_) => self.close()?,
            None => TeardownReport::default(),
        };

        let handle = match self.open(config) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Reopen failed, manual restart required: {}", e);
                self.broken = Some(e.to_string());
                return Err(e);
            }
        };

        let graph = self.graph(handle)?;
        let refs = InjectedRefs::new(handle, graph, workers);
        let restored = layouts.restore(&snapshot, &refs, view);

        Ok(ReopenReport {
            handle,
            teardown,
            storage_decision: graph.storage_decision(),
            restored,
        })
    }

    /// Borrow a graph. Fails if `handle` belongs to a replaced graph.
    pub fn graph(&self, handle: GraphHandle) -> OrchestratorResult<&ResourceGraph> {
        self.graphs.get(handle).ok_or(OrchestratorError::StaleHandle {
            generation: handle.generation(),
        })
    }

    pub fn graph_mut(&mut self, handle: GraphHandle) -> OrchestratorResult<&mut ResourceGraph> {
        self.graphs.get_mut(handle).ok_or(OrchestratorError::StaleHandle {
            generation: handle.generation(),
        })
    }

    pub fn current(&self) -> Option<GraphHandle> {
        self.current
    }

    pub fn current_graph(&self) -> Option<&ResourceGraph> {
        self.current.and_then(|h| self.graphs.get(h))
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Flag other threads can poll while a reopen runs.
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.current.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("Failed to close graph on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ChainGroupKind, ChainState};
    use crate::config::StorageConfig;
    use crate::layout::{ChildKind, ChildParams, Container, Geometry, GridContainer, GridRecord};
    use crate::models::{Device, RecordingMode, RtspCamera, StorageFlavor};
    use crate::native::{BindTarget, JournalEntry, ServiceKind, SimulatedServices};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        native: Arc<SimulatedServices>,
        orchestrator: Orchestrator,
        layouts: LayoutStore,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let native = Arc::new(SimulatedServices::new());
        let runtime = RuntimeContext::new(native.clone(), dir.path().join("fs"));
        let layouts = LayoutStore::new(dir.path().join("layout.json"));
        Fixture {
            _dir: dir,
            native,
            orchestrator: Orchestrator::new(runtime),
            layouts,
        }
    }

    fn devices() -> Vec<Device> {
        vec![
            Device::rtsp(1, 1, RtspCamera::new("10.0.0.1", "admin", "pw")),
            Device::usb(2, 2, "/dev/video0"),
            Device::empty(3, 3),
        ]
    }

    fn config() -> GraphConfig {
        GraphConfig {
            devices: devices(),
            ..Default::default()
        }
    }

    fn opened_kinds(journal: &[JournalEntry]) -> Vec<ServiceKind> {
        journal
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Opened { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    fn closed_kinds(journal: &[JournalEntry]) -> Vec<ServiceKind> {
        journal
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Closed { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_acquires_in_dependency_order() {
        let mut fx = fixture();
        let handle = fx.orchestrator.open(config()).unwrap();

        assert_eq!(
            opened_kinds(&fx.native.journal()),
            vec![
                ServiceKind::CpuScheme,
                ServiceKind::GpuPool,
                ServiceKind::LiveThread,
                ServiceKind::UsbThread,
                ServiceKind::PlaybackManager,
            ]
        );
        let graph = fx.orchestrator.graph(handle).unwrap();
        assert_eq!(graph.storage_decision(), Decision::Recreate);
        assert_eq!(graph.live_chains().len(), 2);
        assert_eq!(
            fx.orchestrator.state(),
            OrchestratorState::Live {
                generation: handle.generation()
            }
        );
    }

    #[test]
    fn close_releases_in_reverse_order() {
        let mut fx = fixture();
        fx.orchestrator.open(config()).unwrap();
        fx.native.clear_journal();

        let report = fx.orchestrator.close().unwrap();
        assert!(report.is_clean());
        assert_eq!(
            report.steps_closed,
            vec!["Chains", "Playback", "Storage", "Capture", "GpuPool", "CpuScheme"]
        );

        let journal = fx.native.journal();
        assert_eq!(
            closed_kinds(&journal),
            vec![
                ServiceKind::PlaybackManager,
                ServiceKind::UsbThread,
                ServiceKind::LiveThread,
                ServiceKind::GpuPool,
                ServiceKind::CpuScheme,
            ]
        );
        let first_close = journal
            .iter()
            .position(|e| matches!(e, JournalEntry::CloseRequested { .. }))
            .unwrap();
        assert!(journal[..first_close]
            .iter()
            .all(|e| matches!(e, JournalEntry::Unbound { .. })));
        assert!(fx.native.open_services().is_empty());
        assert_eq!(fx.orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn duplicate_slot_refuses_open() {
        let mut fx = fixture();
        let mut cfg = config();
        cfg.devices.push(Device::usb(9, 2, "/dev/video1"));

        let err = fx.orchestrator.open(cfg).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::CorruptDeviceSet { slot: 2, first: 2, second: 9 }
        ));
        assert!(fx.native.journal().is_empty());
        assert!(fx.orchestrator.current().is_none());
    }

    #[test]
    fn capture_failure_rolls_back_everything() {
        let mut fx = fixture();
        fx.native.fail_open(ServiceKind::UsbThread);

        let err = fx.orchestrator.open(config()).unwrap_err();
        assert!(matches!(err, OrchestratorError::CaptureInitError(_)));
        assert!(fx.native.open_services().is_empty());
        assert_eq!(
            closed_kinds(&fx.native.journal()),
            vec![ServiceKind::LiveThread, ServiceKind::GpuPool, ServiceKind::CpuScheme]
        );
    }

    #[test]
    fn partition_without_id_is_storage_unavailable() {
        let mut fx = fixture();
        let mut cfg = config();
        cfg.storage = StorageConfig {
            fs_flavor: StorageFlavor::Partition,
            ..Default::default()
        };

        let err = fx.orchestrator.open(cfg).unwrap_err();
        assert!(matches!(err, OrchestratorError::StorageUnavailable(_)));
        assert!(fx.native.open_services().is_empty());
    }

    #[test]
    fn overflowing_block_size_is_storage_unavailable() {
        let mut fx = fixture();
        let mut cfg = config();
        cfg.storage.blocksize_mb = u64::MAX / 1024;

        let err = fx.orchestrator.open(cfg).unwrap_err();
        assert!(matches!(err, OrchestratorError::StorageUnavailable(_)));
        assert!(fx.native.open_services().is_empty());
        assert!(fx.orchestrator.current().is_none());
    }

    #[test]
    fn failing_release_does_not_stop_teardown() {
        let mut fx = fixture();
        fx.orchestrator.open(config()).unwrap();
        fx.native.clear_journal();
        fx.native.fail_close(ServiceKind::LiveThread);

        let report = fx.orchestrator.close().unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].resource, "live thread");
        assert_eq!(
            report.steps_closed,
            vec!["Chains", "Playback", "Storage", "Capture", "GpuPool", "CpuScheme"]
        );
        assert_eq!(
            closed_kinds(&fx.native.journal()),
            vec![
                ServiceKind::PlaybackManager,
                ServiceKind::UsbThread,
                ServiceKind::LiveThread,
                ServiceKind::GpuPool,
                ServiceKind::CpuScheme,
            ]
        );
        assert!(fx.native.open_services().is_empty());
        assert_eq!(fx.orchestrator.state(), OrchestratorState::Idle);
    }

    #[test]
    fn unreachable_camera_does_not_fail_open() {
        let mut fx = fixture();
        fx.native.mark_unreachable("/dev/video0");

        let handle = fx.orchestrator.open(config()).unwrap();
        let live = fx.orchestrator.graph(handle).unwrap().live_chains();
        let usb = live.chain_for_device(2).unwrap();
        assert_eq!(usb.state(), ChainState::Unbound);
        assert!(usb.last_error().is_some());
        assert_eq!(live.chain_for_device(1).unwrap().state(), ChainState::Streaming);
    }

    #[test]
    fn second_open_is_refused() {
        let mut fx = fixture();
        fx.orchestrator.open(config()).unwrap();
        assert!(matches!(
            fx.orchestrator.open(config()),
            Err(OrchestratorError::AlreadyOpen)
        ));
        assert!(matches!(fx.orchestrator.close(), Ok(_)));
        assert!(matches!(fx.orchestrator.close(), Err(OrchestratorError::NotOpen)));
    }

    #[test]
    fn reopen_unchanged_reuses_storage_and_keeps_mapping() {
        let mut fx = fixture();
        let first = fx.orchestrator.open(config()).unwrap();
        let slots_before = fx.orchestrator.graph(first).unwrap().slot_map();

        let mut view = ViewState::new();
        let report = fx
            .orchestrator
            .reopen(config(), &mut view, &fx.layouts, None)
            .unwrap();

        assert_eq!(report.storage_decision, Decision::Reuse);
        assert!(report.teardown.is_clean());
        let graph = fx.orchestrator.graph(report.handle).unwrap();
        assert_eq!(graph.slot_map(), slots_before);
        assert_eq!(graph.recording_mode(), RecordingMode::Never);
        assert!(matches!(
            fx.orchestrator.graph(first),
            Err(OrchestratorError::StaleHandle { .. })
        ));
        assert!(!fx.orchestrator.is_busy());
    }

    #[test]
    fn reopen_restores_open_containers() {
        let mut fx = fixture();
        let handle = fx.orchestrator.open(config()).unwrap();

        let mut view = ViewState::new();
        {
            let graph = fx.orchestrator.graph(handle).unwrap();
            let refs = InjectedRefs::new(handle, graph, None);
            let record = GridRecord {
                child_kind: ChildKind::Video,
                child_params: vec![ChildParams { device_id: Some(1) }, ChildParams::default()],
                geometry: Geometry::new(0, 0, 640, 360),
                grid_rows: 1,
                grid_cols: 2,
            };
            let id = view.allocate_id();
            view.add(Container::Grid(GridContainer::new(id, ChainGroupKind::Live, &record, &refs).unwrap()));
        }

        let report = fx
            .orchestrator
            .reopen(config(), &mut view, &fx.layouts, None)
            .unwrap();
        assert_eq!(report.restored.containers, 1);
        let grid = view.containers()[0].grid();
        assert_eq!(grid.graph(), report.handle);
        assert_eq!(grid.cells()[0].device_id(), Some(1));
        assert_eq!(grid.shape(), (1, 2));
    }

    #[test]
    fn recording_binds_record_slots_into_storage() {
        let mut fx = fixture();
        let mut cfg = config();
        cfg.storage.record = true;

        let handle = fx.orchestrator.open(cfg).unwrap();
        let epoch = fx.orchestrator.graph(handle).unwrap().storage().epoch();
        assert_eq!(fx.native.bindings_with(BindTarget::Record { epoch }), 2);
    }

    #[test]
    fn failed_reopen_leaves_orchestrator_broken() {
        let mut fx = fixture();
        fx.orchestrator.open(config()).unwrap();
        fx.native.fail_open(ServiceKind::GpuPool);

        let mut view = ViewState::new();
        assert!(fx
            .orchestrator
            .reopen(config(), &mut view, &fx.layouts, None)
            .is_err());
        assert!(matches!(fx.orchestrator.state(), OrchestratorState::Broken { .. }));
        assert!(fx.orchestrator.current().is_none());
        assert!(fx.native.open_services().is_empty());

        fx.native.clear_failures();
        assert!(matches!(
            fx.orchestrator.open(config()),
            Err(OrchestratorError::Broken(_))
        ));
    }
}
