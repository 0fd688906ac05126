//! End-to-end lifecycle of the resource graph against the simulated backend.

use std::sync::Arc;

use camwall_core::chains::ChainGroupKind;
use camwall_core::layout::{
    ChildKind, ChildParams, Container, Geometry, GridContainer, GridRecord, InjectedRefs,
    LayoutStore, ViewState,
};
use camwall_core::models::{Device, RecordingMode, RtspCamera};
use camwall_core::native::SimulatedServices;
use camwall_core::orchestrator::{GraphConfig, Orchestrator, OrchestratorError, RuntimeContext};
use camwall_core::storage::Decision;
use tempfile::tempdir;

fn devices() -> Vec<Device> {
    vec![
        Device::rtsp(1, 1, RtspCamera::new("10.1.0.1", "admin", "secret")),
        Device::rtsp(2, 2, RtspCamera::new("10.1.0.2", "admin", "secret")),
        Device::usb(3, 5, "/dev/video0"),
    ]
}

fn v1() -> GraphConfig {
    let mut config = GraphConfig {
        devices: devices(),
        ..Default::default()
    };
    config.storage.blocksize_mb = 1;
    config.storage.n_blocks = 8;
    config.storage.record = true;
    config
}

#[test]
fn reopen_reuses_then_recreates_storage() {
    camwall_core::logging::init_test_tracing();
    let dir = tempdir().unwrap();
    let native = Arc::new(SimulatedServices::new());
    let mut orchestrator = Orchestrator::new(RuntimeContext::new(native.clone(), dir.path().join("fs")));
    let layouts = LayoutStore::new(dir.path().join("layout.json"));
    let mut view = ViewState::new();

    let first = orchestrator.open(v1()).unwrap();
    let (slots, epoch) = {
        let graph = orchestrator.graph(first).unwrap();
        assert_eq!(graph.recording_mode(), RecordingMode::Always);
        graph.storage().write_block(3, b"motion at gate").unwrap();
        (graph.slot_map(), graph.storage().epoch())
    };

    let same = orchestrator.reopen(v1(), &mut view, &layouts, None).unwrap();
    assert_eq!(same.storage_decision, Decision::Reuse);
    let graph = orchestrator.graph(same.handle).unwrap();
    assert_eq!(graph.slot_map(), slots);
    assert_eq!(graph.recording_mode(), RecordingMode::Always);
    assert_eq!(graph.storage().epoch(), epoch);
    assert_eq!(
        graph.storage().read_block(3).unwrap().as_deref(),
        Some(&b"motion at gate"[..])
    );

    let mut v2 = v1();
    v2.storage.blocksize_mb = 2;
    let bigger = orchestrator.reopen(v2, &mut view, &layouts, None).unwrap();
    assert_eq!(bigger.storage_decision, Decision::Recreate);
    let graph = orchestrator.graph(bigger.handle).unwrap();
    assert!(graph.storage().epoch() > epoch);
    assert_eq!(graph.storage().read_block(3).unwrap(), None);

    assert!(matches!(
        orchestrator.graph(first),
        Err(OrchestratorError::StaleHandle { .. })
    ));

    orchestrator.close().unwrap();
    assert!(native.open_services().is_empty());
    assert!(native.active_bindings().is_empty());
}

#[test]
fn reopen_preserves_the_open_view() {
    let dir = tempdir().unwrap();
    let native = Arc::new(SimulatedServices::new());
    let mut orchestrator = Orchestrator::new(RuntimeContext::new(native, dir.path().join("fs")));
    let layouts = LayoutStore::new(dir.path().join("layout.json"));
    let mut view = ViewState::new();

    let handle = orchestrator.open(v1()).unwrap();
    {
        let refs = InjectedRefs::new(handle, orchestrator.graph(handle).unwrap(), None);
        let live = GridRecord {
            child_kind: ChildKind::Video,
            child_params: vec![
                ChildParams { device_id: Some(1) },
                ChildParams { device_id: Some(3) },
                ChildParams { device_id: None },
                ChildParams { device_id: None },
            ],
            geometry: Geometry::new(10, 10, 1280, 720),
            grid_rows: 2,
            grid_cols: 2,
        };
        let playback = GridRecord {
            child_kind: ChildKind::Video,
            child_params: vec![ChildParams { device_id: Some(2) }],
            geometry: Geometry::new(1300, 10, 640, 360),
            grid_rows: 1,
            grid_cols: 1,
        };
        let id = view.allocate_id();
        view.add(Container::Grid(GridContainer::new(id, ChainGroupKind::Live, &live, &refs).unwrap()));
        let id = view.allocate_id();
        view.add(Container::PlaybackGrid(GridContainer::new(
            id,
            ChainGroupKind::Playback,
            &playback,
            &refs,
        )
        .unwrap()));
        view.main_window = Some(Geometry::new(0, 0, 1920, 1080));
    }
    let before = layouts.capture(&view);

    let report = orchestrator.reopen(v1(), &mut view, &layouts, None).unwrap();
    assert_eq!(report.restored.containers, 2);
    assert_eq!(report.restored.windows, 1);
    assert_eq!(layouts.capture(&view), before);
    assert_eq!(layouts.load().unwrap(), before);

    let gpu_pool = orchestrator.graph(report.handle).unwrap().gpu_pool();
    for container in view.containers() {
        assert_eq!(container.grid().graph(), report.handle);
        assert_eq!(container.grid().gpu_pool(), gpu_pool);
    }
}

#[test]
fn duplicate_slot_acquires_nothing() {
    let dir = tempdir().unwrap();
    let native = Arc::new(SimulatedServices::new());
    let mut orchestrator = Orchestrator::new(RuntimeContext::new(native.clone(), dir.path().join("fs")));

    let mut config = v1();
    config.devices.push(Device::usb(9, 5, "/dev/video1"));
    let err = orchestrator.open(config).unwrap_err();

    assert!(matches!(err, OrchestratorError::CorruptDeviceSet { slot: 5, .. }));
    assert!(native.journal().is_empty());
    assert!(!dir.path().join("fs").exists());
}
