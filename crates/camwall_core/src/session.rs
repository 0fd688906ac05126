//! Session: the glue a UI front end drives.
//!
//! Owns configuration, devices, the orchestrator, the open view and the
//! machine-vision workers, and runs the config-dialog reconfiguration flow.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{
    ConfigError, ConfigManager, ConfigSection, DeviceStore, Settings, StorageConfig, MB,
};
use crate::layout::{
    ChildKind, ChildParams, Container, ContainerId, Geometry, GridContainer, GridRecord,
    InjectedRefs, LayoutError, LayoutStore, RestoreReport, ViewState,
};
use crate::chains::ChainGroupKind;
use crate::native::NativeServices;
use crate::orchestrator::{
    BusyFlag, GraphConfig, GraphHandle, Orchestrator, OrchestratorError, ReopenReport,
    RuntimeContext, TeardownReport,
};
use crate::storage::{Decision, StorageGeometry, StorageGeometryManager};
use crate::workers::{WorkerEvent, WorkerPool};

const SETTINGS_FILE: &str = "settings.toml";
const VERSION_FILE: &str = "version";

/// Errors surfaced to the front end.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Failed to start machine-vision workers: {0}")]
    Workers(#[source] std::io::Error),

    #[error("Version file error: {0}")]
    Version(#[source] std::io::Error),

    #[error("No container with id {0}")]
    NoSuchContainer(ContainerId),

    #[error("Container {container} has no cell {cell}")]
    NoSuchCell { container: ContainerId, cell: usize },

    #[error("Device {0} has no chain in the open graph")]
    UnknownDevice(u64),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Where a session keeps its files.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub config_dir: PathBuf,
}

impl SessionPaths {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    pub fn version_file(&self) -> PathBuf {
        self.config_dir.join(VERSION_FILE)
    }
}

/// A running workstation session.
pub struct Session {
    paths: SessionPaths,
    config: ConfigManager,
    devices: DeviceStore,
    layouts: LayoutStore,
    view: ViewState,
    workers: WorkerPool,
    config_modified: bool,
    storage_modified: bool,
    // Declared last so containers and workers are gone before the graph closes.
    orchestrator: Orchestrator,
}

impl Session {
    /// Start a session: version check, settings and devices, workers, and
    /// the first resource graph.
    pub fn bootstrap(paths: SessionPaths, native: Arc<dyn NativeServices>) -> SessionResult<Self> {
        let first_start = is_first_start(&paths.version_file());
        let previous_storage = if first_start {
            reset_config_dir(&paths)?
        } else {
            None
        };

        let mut config = ConfigManager::new(paths.settings_file());
        config.load_or_create()?;
        config.ensure_dirs_exist()?;
        if first_start {
            keep_storage(&mut config, previous_storage)?;
            write_version_file(&paths.version_file())?;
        }

        let devices = DeviceStore::load_or_create(config.devices_file())?;
        let workers = WorkerPool::start(&config.settings().workers.specs).map_err(SessionError::Workers)?;
        let layouts = LayoutStore::new(config.layout_file());
        let orchestrator = Orchestrator::new(RuntimeContext::new(native, config.storage_dir()));

        let mut session = Self {
            paths,
            config,
            devices,
            layouts,
            view: ViewState::new(),
            workers,
            config_modified: false,
            storage_modified: false,
            orchestrator,
        };

        let handle = session.orchestrator.open(session.graph_config())?;
        session.after_open(handle)?;
        tracing::info!(first_start, "Session started");
        Ok(session)
    }

    /// Configuration for the next graph, from the current settings and devices.
    pub fn graph_config(&self) -> GraphConfig {
        let settings = self.config.settings();
        GraphConfig {
            memory: settings.memory.clone(),
            storage: settings.storage.clone(),
            devices: self.devices.devices().to_vec(),
        }
    }

    fn current(&self) -> SessionResult<GraphHandle> {
        Ok(self.orchestrator.current().ok_or(OrchestratorError::NotOpen)?)
    }

    /// Persist the geometry the storage was actually created with.
    fn after_open(&mut self, handle: GraphHandle) -> SessionResult<()> {
        let graph = self.orchestrator.graph(handle)?;
        if graph.storage_decision() != Decision::Recreate {
            return Ok(());
        }
        let geometry = graph.storage().geometry().clone();
        apply_geometry(&mut self.config.settings_mut().storage, &geometry);
        self.config.update_section(ConfigSection::Storage)?;
        tracing::info!(
            block_size_bytes = geometry.block_size_bytes,
            block_count = geometry.block_count,
            "Effective storage geometry written to settings"
        );
        Ok(())
    }

    fn open_container(&mut self, group: ChainGroupKind, record: GridRecord) -> SessionResult<ContainerId> {
        let handle = self.current()?;
        let graph = self.orchestrator.graph(handle)?;
        let refs = InjectedRefs::new(handle, graph, Some(&self.workers));
        let id = self.view.allocate_id();
        let grid = GridContainer::new(id, group, &record, &refs)?;
        let container = match group {
            ChainGroupKind::Live => Container::Grid(grid),
            ChainGroupKind::Playback => Container::PlaybackGrid(grid),
        };
        tracing::info!("Opened {}", container);
        Ok(self.view.add(container))
    }

    fn empty_grid(child_kind: ChildKind, rows: u32, cols: u32) -> GridRecord {
        GridRecord {
            child_kind,
            child_params: Vec::new(),
            geometry: Geometry::default(),
            grid_rows: rows,
            grid_cols: cols,
        }
    }

    /// Open a live video grid.
    pub fn open_grid(&mut self, rows: u32, cols: u32) -> SessionResult<ContainerId> {
        self.open_container(ChainGroupKind::Live, Self::empty_grid(ChildKind::Video, rows, cols))
    }

    /// Open a playback grid over recorded streams.
    pub fn open_playback_grid(&mut self, rows: u32, cols: u32) -> SessionResult<ContainerId> {
        self.open_container(
            ChainGroupKind::Playback,
            Self::empty_grid(ChildKind::Video, rows, cols),
        )
    }

    /// Open a single-cell grid analysed by a worker of `tag`.
    pub fn open_machine_vision(&mut self, tag: &str) -> SessionResult<ContainerId> {
        let kind = ChildKind::MachineVision {
            tag: tag.to_string(),
        };
        self.open_container(ChainGroupKind::Live, Self::empty_grid(kind, 1, 1))
    }

    /// The container is closing.
    pub fn close_container(&mut self, id: ContainerId) -> SessionResult<()> {
        if self.view.close(id) {
            Ok(())
        } else {
            Err(SessionError::NoSuchContainer(id))
        }
    }

    /// Show `device_id` (or nothing) in one cell of a container.
    pub fn assign_device(
        &mut self,
        container: ContainerId,
        cell: usize,
        device_id: Option<u64>,
    ) -> SessionResult<()> {
        let target = self
            .view
            .get_mut(container)
            .ok_or(SessionError::NoSuchContainer(container))?
            .grid_mut();
        if cell >= target.cells().len() {
            return Err(SessionError::NoSuchCell { container, cell });
        }
        let graph = self.orchestrator.graph(target.graph())?;
        if target.assign(graph, cell, device_id) {
            Ok(())
        } else {
            Err(SessionError::UnknownDevice(device_id.unwrap_or_default()))
        }
    }

    /// Settings or devices changed in the config dialog.
    pub fn mark_config_modified(&mut self) {
        self.config_modified = true;
    }

    /// Storage settings changed in the config dialog.
    pub fn mark_storage_modified(&mut self) {
        self.storage_modified = true;
    }

    /// The config dialog closed. Persists and reopens if anything changed.
    pub fn config_dialog_closed(&mut self) -> SessionResult<Option<ReopenReport>> {
        if !self.config_modified && !self.storage_modified {
            return Ok(None);
        }
        self.config.save()?;
        self.devices.save()?;
        self.config_modified = false;
        self.storage_modified = false;
        self.reconfigure().map(Some)
    }

    /// Tear the graph down and build it again from the current settings.
    pub fn reconfigure(&mut self) -> SessionResult<ReopenReport> {
        let config = self.graph_config();
        let report = self.orchestrator.reopen(
            config,
            &mut self.view,
            &self.layouts,
            Some(&self.workers),
        )?;
        self.after_open(report.handle)?;
        Ok(report)
    }

    /// Save the open view as the current layout.
    pub fn save_layout(&self) -> SessionResult<()> {
        let layout = self.layouts.capture(&self.view);
        self.layouts.save(&layout)?;
        Ok(())
    }

    /// Replace the open view with the saved layout.
    pub fn load_layout(&mut self) -> SessionResult<RestoreReport> {
        let layout = self.layouts.load()?;
        let handle = self.current()?;
        self.view.clear();
        let graph = self.orchestrator.graph(handle)?;
        let refs = InjectedRefs::new(handle, graph, Some(&self.workers));
        Ok(self.layouts.restore(&layout, &refs, &mut self.view))
    }

    /// Close containers, the graph and the workers.
    pub fn shutdown(&mut self) -> SessionResult<TeardownReport> {
        self.view.clear();
        let report = match self.orchestrator.close() {
            Ok(report) => report,
            Err(OrchestratorError::NotOpen) => TeardownReport::default(),
            Err(e) => return Err(e.into()),
        };
        self.workers.shutdown();
        tracing::info!(clean = report.is_clean(), "Session shut down");
        Ok(report)
    }

    /// Events reported by machine-vision workers since the last poll.
    pub fn poll_worker_events(&self) -> Vec<WorkerEvent> {
        self.workers.drain_events()
    }

    /// Whether a reconfiguration is running.
    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.orchestrator.busy_flag()
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        self.config.settings()
    }

    /// Edit settings. Call a `mark_*_modified` afterwards.
    pub fn settings_mut(&mut self) -> &mut Settings {
        self.config.settings_mut()
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceStore {
        &mut self.devices
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn layouts(&self) -> &LayoutStore {
        &self.layouts
    }
}

/// Version file missing, unreadable, or of another major.minor.
fn is_first_start(version_file: &Path) -> bool {
    let Ok(content) = fs::read_to_string(version_file) else {
        return true;
    };
    let mut parts = content.trim().split('.').map(|p| p.parse::<u32>().ok());
    let stored = (parts.next().flatten(), parts.next().flatten());
    let (major, minor) = crate::version_major_minor();
    stored != (Some(major), Some(minor))
}

/// Drop settings, devices and layout so they are recreated with defaults.
///
/// Returns the previous storage section, if the old settings could be read.
fn reset_config_dir(paths: &SessionPaths) -> SessionResult<Option<StorageConfig>> {
    let mut previous = ConfigManager::new(paths.settings_file());
    let storage = match previous.load() {
        Ok(()) => Some(previous.settings().storage.clone()),
        Err(e) => {
            tracing::debug!("No previous settings to reset: {}", e);
            None
        }
    };
    let targets = [
        paths.settings_file(),
        previous.devices_file(),
        previous.layout_file(),
    ];
    for file in &targets {
        match fs::remove_file(file) {
            Ok(()) => tracing::warn!(file = %file.display(), "First start, removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SessionError::Config(ConfigError::ReadError(e))),
        }
    }
    Ok(storage)
}

/// Carry the storage geometry over a first-start reset so existing
/// recordings are reused. Without previous settings, a loadable
/// descriptor in the storage directory supplies the geometry.
fn keep_storage(config: &mut ConfigManager, previous: Option<StorageConfig>) -> SessionResult<()> {
    let storage = match previous {
        Some(storage) => storage,
        None => match StorageGeometryManager::new(config.storage_dir()).load() {
            Ok(handle) => {
                let mut storage = config.settings().storage.clone();
                apply_geometry(&mut storage, handle.geometry());
                storage
            }
            Err(e) => {
                tracing::debug!("No existing block storage to keep: {}", e);
                return Ok(());
            }
        },
    };
    if config.settings().storage == storage {
        return Ok(());
    }
    config.settings_mut().storage = storage;
    config.update_section(ConfigSection::Storage)?;
    tracing::info!("Storage geometry kept across first-start reset");
    Ok(())
}

fn apply_geometry(storage: &mut StorageConfig, geometry: &StorageGeometry) {
    storage.fs_flavor = geometry.flavor;
    storage.partition_uuid = geometry.partition_id.clone();
    storage.blocksize_mb = geometry.block_size_bytes / MB;
    storage.n_blocks = geometry.block_count;
}

fn write_version_file(path: &Path) -> SessionResult<()> {
    fs::write(path, crate::version()).map_err(SessionError::Version)
}
