//! Open display containers and the view that holds them.

use std::fmt;

use super::record::{ChildKind, ChildParams, Geometry, GridRecord, LayoutRecord};
use super::{LayoutError, LayoutResult};
use crate::chains::ChainGroupKind;
use crate::native::NativeHandle;
use crate::orchestrator::{GraphHandle, ResourceGraph};
use crate::workers::{WorkerLease, WorkerPool};

pub type ContainerId = u64;

/// Largest number of rows or columns a grid may have.
pub const MAX_GRID_SIDE: u32 = 16;

/// Runtime collaborators handed to a container when it is built.
///
/// Borrowed from the orchestrator; valid until the next reopen.
#[derive(Clone, Copy)]
pub struct InjectedRefs<'a> {
    pub handle: GraphHandle,
    pub graph: &'a ResourceGraph,
    pub workers: Option<&'a WorkerPool>,
}

impl<'a> InjectedRefs<'a> {
    pub fn new(handle: GraphHandle, graph: &'a ResourceGraph, workers: Option<&'a WorkerPool>) -> Self {
        Self {
            handle,
            graph,
            workers,
        }
    }
}

/// One grid cell.
#[derive(Debug, Default)]
pub struct Cell {
    device_id: Option<u64>,
    worker: Option<WorkerLease>,
}

impl Cell {
    pub fn device_id(&self) -> Option<u64> {
        self.device_id
    }

    pub fn worker(&self) -> Option<&WorkerLease> {
        self.worker.as_ref()
    }
}

/// A rows x cols grid of video cells attached to one chain group.
#[derive(Debug)]
pub struct GridContainer {
    id: ContainerId,
    group: ChainGroupKind,
    child_kind: ChildKind,
    cells: Vec<Cell>,
    geometry: Geometry,
    rows: u32,
    cols: u32,
    graph: GraphHandle,
    gpu_pool: NativeHandle,
}

impl GridContainer {
    /// Build from saved parameters against a live graph.
    ///
    /// Cells naming a device the group no longer has come up unbound.
    /// Machine-vision cells take a worker lease; if none is free the cell
    /// is built without one. Grids wider or taller than [`MAX_GRID_SIDE`]
    /// are rejected.
    pub fn new(
        id: ContainerId,
        group: ChainGroupKind,
        record: &GridRecord,
        refs: &InjectedRefs,
    ) -> LayoutResult<Self> {
        let rows = record.grid_rows.max(1);
        let cols = record.grid_cols.max(1);
        if rows > MAX_GRID_SIDE || cols > MAX_GRID_SIDE {
            return Err(LayoutError::GridTooLarge {
                rows,
                cols,
                max: MAX_GRID_SIDE,
            });
        }
        let count = rows as usize * cols as usize;

        let mut grid = Self {
            id,
            group,
            child_kind: record.child_kind.clone(),
            cells: (0..count).map(|_| Cell::default()).collect(),
            geometry: record.geometry,
            rows,
            cols,
            graph: refs.handle,
            gpu_pool: refs.graph.gpu_pool(),
        };

        if let ChildKind::MachineVision { tag } = &grid.child_kind {
            for (index, cell) in grid.cells.iter_mut().enumerate() {
                cell.worker = refs.workers.and_then(|pool| pool.acquire(tag));
                if cell.worker.is_none() {
                    tracing::warn!(container = id, cell = index, tag = %tag, "No free machine-vision worker");
                }
            }
        }

        for (index, params) in record.child_params.iter().take(count).enumerate() {
            if let Some(device_id) = params.device_id {
                if !grid.assign(refs.graph, index, Some(device_id)) {
                    tracing::warn!(
                        container = id,
                        cell = index,
                        device_id,
                        "Device no longer present, cell left unbound"
                    );
                }
            }
        }
        Ok(grid)
    }

    /// Point a cell at a device (or clear it). Returns false if the cell
    /// does not exist or the device has no chain in this grid's group.
    pub fn assign(&mut self, graph: &ResourceGraph, cell: usize, device_id: Option<u64>) -> bool {
        let stream_slot = match device_id {
            Some(id) => match graph.chains(self.group).chain_for_device(id) {
                Some(chain) => Some(match self.group {
                    ChainGroupKind::Live => chain.slots().live_main,
                    ChainGroupKind::Playback => chain.slots().record,
                }),
                None => return false,
            },
            None => None,
        };
        let Some(target) = self.cells.get_mut(cell) else {
            return false;
        };
        target.device_id = device_id;
        if let Some(lease) = &target.worker {
            match stream_slot {
                Some(slot) => {
                    lease.activate(slot);
                }
                None => lease.deactivate(),
            }
        }
        true
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn group(&self) -> ChainGroupKind {
        self.group
    }

    pub fn child_kind(&self) -> &ChildKind {
        &self.child_kind
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    pub fn shape(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    /// Graph this grid was built against.
    pub fn graph(&self) -> GraphHandle {
        self.graph
    }

    pub fn gpu_pool(&self) -> NativeHandle {
        self.gpu_pool
    }

    fn record(&self) -> GridRecord {
        GridRecord {
            child_kind: self.child_kind.clone(),
            child_params: self
                .cells
                .iter()
                .map(|c| ChildParams {
                    device_id: c.device_id,
                })
                .collect(),
            geometry: self.geometry,
            grid_rows: self.rows,
            grid_cols: self.cols,
        }
    }
}

/// Every kind of container a view can hold.
#[derive(Debug)]
pub enum Container {
    Grid(GridContainer),
    PlaybackGrid(GridContainer),
}

impl Container {
    /// Rebuild a container from a grid record. Window records yield `None`.
    pub fn from_record(
        id: ContainerId,
        record: &LayoutRecord,
        refs: &InjectedRefs,
    ) -> LayoutResult<Option<Self>> {
        let container = match record {
            LayoutRecord::GridContainer(grid) => {
                Self::Grid(GridContainer::new(id, ChainGroupKind::Live, grid, refs)?)
            }
            LayoutRecord::PlaybackGridContainer(grid) => {
                Self::PlaybackGrid(GridContainer::new(id, ChainGroupKind::Playback, grid, refs)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(container))
    }

    /// Construction parameters, without runtime collaborators.
    pub fn serialize(&self) -> LayoutRecord {
        match self {
            Self::Grid(grid) => LayoutRecord::GridContainer(grid.record()),
            Self::PlaybackGrid(grid) => LayoutRecord::PlaybackGridContainer(grid.record()),
        }
    }

    pub fn grid(&self) -> &GridContainer {
        match self {
            Self::Grid(grid) | Self::PlaybackGrid(grid) => grid,
        }
    }

    pub fn grid_mut(&mut self) -> &mut GridContainer {
        match self {
            Self::Grid(grid) | Self::PlaybackGrid(grid) => grid,
        }
    }

    pub fn id(&self) -> ContainerId {
        self.grid().id()
    }

    /// The container is going away; release what it holds.
    pub fn closing(self) {
        let grid = match self {
            Self::Grid(grid) | Self::PlaybackGrid(grid) => grid,
        };
        let released = grid.cells.into_iter().filter_map(|c| c.worker).count();
        tracing::debug!(container = grid.id, workers = released, "Container closed");
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.grid().shape();
        let name = match self {
            Self::Grid(_) => "grid",
            Self::PlaybackGrid(_) => "playback grid",
        };
        write!(f, "{} #{} ({}x{})", name, self.id(), rows, cols)
    }
}

/// Everything the user currently has open.
#[derive(Debug)]
pub struct ViewState {
    containers: Vec<Container>,
    pub main_window: Option<Geometry>,
    pub camera_list: Option<Geometry>,
    next_id: ContainerId,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            main_window: None,
            camera_list: None,
            next_id: 1,
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a container about to be built.
    pub fn allocate_id(&mut self) -> ContainerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add(&mut self, container: Container) -> ContainerId {
        let id = container.id();
        self.containers.push(container);
        id
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn get(&self, id: ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| c.id() == id)
    }

    pub fn get_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.id() == id)
    }

    /// Close one container. Returns false if no container has this id.
    pub fn close(&mut self, id: ContainerId) -> bool {
        match self.containers.iter().position(|c| c.id() == id) {
            Some(pos) => {
                self.containers.remove(pos).closing();
                true
            }
            None => false,
        }
    }

    /// Close every container. Window geometry is kept.
    pub fn clear(&mut self) -> usize {
        let count = self.containers.len();
        for container in self.containers.drain(..) {
            container.closing();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}
