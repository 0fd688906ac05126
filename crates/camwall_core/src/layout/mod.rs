//! Layout persistence: the open-container view and its saved form.
//!
//! A [`Layout`] is an ordered list of tagged records. [`LayoutStore`]
//! captures one from the live [`ViewState`], writes it to disk, and
//! rebuilds containers from it against a freshly opened resource graph.

mod container;
mod record;
mod store;

pub use container::{Cell, Container, ContainerId, GridContainer, InjectedRefs, ViewState, MAX_GRID_SIDE};
pub use record::{ChildKind, ChildParams, Geometry, GridRecord, Layout, LayoutRecord, LAYOUT_VERSION};
pub use store::{LayoutStore, RestoreReport};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing the layout file.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Layout I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode layout: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to decode layout '{path}': {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Grid of {rows}x{cols} exceeds {max} cells per side")]
    GridTooLarge { rows: u32, cols: u32, max: u32 },
}

impl LayoutError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for layout operations.
pub type LayoutResult<T> = Result<T, LayoutError>;
