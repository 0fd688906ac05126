//! Saving, loading and restoring layouts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::container::{Container, InjectedRefs, ViewState};
use super::record::{Layout, LayoutRecord, LAYOUT_VERSION};
use super::{LayoutError, LayoutResult};

/// What a restore rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub containers: usize,
    pub windows: usize,
    /// Records with a tag this build does not know, or that could not be
    /// rebuilt.
    pub skipped: usize,
}

/// Layout file manager. One layout is current; saving replaces it.
#[derive(Debug, Clone)]
pub struct LayoutStore {
    path: PathBuf,
}

impl LayoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Describe the open view. Runtime collaborators are left out.
    pub fn capture(&self, view: &ViewState) -> Layout {
        let mut records: Vec<LayoutRecord> = view.containers().iter().map(Container::serialize).collect();
        if let Some(geometry) = view.main_window {
            records.push(LayoutRecord::MainWindowGeometry { geometry });
        }
        if let Some(geometry) = view.camera_list {
            records.push(LayoutRecord::CameraListWindowGeometry { geometry });
        }
        Layout {
            version: LAYOUT_VERSION,
            records,
        }
    }

    /// Replace the saved layout.
    pub fn save(&self, layout: &Layout) -> LayoutResult<()> {
        let json = serde_json::to_string_pretty(layout).map_err(LayoutError::Serialize)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LayoutError::io(parent, e))?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path).map_err(|e| LayoutError::io(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(|e| LayoutError::io(&temp_path, e))?;
        }
        fs::rename(&temp_path, &self.path).map_err(|e| LayoutError::io(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), records = layout.records.len(), "Layout saved");
        Ok(())
    }

    /// Read the saved layout. Nothing saved yet gives the empty layout.
    pub fn load(&self) -> LayoutResult<Layout> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Layout::default()),
            Err(e) => return Err(LayoutError::io(&self.path, e)),
        };
        serde_json::from_str(&content).map_err(|source| LayoutError::Deserialize {
            path: self.path.clone(),
            source,
        })
    }

    /// Rebuild containers and window geometry from `layout` into `view`.
    pub fn restore(&self, layout: &Layout, refs: &InjectedRefs, view: &mut ViewState) -> RestoreReport {
        let mut report = RestoreReport::default();
        for record in &layout.records {
            match record {
                LayoutRecord::GridContainer(_) | LayoutRecord::PlaybackGridContainer(_) => {
                    let id = view.allocate_id();
                    match Container::from_record(id, record, refs) {
                        Ok(Some(container)) => {
                            tracing::debug!("Restored {}", container);
                            view.add(container);
                            report.containers += 1;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("Skipping layout record {}: {}", record.tag(), e);
                            report.skipped += 1;
                        }
                    }
                }
                LayoutRecord::MainWindowGeometry { geometry } => {
                    view.main_window = Some(*geometry);
                    report.windows += 1;
                }
                LayoutRecord::CameraListWindowGeometry { geometry } => {
                    view.camera_list = Some(*geometry);
                    report.windows += 1;
                }
                LayoutRecord::Unknown => {
                    tracing::warn!("Skipping layout record of unknown type");
                    report.skipped += 1;
                }
            }
        }
        tracing::info!(
            containers = report.containers,
            windows = report.windows,
            skipped = report.skipped,
            "Layout restored"
        );
        report
    }
}
