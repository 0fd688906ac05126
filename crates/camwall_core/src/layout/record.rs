//! Persisted layout records.

use serde::{Deserialize, Serialize};

/// Current layout file format version.
pub const LAYOUT_VERSION: u32 = 1;

/// Window rectangle, stored as an `[x, y, width, height]` tuple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32, i32, i32)", into = "(i32, i32, i32, i32)")]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<(i32, i32, i32, i32)> for Geometry {
    fn from((x, y, width, height): (i32, i32, i32, i32)) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<Geometry> for (i32, i32, i32, i32) {
    fn from(g: Geometry) -> Self {
        (g.x, g.y, g.width, g.height)
    }
}

/// What every cell of a grid shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChildKind {
    /// Plain video from the group's chains.
    Video,
    /// Video analysed by a machine-vision worker of the given tag.
    MachineVision { tag: String },
}

/// Construction parameters of one grid cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildParams {
    #[serde(default)]
    pub device_id: Option<u64>,
}

/// Shape and contents of a grid container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRecord {
    pub child_kind: ChildKind,
    pub child_params: Vec<ChildParams>,
    pub geometry: Geometry,
    pub grid_rows: u32,
    pub grid_cols: u32,
}

/// One entry of a saved layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayoutRecord {
    GridContainer(GridRecord),
    PlaybackGridContainer(GridRecord),
    MainWindowGeometry {
        geometry: Geometry,
    },
    CameraListWindowGeometry {
        geometry: Geometry,
    },
    /// Written by a newer or older build; skipped on restore.
    #[serde(other)]
    Unknown,
}

impl LayoutRecord {
    /// Tag name as written in the file.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::GridContainer(_) => "GridContainer",
            Self::PlaybackGridContainer(_) => "PlaybackGridContainer",
            Self::MainWindowGeometry { .. } => "MainWindowGeometry",
            Self::CameraListWindowGeometry { .. } => "CameraListWindowGeometry",
            Self::Unknown => "Unknown",
        }
    }
}

/// An ordered set of records. At most one is current at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub version: u32,
    #[serde(default)]
    pub records: Vec<LayoutRecord>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            version: LAYOUT_VERSION,
            records: Vec::new(),
        }
    }
}

impl Layout {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_is_a_tuple_on_disk() {
        let json = serde_json::to_string(&Geometry::new(10, 20, 640, 480)).unwrap();
        assert_eq!(json, "[10,20,640,480]");
    }

    #[test]
    fn records_are_tagged_by_type() {
        let record = LayoutRecord::MainWindowGeometry {
            geometry: Geometry::new(0, 0, 1920, 1080),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "MainWindowGeometry");
        assert_eq!(value["geometry"], serde_json::json!([0, 0, 1920, 1080]));
    }

    #[test]
    fn grid_record_carries_child_kind() {
        let record = LayoutRecord::GridContainer(GridRecord {
            child_kind: ChildKind::MachineVision {
                tag: "movement".to_string(),
            },
            child_params: vec![ChildParams { device_id: Some(4) }],
            geometry: Geometry::new(1, 2, 3, 4),
            grid_rows: 1,
            grid_cols: 1,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "GridContainer");
        assert_eq!(value["child_kind"]["kind"], "machine_vision");
        assert_eq!(value["child_kind"]["tag"], "movement");
    }

    #[test]
    fn unknown_tag_decodes_to_unknown() {
        let json = r#"{"version":1,"records":[{"type":"FloatingClock","corner":"ne"}]}"#;
        let layout: Layout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.records, vec![LayoutRecord::Unknown]);
    }
}
