use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Opaque reference to an engine asset or class (mesh, material, actor class).
/// The core never interprets the contents, it only hands them to the backend.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct AssetRef(pub String);

impl AssetRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Maximum distance allowed between adjacent path nodes.
    pub max_distance_between_nodes: f32,

    /// Maximum distance at which curve visualization primitives are kept
    /// alive for an observer. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_view_distance_visualization: Option<f32>,
    /// Maximum distance at which collision volumes are kept alive for an
    /// observer. `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_view_distance_collision: Option<f32>,

    /// Half thickness of the collision boxes on both cross axes.
    pub collision_thickness: f32,
    /// Target arc length covered by one collision chunk.
    pub collision_step: f32,
    /// Maximum angle in degrees between consecutive curve directions before
    /// the subdivision walk closes the current chunk.
    pub collision_max_angle_difference: f32,

    /// Minimum trace length when picking from screen space.
    pub min_trace_distance: f32,

    pub path_node_class: AssetRef,
    pub path_visualization_mesh: AssetRef,
    pub path_visualization_material: AssetRef,
    pub path_visualization_color_parameter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_distance_between_nodes: 600.0,
            max_view_distance_visualization: Some(20_000.0),
            max_view_distance_collision: Some(7_500.0),
            collision_thickness: 30.0,
            collision_step: 300.0,
            collision_max_angle_difference: 10.0,
            min_trace_distance: 5_000.0,
            path_node_class: AssetRef::new("actors/path_node"),
            path_visualization_mesh: AssetRef::new("meshes/path_segment"),
            path_visualization_material: AssetRef::new("materials/path_visualization"),
            path_visualization_color_parameter: "PathColor".to_string(),
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Self>(&content).unwrap_or_else(|err| {
                log::warn!("error parsing {:?}: {err}, using defaults", path);
                Self::default()
            }),
            Err(_) => {
                log::warn!("no settings file found, creating default {:?}", path);
                let default = Self::default();
                if let Ok(toml_str) = toml::to_string_pretty(&default) {
                    let _ = fs::write(path, toml_str);
                }
                default
            }
        }
    }

    /// View distance for one visualization flag bit, unbounded when unset.
    #[inline]
    pub fn view_distance_for(&self, flags: crate::paths::path_structs::PathVisualizationFlags) -> f32 {
        use crate::paths::path_structs::PathVisualizationFlags as Flags;
        let configured = if flags.contains(Flags::VISUALIZATION) {
            self.max_view_distance_visualization
        } else if flags.contains(Flags::COLLISION) {
            self.max_view_distance_collision
        } else {
            None
        };
        configured.unwrap_or(f32::INFINITY)
    }
}
