//! Viewer configuration with TOML file support.
//!
//! Every section uses `#[serde(default)]` so a file only needs the values it
//! overrides.

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{OrbitCamera, OrbitLimits, Projection, ProjectionMode};
use crate::obj::ParseOptions;
use crate::transform::InstanceGrid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub model: ModelConfig,
    pub shaders: ShaderConfig,
    pub camera: CameraConfig,
    pub render: RenderConfig,
}

impl ViewerConfig {
    /// Load a config file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Size of the off-screen render target
    pub fn target_size(&self) -> (u32, u32) {
        let downscale = self.render.downscale.max(1);
        (self.window.width / downscale, self.window.height / downscale)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Mesh Rendering".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub normalize_normals: bool,
}

impl ModelConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            normalize_normals: self.normalize_normals,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/models/basic_model.obj"),
            normalize_normals: true,
        }
    }
}

/// Vertex and fragment stage sources for both programs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub geometry_vertex: PathBuf,
    pub geometry_fragment: PathBuf,
    pub post_vertex: PathBuf,
    pub post_fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            geometry_vertex: PathBuf::from("shaders/vertex.wgsl"),
            geometry_fragment: PathBuf::from("shaders/fragment.wgsl"),
            post_vertex: PathBuf::from("shaders/quad.wgsl"),
            post_fragment: PathBuf::from("shaders/sobel.wgsl"),
        }
    }
}

/// Initial orbit and projection; angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub target: [f32; 3],
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub projection: ProjectionMode,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraConfig {
    pub fn orbit_camera(&self) -> OrbitCamera {
        OrbitCamera::new(
            Point3::from(self.target),
            self.azimuth.to_radians(),
            self.elevation.to_radians(),
            self.distance,
        )
    }

    pub fn orbit_limits(&self) -> OrbitLimits {
        OrbitLimits {
            rotate_speed: self.rotate_speed,
            min_distance: self.min_distance,
            max_distance: self.max_distance,
            ..OrbitLimits::default()
        }
    }

    pub fn projection(&self) -> Projection {
        Projection {
            mode: self.projection,
            fov_y: self.fov.to_radians(),
            near: self.near,
            far: self.far,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        let camera = OrbitCamera::default();
        let limits = OrbitLimits::default();
        let projection = Projection::default();
        Self {
            target: [camera.target.x, camera.target.y, camera.target.z],
            azimuth: camera.azimuth.to_degrees(),
            elevation: camera.elevation.to_degrees(),
            distance: camera.distance,
            min_distance: limits.min_distance,
            max_distance: limits.max_distance,
            rotate_speed: limits.rotate_speed,
            projection: projection.mode,
            fov: projection.fov_y.to_degrees(),
            near: projection.near,
            far: projection.far,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Off-screen target is the window size divided by this
    pub downscale: u32,
    pub clear_color: [f32; 4],
    pub post_clear_color: [f32; 4],
    pub edge_threshold: f32,
    pub grid_radius: i32,
    pub grid_spacing: f32,
    pub grid_twist: f32,
}

impl RenderConfig {
    pub fn instance_grid(&self) -> InstanceGrid {
        InstanceGrid {
            radius: self.grid_radius,
            spacing: self.grid_spacing,
            twist: self.grid_twist,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        let grid = InstanceGrid::default();
        Self {
            downscale: 1,
            clear_color: [0.2, 0.3, 0.3, 1.0],
            post_clear_color: [0.2, 0.3, 0.3, 1.0],
            edge_threshold: 0.2,
            grid_radius: grid.radius,
            grid_spacing: grid.spacing,
            grid_twist: grid.twist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = ViewerConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = ViewerConfig::from_toml(&text, Path::new("meshview.toml")).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let text = r#"
[window]
width = 800

[render]
downscale = 2
"#;
        let config = ViewerConfig::from_toml(text, Path::new("meshview.toml")).unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.target_size(), (400, 360));
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_camera_defaults_match_orbit_defaults() {
        let config = CameraConfig::default();
        let camera = config.orbit_camera();
        assert_relative_eq!(camera.elevation, 0.5, epsilon = 1e-6);
        assert_relative_eq!(camera.distance, 4.0);
        assert_relative_eq!(config.projection().fov_y, 60f32.to_radians(), epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let result = ViewerConfig::from_toml("[window]\nwidth = \"wide\"\n", Path::new("bad.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshview.toml");
        fs::write(&path, "[model]\npath = \"cube.obj\"\nnormalize_normals = false\n").unwrap();
        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.model.path, PathBuf::from("cube.obj"));
        assert!(!config.model.parse_options().normalize_normals);
    }
}
