//! Orbit camera, projection and pointer-driven camera control

use std::f32::consts::PI;

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Projection mode for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    Orthographic,
    Perspective,
}

/// Camera circling a target point at a given distance.
/// Angles are in radians; elevation is measured from the +Y axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    pub target: Point3<f32>,
    pub azimuth: f32,
    pub elevation: f32,
    pub distance: f32,
}

impl OrbitCamera {
    pub fn new(target: Point3<f32>, azimuth: f32, elevation: f32, distance: f32) -> Self {
        Self {
            target,
            azimuth,
            elevation,
            distance,
        }
    }

    /// World-space eye position
    pub fn eye(&self) -> Point3<f32> {
        let direction = Vector3::new(
            self.elevation.sin() * self.azimuth.cos(),
            self.elevation.cos(),
            self.elevation.sin() * self.azimuth.sin(),
        );
        self.target + direction * self.distance
    }

    /// Create the view matrix (camera transformation)
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.eye(), &self.target, &Vector3::y())
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(Point3::new(0.0, 0.5, 0.0), 0.0, 0.5, 4.0)
    }
}

/// Projection parameters; `fov_y` in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub mode: ProjectionMode,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    /// Create the projection matrix (OpenGL clip conventions, depth in [-1, 1]).
    /// `extent` sizes the orthographic view volume vertically.
    pub fn matrix(&self, aspect: f32, extent: f32) -> Matrix4<f32> {
        match self.mode {
            ProjectionMode::Perspective => Matrix4::new_perspective(aspect, self.fov_y, self.near, self.far),
            ProjectionMode::Orthographic => {
                let height = extent;
                let width = height * aspect;
                Matrix4::new_orthographic(
                    -width / 2.0,
                    width / 2.0,
                    -height / 2.0,
                    height / 2.0,
                    self.near,
                    self.far,
                )
            }
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            mode: ProjectionMode::Perspective,
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Pointer input relevant to the orbit camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Primary button pressed or released
    Button { pressed: bool },
    /// Cursor moved to window coordinates
    Moved { x: f64, y: f64 },
    /// Wheel scrolled by `delta` lines, positive away from the user
    Scroll { delta: f32 },
}

/// Orbit speed and clamping ranges
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitLimits {
    /// Radians per pixel of drag
    pub rotate_speed: f32,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitLimits {
    fn default() -> Self {
        Self {
            rotate_speed: 0.01,
            min_elevation: 0.001,
            max_elevation: PI,
            min_distance: 1.0,
            max_distance: 100.0,
        }
    }
}

/// Camera plus the pointer state needed to interpret drags
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitState {
    pub camera: OrbitCamera,
    pub dragging: bool,
    pub last_cursor: (i32, i32),
}

impl OrbitState {
    pub fn new(camera: OrbitCamera) -> Self {
        Self {
            camera,
            dragging: false,
            last_cursor: (0, 0),
        }
    }

    /// Fold one pointer event into the state
    pub fn apply(self, event: PointerEvent, limits: &OrbitLimits) -> Self {
        let mut next = self;
        match event {
            PointerEvent::Button { pressed } => next.dragging = pressed,
            PointerEvent::Moved { x, y } => {
                let cursor = (x as i32, y as i32);
                if self.dragging {
                    let dx = (self.last_cursor.0 - cursor.0) as f32;
                    let dy = (self.last_cursor.1 - cursor.1) as f32;
                    next.camera.azimuth -= dx * limits.rotate_speed;
                    next.camera.elevation = (next.camera.elevation + dy * limits.rotate_speed)
                        .clamp(limits.min_elevation, limits.max_elevation);
                }
                next.last_cursor = cursor;
            }
            PointerEvent::Scroll { delta } => {
                next.camera.distance =
                    (next.camera.distance - delta).clamp(limits.min_distance, limits.max_distance);
            }
        }
        next
    }
}
