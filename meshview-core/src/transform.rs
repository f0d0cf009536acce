//! Model transforms for placing mesh instances in the scene

use nalgebra::{Matrix4, Vector3};

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Create a translation matrix
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// Rotation about the +Y axis, in radians
    pub fn rotation_y(angle: f32) -> Matrix4<f32> {
        Matrix4::new_rotation(Vector3::new(0.0, angle, 0.0))
    }
}

/// A square grid of mesh instances on the XZ plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceGrid {
    /// Cells on each side of the center cell
    pub radius: i32,
    pub spacing: f32,
    /// Yaw added per unit of (x + z) cell offset
    pub twist: f32,
}

impl InstanceGrid {
    /// Model matrices, row by row along Z. Each instance is translated to its
    /// cell and then turned about its own origin.
    pub fn model_matrices(&self) -> Vec<Matrix4<f32>> {
        let side = (2 * self.radius + 1).max(0) as usize;
        let mut models = Vec::with_capacity(side * side);
        for z in -self.radius..=self.radius {
            for x in -self.radius..=self.radius {
                let translation =
                    Transform::translation_matrix(self.spacing * x as f32, 0.0, self.spacing * z as f32);
                models.push(translation * Transform::rotation_y((x + z) as f32 * self.twist));
            }
        }
        models
    }
}

impl Default for InstanceGrid {
    fn default() -> Self {
        Self {
            radius: 1,
            spacing: 15.0,
            twist: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_identity_rotation() {
        let matrix = Transform::rotation_y(0.0);
        assert!((matrix - Matrix4::identity()).norm() < 1e-6);
    }

    #[test]
    fn test_default_grid_is_three_by_three() {
        let models = InstanceGrid::default().model_matrices();
        assert_eq!(models.len(), 9);

        // center cell is untouched
        assert!((models[4] - Matrix4::identity()).norm() < 1e-6);

        // first cell sits at (-15, 0, -15)
        let origin = models[0].transform_point(&Point3::origin());
        assert_relative_eq!(origin, Point3::new(-15.0, 0.0, -15.0), epsilon = 1e-5);
    }

    #[test]
    fn test_instances_rotate_about_their_own_origin() {
        let grid = InstanceGrid {
            radius: 1,
            spacing: 10.0,
            twist: std::f32::consts::FRAC_PI_2,
        };
        let models = grid.model_matrices();
        // cell (x=1, z=0): quarter turn, so local +X maps to world -Z
        let p = models[5].transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(10.0, 0.0, -1.0), epsilon = 1e-5);
    }
}
