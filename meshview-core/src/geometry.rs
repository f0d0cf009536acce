//! Geometry primitives produced by the mesh indexer

use std::path::PathBuf;

use nalgebra::{Point3, Vector2, Vector3};

/// A GPU-ready vertex: position, normal and texture coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub texcoord: Vector2<f32>,
}

impl Vertex {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>, texcoord: Vector2<f32>) -> Self {
        Self {
            position,
            normal,
            texcoord,
        }
    }

    /// Flatten into the interleaved `[px, py, pz, nx, ny, nz, u, v]` layout
    pub fn to_array(&self) -> [f32; 8] {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.normal.x,
            self.normal.y,
            self.normal.z,
            self.texcoord.x,
            self.texcoord.y,
        ]
    }
}

/// Surface reflectance parameters read from a material library
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub ambient: Vector3<f32>,
    pub diffuse: Vector3<f32>,
    pub specular: Vector3<f32>,
    pub diffuse_map: Option<PathBuf>,
}

impl Material {
    /// A named material with all reflectance zero and no texture
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl Default for Material {
    /// The implicit material for faces declared before any `usemtl`
    fn default() -> Self {
        Self {
            name: None,
            ambient: Vector3::zeros(),
            diffuse: Vector3::zeros(),
            specular: Vector3::zeros(),
            diffuse_map: None,
        }
    }
}

/// A contiguous slice of the index buffer drawn with one material
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRange {
    pub offset: u32,
    pub count: u32,
    pub material: Material,
}

impl DrawRange {
    /// One past the last index of this range
    pub fn end(&self) -> u32 {
        self.offset + self.count
    }
}

/// Deduplicated vertex/index data partitioned into per-material draw ranges.
///
/// Built once by the indexer and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedMesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    ranges: Vec<DrawRange>,
}

impl IndexedMesh {
    pub(crate) fn from_parts(vertices: Vec<Vertex>, indices: Vec<u32>, ranges: Vec<DrawRange>) -> Self {
        Self {
            vertices,
            indices,
            ranges,
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn ranges(&self) -> &[DrawRange] {
        &self.ranges
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_to_array() {
        let vertex = Vertex::new(
            Point3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector2::new(0.5, 0.25),
        );
        assert_eq!(vertex.to_array(), [1.0, 2.0, 3.0, 0.0, 1.0, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn test_default_material_is_unnamed_and_black() {
        let material = Material::default();
        assert!(material.name.is_none());
        assert_eq!(material.diffuse, Vector3::zeros());
        assert!(material.diffuse_map.is_none());
    }
}
