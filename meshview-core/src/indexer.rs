//! Converts parsed face groups into a single deduplicated vertex buffer, a flat
//! triangle index buffer and per-material draw ranges.

use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{Vector2, Vector3};

use crate::error::{AttributePool, LoadError, LoadResult};
use crate::geometry::{DrawRange, IndexedMesh, Material, Vertex};
use crate::obj::{Corner, ObjDocument};

/// Build the GPU-ready mesh from a parsed document.
///
/// Corners referencing the same (position, texcoord, normal) index triple
/// share one output vertex across the whole mesh.
pub fn build_mesh(document: ObjDocument) -> LoadResult<IndexedMesh> {
    let ObjDocument {
        positions,
        normals,
        texcoords,
        groups,
        materials,
    } = document;

    let mut vertices: Vec<Vertex> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut ranges: Vec<DrawRange> = Vec::with_capacity(groups.len());
    let mut seen: HashMap<Corner, u32> = HashMap::new();

    for group in groups {
        let offset = indices.len() as u32;

        for face in &group.faces {
            for corner in &face.corners {
                let slot = match seen.get(corner) {
                    Some(&slot) => slot,
                    None => {
                        let position = *lookup(&positions, corner.position, AttributePool::Position)?;
                        let normal = match corner.normal {
                            0 => Vector3::zeros(),
                            n => *lookup(&normals, n, AttributePool::Normal)?,
                        };
                        let texcoord = match corner.texcoord {
                            0 => Vector2::zeros(),
                            t => *lookup(&texcoords, t, AttributePool::TexCoord)?,
                        };

                        let slot = vertices.len() as u32;
                        vertices.push(Vertex::new(position, normal, texcoord));
                        seen.insert(*corner, slot);
                        slot
                    }
                };
                indices.push(slot);
            }
        }

        let material = match group.material {
            None => Material::default(),
            Some(name) => match materials.get(&name) {
                Some(material) => material.clone(),
                None => {
                    warn!("material `{}` is not declared in any library, using defaults", name);
                    Material::named(name)
                }
            },
        };

        ranges.push(DrawRange {
            offset,
            count: indices.len() as u32 - offset,
            material,
        });
    }

    debug!(
        "indexed {} vertices, {} indices, {} draw ranges",
        vertices.len(),
        indices.len(),
        ranges.len()
    );
    Ok(IndexedMesh::from_parts(vertices, indices, ranges))
}

/// Resolve a 1-based index into a pool. Zero, negative and oversized
/// indices are all out of range.
fn lookup<T>(pool: &[T], index: i64, kind: AttributePool) -> LoadResult<&T> {
    usize::try_from(index)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| pool.get(i))
        .ok_or(LoadError::Index {
            pool: kind,
            index,
            len: pool.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::ParseOptions;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::path::Path;

    fn index(source: &str) -> LoadResult<IndexedMesh> {
        ObjDocument::parse_str(source, Path::new("test.obj"), &ParseOptions::default())?.into_mesh()
    }

    #[test]
    fn test_empty_document_yields_empty_mesh() {
        let mesh = index("v 0 0 0\nv 1 0 0\nvn 0 1 0\n").unwrap();
        assert!(mesh.vertices().is_empty());
        assert!(mesh.indices().is_empty());
        assert!(mesh.ranges().is_empty());
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_two_faces_sharing_an_edge() {
        let mesh = index(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             usemtl M\n\
             f 1 2 3\nf 1 3 4\n",
        )
        .unwrap();

        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.ranges().len(), 1);

        let range = &mesh.ranges()[0];
        assert_eq!(range.offset, 0);
        assert_eq!(range.count, 6);
        assert_eq!(range.material.name.as_deref(), Some("M"));
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_dedup_is_by_index_triple_across_groups() {
        let mesh = index(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nvt 0 0\n\
             usemtl A\nf 1/1/1 2/1/1 3/1/1\n\
             usemtl B\nf 1/1/1 2/1/1 3//1\n\
             usemtl A\nf 3/1/1 2/1/1 1/1/1\n",
        )
        .unwrap();

        // 3//1 differs from 3/1/1 by its texcoord index only
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 1, 0, 0, 1, 3]);
        assert_eq!(mesh.ranges()[0].material.name.as_deref(), Some("A"));
        assert_eq!(mesh.ranges()[1].material.name.as_deref(), Some("B"));
    }

    #[test]
    fn test_same_values_different_indices_are_distinct_vertices() {
        let mesh = index("v 0 0 0\nv 0 0 0\nv 1 0 0\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.vertices().len(), 3);
    }

    #[test]
    fn test_ranges_are_contiguous_and_cover_the_index_buffer() {
        let mesh = index(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             f 1 2 3\n\
             usemtl X\nf 1 2 3\nf 3 2 1\n\
             usemtl Y\nf 2 3 1\n",
        )
        .unwrap();

        let mut expected_offset = 0;
        for range in mesh.ranges() {
            assert_eq!(range.offset, expected_offset);
            expected_offset = range.end();
        }
        let total: u32 = mesh.ranges().iter().map(|r| r.count).sum();
        assert_eq!(total as usize, mesh.indices().len());
        assert_eq!(
            mesh.ranges().iter().map(|r| r.count).collect::<Vec<_>>(),
            vec![3, 6, 3]
        );
        assert!(mesh.ranges()[0].material.name.is_none());
    }

    #[test]
    fn test_missing_normal_resolves_to_zero() {
        let mesh = index("v 1 2 3\nvt 0.5 0.25\nvn 0 1 0\nf 1/1 1/1 1/1\n").unwrap();
        assert_eq!(mesh.vertices().len(), 1);
        let vertex = mesh.vertices()[0];
        assert_relative_eq!(vertex.position, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(vertex.normal, Vector3::zeros());
        assert_relative_eq!(vertex.texcoord, Vector2::new(0.5, 0.25));
    }

    #[test]
    fn test_missing_texcoord_resolves_to_zero() {
        let mesh = index("v 1 2 3\nvn 0 1 0\nf 1//1 1//1 1//1\n").unwrap();
        let vertex = mesh.vertices()[0];
        assert_eq!(vertex.texcoord, Vector2::zeros());
        assert_relative_eq!(vertex.normal, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_out_of_range_indices_fail() {
        match index("v 0 0 0\nf 1 2 1\n") {
            Err(LoadError::Index { pool, index, len }) => {
                assert_eq!(pool, AttributePool::Position);
                assert_eq!(index, 2);
                assert_eq!(len, 1);
            }
            other => panic!("expected index error, got {:?}", other),
        }
        assert!(matches!(
            index("v 0 0 0\nf 0 1 1\n"),
            Err(LoadError::Index { pool: AttributePool::Position, .. })
        ));
        assert!(matches!(
            index("v 0 0 0\nf 1//3 1 1\n"),
            Err(LoadError::Index { pool: AttributePool::Normal, .. })
        ));
        assert!(matches!(
            index("v 0 0 0\nvt 0 0\nf 1/2 1 1\n"),
            Err(LoadError::Index { pool: AttributePool::TexCoord, .. })
        ));
    }

    #[test]
    fn test_negative_and_overflowing_indices_fail() {
        match index("v 0 0 0\nf -1 1 1\n") {
            Err(LoadError::Index { pool, index, len }) => {
                assert_eq!(pool, AttributePool::Position);
                assert_eq!(index, -1);
                assert_eq!(len, 1);
            }
            other => panic!("expected index error, got {:?}", other),
        }
        assert!(matches!(
            index("v 0 0 0\nvn 0 1 0\nf 1//-2 1 1\n"),
            Err(LoadError::Index { pool: AttributePool::Normal, index: -2, .. })
        ));
        assert!(matches!(
            index("v 0 0 0\nf 4294967296 1 1\n"),
            Err(LoadError::Index { pool: AttributePool::Position, index: 4294967296, .. })
        ));
    }

    #[test]
    fn test_declared_material_is_resolved() {
        let mut document =
            ObjDocument::parse_str("v 0 0 0\nusemtl Shiny\nf 1 1 1\n", Path::new("t.obj"), &ParseOptions::default())
                .unwrap();
        let mut shiny = Material::named("Shiny");
        shiny.specular = Vector3::new(1.0, 1.0, 1.0);
        document.materials.insert(shiny.clone());

        let mesh = document.into_mesh().unwrap();
        assert_eq!(mesh.ranges()[0].material, shiny);
    }
}
