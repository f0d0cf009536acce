//! Device-resident mesh drawn one material range at a time.

use std::path::Path;

use log::debug;

use crate::device::{RenderDevice, ShadingProgram};
use crate::error::LoadResult;
use crate::geometry::{DrawRange, IndexedMesh};
use crate::obj::{load_mesh, ParseOptions};

/// Uploaded vertex/index buffers plus the draw ranges that partition them.
///
/// Immutable once built. Reloading means building a new buffer and replacing
/// this one after the new one exists.
pub struct MeshBuffer<D: RenderDevice> {
    geometry: D::Geometry,
    ranges: Vec<DrawRange>,
    vertex_count: usize,
    index_count: usize,
}

impl<D: RenderDevice> MeshBuffer<D> {
    /// Upload `mesh` to the device
    pub fn new(device: &mut D, mesh: IndexedMesh) -> Self {
        let geometry = device.upload_geometry(mesh.vertices(), mesh.indices());
        debug!(
            "uploaded mesh: {} vertices, {} indices, {} ranges",
            mesh.vertices().len(),
            mesh.indices().len(),
            mesh.ranges().len()
        );
        Self {
            geometry,
            vertex_count: mesh.vertices().len(),
            index_count: mesh.indices().len(),
            ranges: mesh.ranges().to_vec(),
        }
    }

    /// Parse, index and upload `path`, then replace `current` with the
    /// result. Any load error returns before the device is touched and
    /// leaves `current` as it was.
    pub fn reload(
        device: &mut D,
        path: &Path,
        options: &ParseOptions,
        current: &mut Option<MeshBuffer<D>>,
    ) -> LoadResult<()> {
        let mesh = load_mesh(path, options)?;
        *current = Some(Self::new(device, mesh));
        Ok(())
    }

    /// Issue one indexed draw per material range, pushing the range's
    /// `Ka`/`Kd`/`Ks` to `program` first. `program` must be in use.
    pub fn draw<P: ShadingProgram>(&self, device: &mut D, program: &P) {
        device.bind_geometry(Some(&self.geometry));
        for range in &self.ranges {
            program.set_vec3("Ka", &range.material.ambient);
            program.set_vec3("Kd", &range.material.diffuse);
            program.set_vec3("Ks", &range.material.specular);
            device.draw_indexed(range.offset..range.end());
        }
        device.bind_geometry(None);
    }

    pub fn ranges(&self) -> &[DrawRange] {
        &self.ranges
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{Call, RecordingDevice, RecordingProgram};
    use crate::geometry::Material;
    use crate::obj::{ObjDocument, ParseOptions};
    use nalgebra::Vector3;
    use std::path::Path;

    fn mesh(source: &str) -> IndexedMesh {
        ObjDocument::parse_str(source, Path::new("test.obj"), &ParseOptions::default())
            .unwrap()
            .into_mesh()
            .unwrap()
    }

    #[test]
    fn test_upload_once() {
        let mut device = RecordingDevice::new();
        let buffer = MeshBuffer::new(&mut device, mesh("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n"));
        assert_eq!(buffer.vertex_count(), 3);
        assert_eq!(buffer.index_count(), 3);
        assert_eq!(
            device.calls(),
            vec![Call::Upload {
                id: 1,
                vertices: 3,
                indices: 3
            }]
        );
    }

    #[test]
    fn test_draw_pushes_material_before_each_range() {
        let mut device = RecordingDevice::new();
        let program = RecordingProgram::new("geometry", &device);
        let mut doc = ObjDocument::parse_str(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             usemtl A\nf 1 2 3\nf 3 2 1\n\
             usemtl B\nf 2 3 1\n",
            Path::new("test.obj"),
            &ParseOptions::default(),
        )
        .unwrap();
        let mut red = Material::named("A");
        red.diffuse = Vector3::new(1.0, 0.0, 0.0);
        doc.materials.insert(red);
        let indexed = doc.into_mesh().unwrap();

        let buffer = MeshBuffer::new(&mut device, indexed);
        device.calls.borrow_mut().clear();
        buffer.draw(&mut device, &program);

        assert_eq!(
            device.calls(),
            vec![
                Call::BindGeometry(Some(1)),
                Call::SetVec3("Ka".into(), [0.0, 0.0, 0.0]),
                Call::SetVec3("Kd".into(), [1.0, 0.0, 0.0]),
                Call::SetVec3("Ks".into(), [0.0, 0.0, 0.0]),
                Call::DrawIndexed(0..6),
                Call::SetVec3("Ka".into(), [0.0, 0.0, 0.0]),
                Call::SetVec3("Kd".into(), [0.0, 0.0, 0.0]),
                Call::SetVec3("Ks".into(), [0.0, 0.0, 0.0]),
                Call::DrawIndexed(6..9),
                Call::BindGeometry(None),
            ]
        );
    }

    #[test]
    fn test_empty_mesh_draws_nothing() {
        let mut device = RecordingDevice::new();
        let program = RecordingProgram::new("geometry", &device);
        let buffer = MeshBuffer::new(&mut device, mesh("v 0 0 0\n"));
        buffer.draw(&mut device, &program);
        assert_eq!(device.count(|c| matches!(c, Call::DrawIndexed(_))), 0);
        assert!(buffer.ranges().is_empty());
    }

    #[test]
    fn test_reload_replaces_the_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let mut device = RecordingDevice::new();
        let mut current = None;
        MeshBuffer::reload(&mut device, &path, &ParseOptions::default(), &mut current).unwrap();
        assert_eq!(current.as_ref().map(MeshBuffer::index_count), Some(3));

        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 2 4 3\n").unwrap();
        MeshBuffer::reload(&mut device, &path, &ParseOptions::default(), &mut current).unwrap();
        assert_eq!(current.as_ref().map(MeshBuffer::index_count), Some(6));
        assert_eq!(device.count(|c| matches!(c, Call::Upload { .. })), 2);
    }

    #[test]
    fn test_failed_reload_keeps_the_previous_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let mut device = RecordingDevice::new();
        let mut current = None;
        MeshBuffer::reload(&mut device, &path, &ParseOptions::default(), &mut current).unwrap();
        device.calls.borrow_mut().clear();

        for broken in ["v 0 0 0\nf 1 2 3 4\n", "v 0 0 x\n", "v 0 0 0\nf 1 2 9\n"] {
            std::fs::write(&path, broken).unwrap();
            let result = MeshBuffer::reload(&mut device, &path, &ParseOptions::default(), &mut current);
            assert!(result.is_err());
        }
        assert!(MeshBuffer::reload(
            &mut device,
            &dir.path().join("missing.obj"),
            &ParseOptions::default(),
            &mut current
        )
        .is_err());

        let kept = current.as_ref().unwrap();
        assert_eq!(kept.vertex_count(), 3);
        assert_eq!(kept.index_count(), 3);
        assert!(device.calls().is_empty());
    }
}
