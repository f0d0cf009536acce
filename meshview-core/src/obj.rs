//! Wavefront OBJ parser for triangle meshes with per-face materials

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, trace};
use nalgebra::{Point3, Vector2, Vector3};
use nom::{
    branch::alt,
    character::complete::{char, i64 as index, space0, space1},
    combinator::{all_consuming, eof, map, opt, peek},
    number::complete::float,
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::error::{LoadError, LoadResult};
use crate::geometry::IndexedMesh;
use crate::indexer;
use crate::mtl::MaterialLibrary;

/// Options controlling how a geometry file is read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseOptions {
    /// Re-normalize `vn` directions to unit length
    pub normalize_normals: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            normalize_normals: true,
        }
    }
}

/// One face corner: 1-based indices into the attribute pools, 0 when absent.
/// Indices are kept as written; range checks happen when the mesh is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Corner {
    pub position: i64,
    pub texcoord: i64,
    pub normal: i64,
}

impl Corner {
    pub fn new(position: i64, texcoord: i64, normal: i64) -> Self {
        Self {
            position,
            texcoord,
            normal,
        }
    }
}

/// A triangular face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Face {
    pub corners: [Corner; 3],
}

/// All faces declared while one material was selected.
/// `material` is `None` for faces before any `usemtl`.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceGroup {
    pub material: Option<String>,
    pub faces: Vec<Face>,
}

/// Raw contents of a geometry file: attribute pools, face groups in
/// first-use order, and the materials its libraries declare
#[derive(Debug, Clone, Default)]
pub struct ObjDocument {
    pub(crate) positions: Vec<Point3<f32>>,
    pub(crate) normals: Vec<Vector3<f32>>,
    pub(crate) texcoords: Vec<Vector2<f32>>,
    pub(crate) groups: Vec<FaceGroup>,
    pub(crate) materials: MaterialLibrary,
}

impl ObjDocument {
    /// Read and parse a geometry file. Material libraries are resolved
    /// relative to the file's directory.
    pub fn load(path: &Path, options: &ParseOptions) -> LoadResult<Self> {
        let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = Self::parse_str(&source, path, options)?;
        info!(
            "loaded {}: {} positions, {} normals, {} texcoords, {} faces in {} groups",
            path.display(),
            document.positions.len(),
            document.normals.len(),
            document.texcoords.len(),
            document.face_count(),
            document.groups.len()
        );
        Ok(document)
    }

    /// Parse geometry text. `path` names the source in errors and anchors
    /// `mtllib` references.
    pub fn parse_str(source: &str, path: &Path, options: &ParseOptions) -> LoadResult<Self> {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut document = Self::default();
        let mut group_slots: HashMap<Option<String>, usize> = HashMap::new();
        let mut current: Option<String> = None;

        for (number, line) in source.lines().enumerate() {
            let line_no = number + 1;
            let Some((directive, value)) = split_directive(line) else {
                continue;
            };

            match directive {
                "mtllib" => {
                    if value.is_empty() {
                        return Err(format_error(path, line_no, "mtllib without a path"));
                    }
                    let library = MaterialLibrary::load(&dir.join(value))?;
                    document.materials.extend(library);
                }
                "usemtl" => {
                    current = if value.is_empty() {
                        None
                    } else {
                        Some(value.to_string())
                    };
                }
                "v" => {
                    let position = parse_value(vector3, value, path, line_no, "vertex position")?;
                    document.positions.push(Point3::from(position));
                }
                "vn" => {
                    let mut normal = parse_value(vector3, value, path, line_no, "vertex normal")?;
                    if options.normalize_normals {
                        normal = normal.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros);
                    }
                    document.normals.push(normal);
                }
                "vt" => {
                    let texcoord = parse_value(vector2, value, path, line_no, "texture coordinate")?;
                    document.texcoords.push(texcoord);
                }
                "f" => {
                    let face = parse_face(value, path, line_no)?;
                    let slot = *group_slots.entry(current.clone()).or_insert_with(|| {
                        document.groups.push(FaceGroup {
                            material: current.clone(),
                            faces: Vec::new(),
                        });
                        document.groups.len() - 1
                    });
                    document.groups[slot].faces.push(face);
                }
                other => trace!("{}:{}: ignoring `{}`", path.display(), line_no, other),
            }
        }

        Ok(document)
    }

    pub fn positions(&self) -> &[Point3<f32>] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vector3<f32>] {
        &self.normals
    }

    pub fn texcoords(&self) -> &[Vector2<f32>] {
        &self.texcoords
    }

    pub fn groups(&self) -> &[FaceGroup] {
        &self.groups
    }

    pub fn materials(&self) -> &MaterialLibrary {
        &self.materials
    }

    pub fn face_count(&self) -> usize {
        self.groups.iter().map(|g| g.faces.len()).sum()
    }

    /// Consume the document and build the deduplicated, GPU-ready mesh
    pub fn into_mesh(self) -> LoadResult<IndexedMesh> {
        indexer::build_mesh(self)
    }
}

/// Load, parse and index a geometry file in one step
pub fn load_mesh(path: &Path, options: &ParseOptions) -> LoadResult<IndexedMesh> {
    ObjDocument::load(path, options)?.into_mesh()
}

/// Split a line into its directive keyword and the trimmed remainder.
/// Blank lines yield `None`.
pub(crate) fn split_directive(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(|c: char| c.is_whitespace()) {
        Some((directive, value)) => Some((directive, value.trim())),
        None => Some((line, "")),
    }
}

pub(crate) fn format_error(path: &Path, line: usize, message: impl Into<String>) -> LoadError {
    LoadError::Format {
        path: PathBuf::from(path),
        line,
        message: message.into(),
    }
}

/// Run a nom parser over a directive value, mapping failure to a format error
pub(crate) fn parse_value<'a, T>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
    value: &'a str,
    path: &Path,
    line: usize,
    what: &str,
) -> LoadResult<T> {
    let mut parser = parser;
    parser(value)
        .map(|(_, parsed)| parsed)
        .map_err(|_| format_error(path, line, format!("unable to parse {} from {:?}", what, value)))
}

/// A single float component, delimited by whitespace or end of input
fn component(input: &str) -> IResult<&str, f32> {
    preceded(space0, terminated(float, peek(alt((space1, eof)))))(input)
}

/// Leading three components; anything after them is ignored
pub(crate) fn vector3(input: &str) -> IResult<&str, Vector3<f32>> {
    map(tuple((component, component, component)), |(x, y, z)| Vector3::new(x, y, z))(input)
}

/// Leading two components; anything after them is ignored
pub(crate) fn vector2(input: &str) -> IResult<&str, Vector2<f32>> {
    map(tuple((component, component)), |(u, v)| Vector2::new(u, v))(input)
}

/// `pos`, `pos/tex`, `pos//norm` or `pos/tex/norm`
fn corner(input: &str) -> IResult<&str, Corner> {
    let (input, position) = index(input)?;
    let (input, texcoord) = opt(preceded(char('/'), opt(index)))(input)?;
    let (input, normal) = opt(preceded(char('/'), opt(index)))(input)?;
    Ok((
        input,
        Corner::new(
            position,
            texcoord.flatten().unwrap_or(0),
            normal.flatten().unwrap_or(0),
        ),
    ))
}

fn parse_face(value: &str, path: &Path, line: usize) -> LoadResult<Face> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(format_error(
            path,
            line,
            format!("face has {} corners, only triangles are supported", tokens.len()),
        ));
    }

    let mut corners = [Corner::default(); 3];
    for (slot, token) in corners.iter_mut().zip(tokens) {
        *slot = all_consuming(corner)(token)
            .map(|(_, parsed)| parsed)
            .map_err(|_| format_error(path, line, format!("malformed face corner {:?}", token)))?;
    }
    Ok(Face { corners })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn parse(source: &str) -> LoadResult<ObjDocument> {
        ObjDocument::parse_str(source, Path::new("test.obj"), &ParseOptions::default())
    }

    #[test]
    fn test_parse_attribute_pools() {
        let doc = parse("v 1 2 3\nv 4.5 -5 6e1\nvn 0 0 2\nvt 0.25 0.75\n").unwrap();
        assert_eq!(doc.positions().len(), 2);
        assert_relative_eq!(doc.positions()[1], Point3::new(4.5, -5.0, 60.0));
        assert_relative_eq!(doc.normals()[0], Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(doc.texcoords()[0], Vector2::new(0.25, 0.75));
    }

    #[test]
    fn test_normals_kept_when_normalization_disabled() {
        let options = ParseOptions {
            normalize_normals: false,
        };
        let doc = ObjDocument::parse_str("vn 0 3 4\nvn 0 0 0\n", Path::new("t.obj"), &options).unwrap();
        assert_relative_eq!(doc.normals()[0], Vector3::new(0.0, 3.0, 4.0));

        let doc = parse("vn 0 3 4\nvn 0 0 0\n").unwrap();
        assert_relative_eq!(doc.normals()[0], Vector3::new(0.0, 0.6, 0.8));
        assert_eq!(doc.normals()[1], Vector3::zeros());
    }

    #[test]
    fn test_extra_components_are_ignored() {
        let doc = parse("v 1 2 3 1.0\nvt 0.5 0.5 0.0\n").unwrap();
        assert_relative_eq!(doc.positions()[0], Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(doc.texcoords()[0], Vector2::new(0.5, 0.5));
    }

    #[test]
    fn test_face_corner_forms() {
        let doc = parse("f 1 2/3 4//5\nf 6/7/8 9/10/ 11//\n").unwrap();
        let faces = &doc.groups()[0].faces;
        assert_eq!(
            faces[0].corners,
            [Corner::new(1, 0, 0), Corner::new(2, 3, 0), Corner::new(4, 0, 5)]
        );
        assert_eq!(
            faces[1].corners,
            [Corner::new(6, 7, 8), Corner::new(9, 10, 0), Corner::new(11, 0, 0)]
        );
    }

    #[test]
    fn test_signed_and_wide_indices_are_kept_for_indexing() {
        let doc = parse("f -1 1//-2 4294967296 \n").unwrap();
        assert_eq!(
            doc.groups()[0].faces[0].corners,
            [Corner::new(-1, 0, 0), Corner::new(1, 0, -2), Corner::new(4294967296, 0, 0)]
        );
    }

    #[test]
    fn test_quad_face_is_rejected() {
        match parse("v 0 0 0\nf 1 2 3 4\n") {
            Err(LoadError::Format { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("4 corners"));
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_values_are_format_errors() {
        assert!(matches!(parse("v 1 2\n"), Err(LoadError::Format { .. })));
        assert!(matches!(parse("v 1 2 x\n"), Err(LoadError::Format { .. })));
        assert!(matches!(parse("vn 1 2 3abc\n"), Err(LoadError::Format { .. })));
        assert!(matches!(parse("f 1/2/3/4 1 1\n"), Err(LoadError::Format { .. })));
        assert!(matches!(parse("f /1 2 3\n"), Err(LoadError::Format { .. })));
        assert!(matches!(parse("f 1.5 1 1\n"), Err(LoadError::Format { .. })));
    }

    #[test]
    fn test_unknown_directives_and_comments_are_ignored() {
        let doc = parse("# comment\no cube\ng side\ns off\n\nv 0 0 0\n").unwrap();
        assert_eq!(doc.positions().len(), 1);
        assert!(doc.groups().is_empty());
    }

    #[test]
    fn test_face_groups_keep_first_use_order() {
        let doc = parse("f 1 1 1\nusemtl B\nf 1 1 1\nusemtl A\nf 1 1 1\nusemtl B\nf 1 1 1\n").unwrap();
        let names: Vec<Option<&str>> = doc.groups().iter().map(|g| g.material.as_deref()).collect();
        assert_eq!(names, vec![None, Some("B"), Some("A")]);
        assert_eq!(doc.groups()[1].faces.len(), 2);
        assert_eq!(doc.face_count(), 4);
    }

    #[test]
    fn test_load_resolves_material_library() {
        let dir = tempfile::tempdir().unwrap();
        let mut mtl = fs::File::create(dir.path().join("scene.mtl")).unwrap();
        writeln!(mtl, "newmtl M\nKd 0.2 0.4 0.6").unwrap();
        let obj_path = dir.path().join("scene.obj");
        fs::write(&obj_path, "mtllib scene.mtl\nusemtl M\nv 0 0 0\nf 1 1 1\n").unwrap();

        let doc = ObjDocument::load(&obj_path, &ParseOptions::default()).unwrap();
        let material = doc.materials().get("M").unwrap();
        assert_relative_eq!(material.diffuse, Vector3::new(0.2, 0.4, 0.6));
    }

    #[test]
    fn test_later_material_library_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.mtl"),
            "newmtl M\nKd 1 0 0\nnewmtl N\nKd 0 1 0\n",
        )
        .unwrap();
        fs::write(dir.path().join("override.mtl"), "newmtl M\nKd 0 0 1\n").unwrap();
        let obj_path = dir.path().join("scene.obj");
        fs::write(
            &obj_path,
            "mtllib base.mtl\nmtllib override.mtl\nv 0 0 0\nusemtl M\nf 1 1 1\nusemtl N\nf 1 1 1\n",
        )
        .unwrap();

        let doc = ObjDocument::load(&obj_path, &ParseOptions::default()).unwrap();
        assert_eq!(doc.materials().len(), 2);
        assert_relative_eq!(doc.materials().get("M").unwrap().diffuse, Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(doc.materials().get("N").unwrap().diffuse, Vector3::new(0.0, 1.0, 0.0));

        let mesh = doc.into_mesh().unwrap();
        assert_relative_eq!(mesh.ranges()[0].material.diffuse, Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(mesh.ranges()[1].material.diffuse, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_missing_material_library_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let obj_path = dir.path().join("scene.obj");
        fs::write(&obj_path, "mtllib nowhere.mtl\n").unwrap();
        assert!(matches!(
            ObjDocument::load(&obj_path, &ParseOptions::default()),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_mesh(Path::new("/nonexistent/meshview/model.obj"), &ParseOptions::default());
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }
}
