//! Material library (MTL) parser

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};

use crate::error::{LoadError, LoadResult};
use crate::geometry::Material;
use crate::obj::{format_error, parse_value, split_directive, vector3};

/// Materials declared by one or more MTL files, keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialLibrary {
    materials: HashMap<String, Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a material library from disk
    pub fn load(path: &Path) -> LoadResult<Self> {
        let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&source, path)
    }

    /// Parse material library text. `path` names the file in errors and
    /// anchors relative texture paths.
    pub fn parse_str(source: &str, path: &Path) -> LoadResult<Self> {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut library = Self::new();
        let mut current: Option<String> = None;

        for (number, line) in source.lines().enumerate() {
            let line_no = number + 1;
            let Some((directive, value)) = split_directive(line) else {
                continue;
            };

            match directive {
                "newmtl" => {
                    if value.is_empty() {
                        return Err(format_error(path, line_no, "newmtl without a name"));
                    }
                    library.insert(Material::named(value));
                    current = Some(value.to_string());
                }
                "Ka" | "Kd" | "Ks" | "map_Kd" => {
                    let Some(material) = current.as_ref().and_then(|name| library.materials.get_mut(name)) else {
                        warn!(
                            "{}:{}: `{}` before any newmtl, ignored",
                            path.display(),
                            line_no,
                            directive
                        );
                        continue;
                    };
                    match directive {
                        "Ka" => material.ambient = parse_value(vector3, value, path, line_no, "ambient color")?,
                        "Kd" => material.diffuse = parse_value(vector3, value, path, line_no, "diffuse color")?,
                        "Ks" => material.specular = parse_value(vector3, value, path, line_no, "specular color")?,
                        _ => {
                            if value.is_empty() {
                                return Err(format_error(path, line_no, "map_Kd without a path"));
                            }
                            material.diffuse_map = Some(dir.join(value));
                        }
                    }
                }
                _ => {}
            }
        }

        debug!("parsed {} materials from {}", library.len(), path.display());
        Ok(library)
    }

    /// Add or replace a material under its name
    pub fn insert(&mut self, material: Material) {
        if let Some(name) = material.name.clone() {
            self.materials.insert(name, material);
        }
    }

    /// Merge another library into this one; later definitions win
    pub fn extend(&mut self, other: MaterialLibrary) {
        self.materials.extend(other.materials);
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
