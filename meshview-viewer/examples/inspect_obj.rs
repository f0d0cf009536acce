//! Example: Parse and index an OBJ file and print what the renderer would draw
//!
//! Usage: cargo run --example inspect_obj -- path/to/model.obj

use std::env;
use std::path::PathBuf;
use std::process;

use log::error;
use meshview_core::{IndexedMesh, ObjDocument, ParseOptions};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/models/basic_model.obj"));

    let document = match ObjDocument::load(&path, &ParseOptions::default()) {
        Ok(document) => document,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };

    println!("{}", path.display());
    println!("  positions:  {}", document.positions().len());
    println!("  normals:    {}", document.normals().len());
    println!("  texcoords:  {}", document.texcoords().len());
    println!("  faces:      {}", document.face_count());
    println!("  materials:  {}", document.materials().len());

    let mesh: IndexedMesh = match document.into_mesh() {
        Ok(mesh) => mesh,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };

    let corners = mesh.indices().len();
    println!(
        "  vertices:   {} unique of {} corners",
        mesh.vertices().len(),
        corners
    );
    println!("  draw ranges:");
    for range in mesh.ranges() {
        let name = range.material.name.as_deref().unwrap_or("<default>");
        let kd = range.material.diffuse;
        println!(
            "    {:<16} indices {:>6}..{:<6} Kd ({:.3}, {:.3}, {:.3})",
            name,
            range.offset,
            range.end(),
            kd.x,
            kd.y,
            kd.z
        );
    }
}
