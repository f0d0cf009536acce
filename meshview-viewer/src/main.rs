//! meshview - OBJ viewer with an edge-detection post pass
//!
//! Usage: meshview [config.toml]
//!
//! Without an argument, `meshview.toml` in the working directory is used when
//! present, otherwise built-in defaults.
//! Controls:
//!   - Drag: orbit
//!   - Scroll: zoom
//!   - Space: reload the model
//!   - S: reload shaders
//!   - Esc: quit

use std::path::{Path, PathBuf};
use std::process;

use log::{error, info};
use meshview_core::{ConfigError, ViewerConfig};

const DEFAULT_CONFIG: &str = "meshview.toml";

fn load_config() -> Result<ViewerConfig, ConfigError> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => ViewerConfig::load(&path),
        None if Path::new(DEFAULT_CONFIG).exists() => ViewerConfig::load(Path::new(DEFAULT_CONFIG)),
        None => {
            info!("no {} found, using defaults", DEFAULT_CONFIG);
            Ok(ViewerConfig::default())
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = load_config()
        .map_err(meshview_viewer::ViewerError::from)
        .and_then(meshview_viewer::run);
    if let Err(err) = result {
        error!("{}", err);
        process::exit(1);
    }
}
