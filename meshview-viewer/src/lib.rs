//! Interactive viewer for the meshview renderer.
//!
//! Backs the core `RenderDevice` and `ShadingProgram` traits with wgpu and
//! drives them from a winit event loop.

pub mod app;
pub mod error;
pub mod gpu;
pub mod program;
pub mod recorder;

pub use app::{run, ViewerApp};
pub use error::{ViewerError, ViewerResult};
pub use gpu::{GpuContext, WgpuDevice};
pub use program::{ProgramDesc, WgslProgram};
