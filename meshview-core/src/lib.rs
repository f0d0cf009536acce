//! meshview core library - mesh import, indexing and off-screen rendering
//!
//! Parses Wavefront OBJ/MTL text into a deduplicated, material-partitioned
//! mesh, and drives a two-pass renderer (geometry into a multi-attachment
//! render target, then a full-screen post-process) through the
//! [`RenderDevice`] and [`ShadingProgram`] traits.

pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod geometry;
pub mod indexer;
pub mod mesh_buffer;
pub mod mtl;
pub mod obj;
pub mod passes;
pub mod transform;

// Re-export commonly used types
pub use camera::{OrbitCamera, OrbitLimits, OrbitState, PointerEvent, Projection, ProjectionMode};
pub use config::{ConfigError, ViewerConfig};
pub use device::{
    AttachmentDef, AttachmentKind, AttachmentSlot, ClearValues, RenderDevice, ShadingProgram,
    TargetStatus, TextureFormat,
};
pub use error::{AttributePool, DeviceError, FrameBufferError, LoadError, LoadResult};
pub use framebuffer::RenderTarget;
pub use geometry::{DrawRange, IndexedMesh, Material, Vertex};
pub use mesh_buffer::MeshBuffer;
pub use mtl::MaterialLibrary;
pub use obj::{load_mesh, Corner, Face, FaceGroup, ObjDocument, ParseOptions};
pub use passes::{geometry_pass, post_process_pass, SceneView, TextureInput, GBUFFER_INPUTS};
pub use transform::{InstanceGrid, Transform};
