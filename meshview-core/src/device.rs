//! Graphics device abstraction
//!
//! The mesh buffer, render target and pass orchestration are written against
//! these traits. The viewer implements them on top of wgpu; tests use a
//! recording double. All calls happen on the thread that owns the context.

use std::ops::Range;

use nalgebra::{Matrix4, Vector3};

use crate::geometry::Vertex;

/// Texel formats an image can be allocated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgb8,
    Rgba8,
    Depth24,
    Depth24Stencil8,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth24 | TextureFormat::Depth24Stencil8)
    }
}

/// Whether an attachment receives color output or depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Color,
    Depth,
}

/// One attachment requested at render target construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDef {
    pub kind: AttachmentKind,
    pub format: TextureFormat,
}

impl AttachmentDef {
    pub fn color(format: TextureFormat) -> Self {
        Self {
            kind: AttachmentKind::Color,
            format,
        }
    }

    pub fn depth(format: TextureFormat) -> Self {
        Self {
            kind: AttachmentKind::Depth,
            format,
        }
    }
}

/// Where an image is attached on a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSlot {
    Color(u32),
    Depth,
}

/// Result of a device completeness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    Complete,
    Incomplete(String),
}

/// Clear values applied to the currently bound output
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValues {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl ClearValues {
    pub fn color_and_depth(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }

    pub fn color(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: None,
        }
    }
}

/// Stateful device operations used by the renderer.
///
/// Resources are owned handles; dropping one releases it on the device.
pub trait RenderDevice {
    /// A sampleable image usable as a render target attachment
    type Image;
    /// A set of attachments that draw output can be redirected to
    type Target;
    /// Uploaded vertex and index buffers
    type Geometry;

    /// Largest width or height an image may have
    fn max_image_size(&self) -> u32;

    fn create_image(&mut self, width: u32, height: u32, format: TextureFormat) -> Self::Image;

    fn create_target(&mut self) -> Self::Target;

    fn attach_image(&mut self, target: &mut Self::Target, slot: AttachmentSlot, image: &Self::Image);

    fn target_status(&self, target: &Self::Target) -> TargetStatus;

    /// Redirect draw output to `target`, or to the visible surface for `None`.
    /// `draw_buffers` lists the color slots that receive fragment outputs.
    fn bind_target(&mut self, target: Option<&Self::Target>, draw_buffers: &[u32]);

    fn clear(&mut self, values: ClearValues);

    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> Self::Geometry;

    fn bind_geometry(&mut self, geometry: Option<&Self::Geometry>);

    /// Draw triangles from a slice of the bound index buffer
    fn draw_indexed(&mut self, indices: Range<u32>);

    /// Draw a triangle strip without vertex buffers
    fn draw_strip(&mut self, vertices: Range<u32>);

    /// Make an image readable by shaders through texture unit `unit`
    fn bind_texture(&mut self, unit: u32, image: Option<&Self::Image>);
}

/// A compiled shading program with named parameters.
///
/// Setters act on this program; callers `use_program` it before drawing.
pub trait ShadingProgram {
    fn use_program(&self);
    fn set_int(&self, name: &str, value: i32);
    fn set_float(&self, name: &str, value: f32);
    fn set_vec3(&self, name: &str, value: &Vector3<f32>);
    fn set_mat4(&self, name: &str, value: &Matrix4<f32>);
}
