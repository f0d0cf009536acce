//! Two-pass frame orchestration: an off-screen geometry pass followed by a
//! full-screen post-process pass that samples the render target.

use nalgebra::Matrix4;

use crate::device::{ClearValues, RenderDevice, ShadingProgram};
use crate::framebuffer::RenderTarget;
use crate::mesh_buffer::MeshBuffer;

/// Camera matrices and per-instance model matrices for one geometry pass
pub struct SceneView<'a> {
    pub view: &'a Matrix4<f32>,
    pub projection: &'a Matrix4<f32>,
    pub models: &'a [Matrix4<f32>],
}

/// A render target attachment exposed to the post-process program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInput {
    /// Sampler parameter name in the program
    pub name: &'static str,
    /// Index into the render target's attachments
    pub attachment: usize,
}

/// The attachment inputs of the edge-detection program, in texture unit order
pub const GBUFFER_INPUTS: [TextureInput; 3] = [
    TextureInput {
        name: "colorTexture",
        attachment: 0,
    },
    TextureInput {
        name: "normalTexture",
        attachment: 1,
    },
    TextureInput {
        name: "depthTexture",
        attachment: 2,
    },
];

/// Draw every instance of `mesh` into `target`
pub fn geometry_pass<D, P>(
    device: &mut D,
    target: &RenderTarget<D>,
    program: &P,
    mesh: &MeshBuffer<D>,
    scene: &SceneView<'_>,
    clear_color: [f32; 4],
) where
    D: RenderDevice,
    P: ShadingProgram,
{
    target.bind(device);
    device.clear(ClearValues::color_and_depth(clear_color));

    program.use_program();
    program.set_mat4("view", scene.view);
    program.set_mat4("projection", scene.projection);
    for model in scene.models {
        program.set_mat4("model", model);
        mesh.draw(device, program);
    }

    target.unbind(device);
}

/// Draw a full-screen strip on the visible surface with `inputs` bound to
/// consecutive texture units. `params` are pushed as scalar parameters.
pub fn post_process_pass<D, P>(
    device: &mut D,
    target: &RenderTarget<D>,
    program: &P,
    inputs: &[TextureInput],
    params: &[(&str, f32)],
    clear_color: [f32; 4],
) where
    D: RenderDevice,
    P: ShadingProgram,
{
    device.clear(ClearValues::color(clear_color));

    program.use_program();
    for (unit, input) in inputs.iter().enumerate() {
        device.bind_texture(unit as u32, target.attachment(input.attachment));
        program.set_int(input.name, unit as i32);
    }
    for (name, value) in params {
        program.set_float(name, *value);
    }

    device.draw_strip(0..4);

    for unit in 0..inputs.len() {
        device.bind_texture(unit as u32, None);
    }
}
