//! Turns stateful bind/clear/draw calls into wgpu render passes.
//!
//! Calls are queued during the frame and encoded in one go by
//! [`FrameRecorder::encode`]. A pass is cut whenever the bound target
//! changes or a clear follows draws on the same target. Each draw keeps a
//! copy of the program's uniform bytes as they were when it was issued.

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::rc::Rc;

use log::debug;
use meshview_core::ClearValues;
use wgpu::util::DeviceExt;

use crate::gpu::{AttachedView, GeometryBuffers};
use crate::program::ProgramState;

/// Attachments a pass renders into. `None` in a pass means the surface.
#[derive(Clone)]
pub(crate) struct PassTarget {
    pub(crate) colors: Vec<AttachedView>,
    pub(crate) depth: Option<AttachedView>,
}

enum DrawKind {
    Indexed {
        geometry: Rc<GeometryBuffers>,
        indices: Range<u32>,
    },
    Strip {
        vertices: Range<u32>,
    },
}

struct RecordedDraw {
    pipeline: Rc<wgpu::RenderPipeline>,
    uniforms: Vec<u8>,
    uniform_layout: Rc<wgpu::BindGroupLayout>,
    textures: Option<(Rc<wgpu::BindGroupLayout>, Vec<(u32, Rc<wgpu::TextureView>)>)>,
    kind: DrawKind,
}

#[derive(Default)]
struct RecordedPass {
    target: Option<PassTarget>,
    clear: ClearValues,
    draws: Vec<RecordedDraw>,
}

impl RecordedPass {
    fn on(target: Option<PassTarget>) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.draws.is_empty() && self.clear.color.is_none() && self.clear.depth.is_none()
    }
}

#[derive(Default)]
pub struct FrameRecorder {
    passes: Vec<RecordedPass>,
    current: RecordedPass,
    program: Option<Rc<ProgramState>>,
    geometry: Option<Rc<GeometryBuffers>>,
    textures: BTreeMap<u32, Rc<wgpu::TextureView>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn cut(&mut self) {
        let target = self.current.target.clone();
        let pass = std::mem::replace(&mut self.current, RecordedPass::on(target));
        if !pass.is_empty() {
            self.passes.push(pass);
        }
    }

    pub(crate) fn bind_target(&mut self, target: Option<PassTarget>) {
        self.cut();
        self.current.target = target;
    }

    pub(crate) fn clear(&mut self, values: ClearValues) {
        if !self.current.draws.is_empty() {
            self.cut();
        }
        if values.color.is_some() {
            self.current.clear.color = values.color;
        }
        if values.depth.is_some() {
            self.current.clear.depth = values.depth;
        }
    }

    pub(crate) fn use_program(&mut self, program: Rc<ProgramState>) {
        self.program = Some(program);
    }

    pub(crate) fn bind_geometry(&mut self, geometry: Option<Rc<GeometryBuffers>>) {
        self.geometry = geometry;
    }

    pub(crate) fn bind_texture(&mut self, unit: u32, view: Option<Rc<wgpu::TextureView>>) {
        match view {
            Some(view) => {
                self.textures.insert(unit, view);
            }
            None => {
                self.textures.remove(&unit);
            }
        }
    }

    pub(crate) fn draw_indexed(&mut self, indices: Range<u32>) {
        let Some(geometry) = self.geometry.clone() else {
            debug!("indexed draw with no geometry bound, skipped");
            return;
        };
        self.push_draw(DrawKind::Indexed { geometry, indices });
    }

    pub(crate) fn draw_strip(&mut self, vertices: Range<u32>) {
        self.push_draw(DrawKind::Strip { vertices });
    }

    fn push_draw(&mut self, kind: DrawKind) {
        let Some(program) = &self.program else {
            debug!("draw with no program in use, skipped");
            return;
        };
        let Some(pipeline) = program.pipeline.borrow().clone() else {
            debug!("{} program is not compiled, draw skipped", program.label);
            return;
        };

        let textures = match &program.texture_layout {
            Some(layout) => {
                let mut views = Vec::with_capacity(program.textures.len());
                for binding in &program.textures {
                    let unit = program.texture_unit(binding);
                    let Some(view) = self.textures.get(&unit) else {
                        debug!("nothing bound to texture unit {} for {}, draw skipped", unit, binding.name);
                        return;
                    };
                    views.push((binding.binding, view.clone()));
                }
                Some((layout.clone(), views))
            }
            None => None,
        };

        let draw = RecordedDraw {
            pipeline,
            uniforms: program.uniforms.borrow().bytes().to_vec(),
            uniform_layout: program.uniform_layout.clone(),
            textures,
            kind,
        };
        self.current.draws.push(draw);
    }

    /// Encode every queued pass into `encoder` and reset for the next frame.
    /// The bound target and program survive the reset.
    pub(crate) fn encode(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        surface: &wgpu::TextureView,
    ) {
        self.cut();
        let passes = std::mem::take(&mut self.passes);

        let align = device.limits().min_uniform_buffer_offset_alignment as usize;
        let mut offsets = Vec::new();
        let mut packed = Vec::new();
        for draw in passes.iter().flat_map(|pass| &pass.draws) {
            let offset = packed.len().div_ceil(align) * align;
            packed.resize(offset, 0);
            packed.extend_from_slice(&draw.uniforms);
            offsets.push(offset as u64);
        }
        let uniform_buffer = (!packed.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("frame uniforms"),
                contents: &packed,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let mut bind_groups = Vec::with_capacity(offsets.len());
        if let Some(buffer) = &uniform_buffer {
            let draws = passes.iter().flat_map(|pass| &pass.draws);
            for (draw, offset) in draws.zip(&offsets) {
                let uniforms = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &draw.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: *offset,
                            size: NonZeroU64::new(draw.uniforms.len() as u64),
                        }),
                    }],
                });
                let textures = draw.textures.as_ref().map(|(layout, views)| {
                    let entries: Vec<wgpu::BindGroupEntry> = views
                        .iter()
                        .map(|(binding, view)| wgpu::BindGroupEntry {
                            binding: *binding,
                            resource: wgpu::BindingResource::TextureView(view),
                        })
                        .collect();
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: None,
                        layout,
                        entries: &entries,
                    })
                });
                bind_groups.push((uniforms, textures));
            }
        }

        let mut groups = bind_groups.iter();
        for pass in &passes {
            let color_load = |clear: Option<[f32; 4]>| match clear {
                Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: r as f64,
                    g: g as f64,
                    b: b as f64,
                    a: a as f64,
                }),
                None => wgpu::LoadOp::Load,
            };
            let ops = wgpu::Operations {
                load: color_load(pass.clear.color),
                store: wgpu::StoreOp::Store,
            };

            let (color_attachments, depth_stencil_attachment) = match &pass.target {
                None => (
                    vec![Some(wgpu::RenderPassColorAttachment {
                        view: surface,
                        resolve_target: None,
                        ops,
                    })],
                    None,
                ),
                Some(target) => (
                    target
                        .colors
                        .iter()
                        .map(|color| {
                            Some(wgpu::RenderPassColorAttachment {
                                view: &color.view,
                                resolve_target: None,
                                ops,
                            })
                        })
                        .collect(),
                    target.depth.as_ref().map(|depth| wgpu::RenderPassDepthStencilAttachment {
                        view: &depth.view,
                        depth_ops: Some(wgpu::Operations {
                            load: match pass.clear.depth {
                                Some(value) => wgpu::LoadOp::Clear(value),
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: depth.format.has_stencil_aspect().then_some(wgpu::Operations {
                            load: match pass.clear.depth {
                                Some(_) => wgpu::LoadOp::Clear(0),
                                None => wgpu::LoadOp::Load,
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                    }),
                ),
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &pass.draws {
                let Some((uniforms, textures)) = groups.next() else {
                    break;
                };
                render_pass.set_pipeline(&draw.pipeline);
                render_pass.set_bind_group(0, uniforms, &[]);
                if let Some(textures) = textures {
                    render_pass.set_bind_group(1, textures, &[]);
                }
                match &draw.kind {
                    DrawKind::Indexed { geometry, indices } => {
                        render_pass.set_vertex_buffer(0, geometry.vertices.slice(..));
                        render_pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(indices.clone(), 0, 0..1);
                    }
                    DrawKind::Strip { vertices } => render_pass.draw(vertices.clone(), 0..1),
                }
            }
        }
    }

    /// Passes queued so far, including the open one
    pub fn pending_passes(&self) -> usize {
        self.passes.len() + usize::from(!self.current.is_empty())
    }
}
