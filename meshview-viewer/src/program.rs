//! WGSL shading programs with named parameters and hot reload.
//!
//! A program is a vertex stage file and a fragment stage file compiled into
//! one render pipeline. Named parameters live in a single uniform block at
//! group 0; attachments sampled by the program live at group 1. Parameter
//! setters only write CPU-side bytes; the frame recorder snapshots them at
//! each draw.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{info, warn};
use meshview_core::{DeviceError, ShadingProgram};
use nalgebra::{Matrix4, Vector3};

use crate::gpu::{texture_format, GpuVertex, WgpuDevice};
use crate::recorder::FrameRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Int,
    Float,
    Vec3,
    Mat4,
}

impl UniformKind {
    fn size(self) -> usize {
        match self {
            UniformKind::Int | UniformKind::Float => 4,
            UniformKind::Vec3 => 12,
            UniformKind::Mat4 => 64,
        }
    }

    fn align(self) -> usize {
        match self {
            UniformKind::Int | UniformKind::Float => 4,
            UniformKind::Vec3 | UniformKind::Mat4 => 16,
        }
    }
}

fn align_to(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Byte layout of a WGSL uniform struct, fields in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct UniformLayout {
    fields: HashMap<String, (usize, UniformKind)>,
    size: usize,
}

impl UniformLayout {
    pub fn new(fields: &[(&str, UniformKind)]) -> Self {
        let mut offset = 0;
        let mut map = HashMap::with_capacity(fields.len());
        for (name, kind) in fields {
            offset = align_to(offset, kind.align());
            map.insert((*name).to_string(), (offset, *kind));
            offset += kind.size();
        }
        Self {
            fields: map,
            size: align_to(offset, 16).max(16),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn field(&self, name: &str) -> Option<(usize, UniformKind)> {
        self.fields.get(name).copied()
    }
}

/// CPU copy of a program's uniform block
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let bytes = vec![0; layout.size()];
        Self { layout, bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Unknown names are ignored, like an inactive uniform
    fn write(&mut self, name: &str, kind: UniformKind, data: &[u8]) {
        match self.layout.field(name) {
            Some((offset, field_kind)) if field_kind == kind => {
                self.bytes[offset..offset + data.len()].copy_from_slice(data);
            }
            Some((_, field_kind)) => {
                warn!("parameter {} is {:?}, not {:?}", name, field_kind, kind);
            }
            None => {}
        }
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.write(name, UniformKind::Int, bytemuck::bytes_of(&value));
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.write(name, UniformKind::Float, bytemuck::bytes_of(&value));
    }

    pub fn set_vec3(&mut self, name: &str, value: &Vector3<f32>) {
        self.write(name, UniformKind::Vec3, bytemuck::cast_slice(value.as_slice()));
    }

    /// nalgebra storage is column-major, which is what WGSL expects
    pub fn set_mat4(&mut self, name: &str, value: &Matrix4<f32>) {
        self.write(name, UniformKind::Mat4, bytemuck::cast_slice(value.as_slice()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderStageDef {
    pub path: PathBuf,
    pub entry_point: &'static str,
}

impl ShaderStageDef {
    pub fn new(path: impl Into<PathBuf>, stage: ShaderStage) -> Self {
        let entry_point = match stage {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        };
        Self {
            path: path.into(),
            entry_point,
        }
    }
}

/// An attachment the program reads, at `@group(1) @binding(binding)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
    pub depth: bool,
}

/// Fixed pipeline state a program compiles into
#[derive(Debug, Clone)]
pub enum PipelineKind {
    /// Indexed triangle lists with depth testing into the G-buffer
    Geometry {
        color_formats: Vec<wgpu::TextureFormat>,
        depth_format: wgpu::TextureFormat,
    },
    /// Vertex-less four-vertex strip into the window surface
    FullScreen { surface_format: wgpu::TextureFormat },
}

#[derive(Debug, Clone)]
pub struct ProgramDesc {
    pub label: String,
    pub vertex: ShaderStageDef,
    pub fragment: ShaderStageDef,
    pub uniforms: UniformLayout,
    pub textures: Vec<TextureBinding>,
    pub kind: PipelineKind,
}

impl ProgramDesc {
    /// The mesh program: per-instance matrices and per-range material colors
    pub fn geometry(
        vertex: &Path,
        fragment: &Path,
        color_formats: &[meshview_core::TextureFormat],
        depth_format: meshview_core::TextureFormat,
    ) -> Self {
        Self {
            label: "geometry".into(),
            vertex: ShaderStageDef::new(vertex, ShaderStage::Vertex),
            fragment: ShaderStageDef::new(fragment, ShaderStage::Fragment),
            uniforms: UniformLayout::new(&[
                ("model", UniformKind::Mat4),
                ("view", UniformKind::Mat4),
                ("projection", UniformKind::Mat4),
                ("Ka", UniformKind::Vec3),
                ("Kd", UniformKind::Vec3),
                ("Ks", UniformKind::Vec3),
            ]),
            textures: Vec::new(),
            kind: PipelineKind::Geometry {
                color_formats: color_formats.iter().copied().map(texture_format).collect(),
                depth_format: texture_format(depth_format),
            },
        }
    }

    /// The edge-detection program sampling color, normal and depth
    pub fn edge_detect(vertex: &Path, fragment: &Path, surface_format: wgpu::TextureFormat) -> Self {
        let texture = |name: &str, binding, depth| TextureBinding {
            name: name.into(),
            binding,
            depth,
        };
        Self {
            label: "edge detect".into(),
            vertex: ShaderStageDef::new(vertex, ShaderStage::Vertex),
            fragment: ShaderStageDef::new(fragment, ShaderStage::Fragment),
            uniforms: UniformLayout::new(&[("edgeThreshold", UniformKind::Float)]),
            textures: vec![
                texture("colorTexture", 0, false),
                texture("normalTexture", 1, false),
                texture("depthTexture", 2, true),
            ],
            kind: PipelineKind::FullScreen { surface_format },
        }
    }
}

/// State shared between a program and the frame recorder
pub(crate) struct ProgramState {
    pub(crate) label: String,
    pub(crate) uniforms: RefCell<UniformBlock>,
    pub(crate) textures: Vec<TextureBinding>,
    /// Texture unit per sampler name, as set through `set_int`
    pub(crate) texture_units: RefCell<HashMap<String, u32>>,
    pub(crate) pipeline: RefCell<Option<Rc<wgpu::RenderPipeline>>>,
    pub(crate) uniform_layout: Rc<wgpu::BindGroupLayout>,
    pub(crate) texture_layout: Option<Rc<wgpu::BindGroupLayout>>,
}

impl ProgramState {
    /// Texture unit each binding reads from, defaulting to its binding index
    pub(crate) fn texture_unit(&self, binding: &TextureBinding) -> u32 {
        self.texture_units
            .borrow()
            .get(&binding.name)
            .copied()
            .unwrap_or(binding.binding)
    }
}

pub struct WgslProgram {
    desc: ProgramDesc,
    device: Rc<wgpu::Device>,
    recorder: Rc<RefCell<FrameRecorder>>,
    state: Rc<ProgramState>,
    pipeline_layout: wgpu::PipelineLayout,
}

impl WgslProgram {
    /// Build the program and try a first compile. A failed compile is
    /// returned alongside the program, which draws nothing until a reload
    /// succeeds.
    pub fn new(device: &WgpuDevice, desc: ProgramDesc) -> (Self, Result<(), DeviceError>) {
        let raw = device.device.clone();
        let uniform_layout = Rc::new(raw.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} uniforms", desc.label)),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(desc.uniforms.size() as u64),
                },
                count: None,
            }],
        }));

        let texture_layout = (!desc.textures.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
                .textures
                .iter()
                .map(|texture| wgpu::BindGroupLayoutEntry {
                    binding: texture.binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: if texture.depth {
                            wgpu::TextureSampleType::Depth
                        } else {
                            wgpu::TextureSampleType::Float { filterable: false }
                        },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                })
                .collect();
            Rc::new(raw.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} textures", desc.label)),
                entries: &entries,
            }))
        });

        let mut layouts: Vec<&wgpu::BindGroupLayout> = vec![&*uniform_layout];
        if let Some(layout) = &texture_layout {
            layouts.push(layout);
        }
        let pipeline_layout = raw.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.label),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let state = Rc::new(ProgramState {
            label: desc.label.clone(),
            uniforms: RefCell::new(UniformBlock::new(desc.uniforms.clone())),
            textures: desc.textures.clone(),
            texture_units: RefCell::new(HashMap::new()),
            pipeline: RefCell::new(None),
            uniform_layout,
            texture_layout,
        });

        let program = Self {
            desc,
            device: raw,
            recorder: device.recorder.clone(),
            state,
            pipeline_layout,
        };
        let result = program.reload();
        (program, result)
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    /// Re-read both stage files and rebuild the pipeline. On any failure the
    /// previous pipeline stays in use.
    pub fn reload(&self) -> Result<(), DeviceError> {
        let vertex = self.compile(&self.desc.vertex, ShaderStage::Vertex)?;
        let fragment = self.compile(&self.desc.fragment, ShaderStage::Fragment)?;

        let vertex_buffers = [GpuVertex::layout()];
        let (buffers, primitive, targets, depth_stencil) = match &self.desc.kind {
            PipelineKind::Geometry {
                color_formats,
                depth_format,
            } => (
                &vertex_buffers[..],
                wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                color_formats
                    .iter()
                    .map(|format| Some(wgpu::ColorTargetState::from(*format)))
                    .collect::<Vec<_>>(),
                Some(wgpu::DepthStencilState {
                    format: *depth_format,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            ),
            PipelineKind::FullScreen { surface_format } => (
                &[][..],
                wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                vec![Some(wgpu::ColorTargetState::from(*surface_format))],
                None,
            ),
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&self.desc.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: self.desc.vertex.entry_point,
                buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: self.desc.fragment.entry_point,
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive,
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Link {
                message: err.to_string(),
            });
        }

        *self.state.pipeline.borrow_mut() = Some(Rc::new(pipeline));
        info!("compiled {} program", self.desc.label);
        Ok(())
    }

    fn compile(&self, def: &ShaderStageDef, stage: ShaderStage) -> Result<wgpu::ShaderModule, DeviceError> {
        let source = fs::read_to_string(&def.path).map_err(|source| DeviceError::ShaderSource {
            path: def.path.clone(),
            source,
        })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: def.path.to_str(),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(DeviceError::Compile {
                stage: format!("{} ({})", stage, def.path.display()),
                message: err.to_string(),
            }),
            None => Ok(module),
        }
    }
}

impl ShadingProgram for WgslProgram {
    fn use_program(&self) {
        self.recorder.borrow_mut().use_program(self.state.clone());
    }

    fn set_int(&self, name: &str, value: i32) {
        if self.state.textures.iter().any(|t| t.name == name) {
            match u32::try_from(value) {
                Ok(unit) => {
                    self.state.texture_units.borrow_mut().insert(name.to_string(), unit);
                }
                Err(_) => warn!("negative texture unit {} for {}", value, name),
            }
            return;
        }
        self.state.uniforms.borrow_mut().set_int(name, value);
    }

    fn set_float(&self, name: &str, value: f32) {
        self.state.uniforms.borrow_mut().set_float(name, value);
    }

    fn set_vec3(&self, name: &str, value: &Vector3<f32>) {
        self.state.uniforms.borrow_mut().set_vec3(name, value);
    }

    fn set_mat4(&self, name: &str, value: &Matrix4<f32>) {
        self.state.uniforms.borrow_mut().set_mat4(name, value);
    }
}
