//! wgpu implementation of the core `RenderDevice`
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use log::{error, info};
use meshview_core::{AttachmentSlot, ClearValues, RenderDevice, TargetStatus, TextureFormat, Vertex};
use nalgebra::Matrix4;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::{ViewerError, ViewerResult};
use crate::recorder::{FrameRecorder, PassTarget};

/// Interleaved vertex as laid out in the vertex buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

impl GpuVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    /// Locations 0/1/2: position, normal, texcoord
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

impl From<&Vertex> for GpuVertex {
    fn from(vertex: &Vertex) -> Self {
        let [px, py, pz, nx, ny, nz, u, v] = vertex.to_array();
        Self {
            position: [px, py, pz],
            normal: [nx, ny, nz],
            texcoord: [u, v],
        }
    }
}

/// Remaps OpenGL clip depth [-1, 1] to the [0, 1] range wgpu expects
#[rustfmt::skip]
pub fn clip_space_correction() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.5,
        0.0, 0.0, 0.0, 1.0,
    )
}

pub fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        // No three-channel renderable format exists; pad to four
        TextureFormat::Rgb8 | TextureFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Depth24 => wgpu::TextureFormat::Depth24Plus,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

/// A texture usable both as an attachment and as a shader input
pub struct GpuImage {
    /// Owns the allocation the views point into
    _texture: wgpu::Texture,
    /// Full view, used when attached
    view: Rc<wgpu::TextureView>,
    /// Depth-only view for depth formats, used when sampled
    sample_view: Rc<wgpu::TextureView>,
    format: wgpu::TextureFormat,
}

impl GpuImage {
    pub(crate) fn sample_view(&self) -> Rc<wgpu::TextureView> {
        self.sample_view.clone()
    }
}

#[derive(Clone)]
pub(crate) struct AttachedView {
    pub(crate) view: Rc<wgpu::TextureView>,
    pub(crate) format: wgpu::TextureFormat,
}

/// Attachments of an off-screen target, by slot
pub struct GpuTarget {
    colors: BTreeMap<u32, AttachedView>,
    depth: Option<AttachedView>,
}

pub struct GpuGeometry {
    pub(crate) buffers: Rc<GeometryBuffers>,
}

pub(crate) struct GeometryBuffers {
    pub(crate) vertices: wgpu::Buffer,
    pub(crate) indices: wgpu::Buffer,
}

/// Device handle shared with shading programs. Not `Send`: every call must
/// come from the thread that created it.
pub struct WgpuDevice {
    pub(crate) device: Rc<wgpu::Device>,
    pub(crate) queue: wgpu::Queue,
    pub(crate) recorder: Rc<RefCell<FrameRecorder>>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        device.on_uncaptured_error(Box::new(|err: wgpu::Error| error!("wgpu: {}", err)));
        Self {
            device: Rc::new(device),
            queue,
            recorder: Rc::new(RefCell::new(FrameRecorder::new())),
        }
    }

    pub fn raw(&self) -> &wgpu::Device {
        &self.device
    }

    /// Encode everything recorded since the last submit and queue it.
    /// Passes bound to the visible surface render into `surface`.
    pub fn submit(&self, surface: &wgpu::TextureView) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("meshview frame"),
        });
        self.recorder.borrow_mut().encode(&self.device, &mut encoder, surface);
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl RenderDevice for WgpuDevice {
    type Image = GpuImage;
    type Target = GpuTarget;
    type Geometry = GpuGeometry;

    fn max_image_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_image(&mut self, width: u32, height: u32, format: TextureFormat) -> GpuImage {
        let format = texture_format(format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render target attachment"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = Rc::new(texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let sample_view = if format.has_depth_aspect() {
            Rc::new(texture.create_view(&wgpu::TextureViewDescriptor {
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            }))
        } else {
            view.clone()
        };
        GpuImage {
            _texture: texture,
            view,
            sample_view,
            format,
        }
    }

    fn create_target(&mut self) -> GpuTarget {
        GpuTarget {
            colors: BTreeMap::new(),
            depth: None,
        }
    }

    fn attach_image(&mut self, target: &mut GpuTarget, slot: AttachmentSlot, image: &GpuImage) {
        let attached = AttachedView {
            view: image.view.clone(),
            format: image.format,
        };
        match slot {
            AttachmentSlot::Color(index) => {
                target.colors.insert(index, attached);
            }
            AttachmentSlot::Depth => target.depth = Some(attached),
        }
    }

    fn target_status(&self, target: &GpuTarget) -> TargetStatus {
        let max_colors = self.device.limits().max_color_attachments as usize;
        if target.colors.is_empty() && target.depth.is_none() {
            return TargetStatus::Incomplete("no attachments".into());
        }
        if target.colors.len() > max_colors {
            return TargetStatus::Incomplete(format!(
                "{} color attachments exceed the device limit of {}",
                target.colors.len(),
                max_colors
            ));
        }
        if target.colors.keys().copied().ne(0..target.colors.len() as u32) {
            return TargetStatus::Incomplete("color slots are not contiguous".into());
        }
        if let Some(depth) = &target.depth {
            if !depth.format.has_depth_aspect() {
                return TargetStatus::Incomplete(format!("{:?} cannot be a depth attachment", depth.format));
            }
        }
        TargetStatus::Complete
    }

    fn bind_target(&mut self, target: Option<&GpuTarget>, draw_buffers: &[u32]) {
        let pass_target = target.map(|target| PassTarget {
            colors: draw_buffers
                .iter()
                .filter_map(|slot| target.colors.get(slot).cloned())
                .collect(),
            depth: target.depth.clone(),
        });
        self.recorder.borrow_mut().bind_target(pass_target);
    }

    fn clear(&mut self, values: ClearValues) {
        self.recorder.borrow_mut().clear(values);
    }

    fn upload_geometry(&mut self, vertices: &[Vertex], indices: &[u32]) -> GpuGeometry {
        let vertices: Vec<GpuVertex> = vertices.iter().map(GpuVertex::from).collect();
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        GpuGeometry {
            buffers: Rc::new(GeometryBuffers {
                vertices: vertex_buffer,
                indices: index_buffer,
            }),
        }
    }

    fn bind_geometry(&mut self, geometry: Option<&GpuGeometry>) {
        self.recorder
            .borrow_mut()
            .bind_geometry(geometry.map(|g| g.buffers.clone()));
    }

    fn draw_indexed(&mut self, indices: Range<u32>) {
        self.recorder.borrow_mut().draw_indexed(indices);
    }

    fn draw_strip(&mut self, vertices: Range<u32>) {
        self.recorder.borrow_mut().draw_strip(vertices);
    }

    fn bind_texture(&mut self, unit: u32, image: Option<&GpuImage>) {
        self.recorder
            .borrow_mut()
            .bind_texture(unit, image.map(GpuImage::sample_view));
    }
}

/// Window surface plus the device that renders into it
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub device: WgpuDevice,
}

impl GpuContext {
    pub fn new(window: Arc<Window>) -> ViewerResult<Self> {
        pollster::block_on(Self::init(window))
    }

    async fn init(window: Arc<Window>) -> ViewerResult<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ViewerError::NoAdapter)?;
        let info = adapter.get_info();
        info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("meshview device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(ViewerError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            config,
            device: WgpuDevice::new(device, queue),
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(self.device.raw(), &self.config);
    }
}
