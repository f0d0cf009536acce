//! Window, input handling and the per-frame render loop.
use std::sync::Arc;

use log::{error, info, warn};
use meshview_core::{
    geometry_pass, post_process_pass, AttachmentDef, ClearValues, MeshBuffer, OrbitLimits,
    OrbitState, PointerEvent, Projection, RenderDevice, RenderTarget, SceneView, TextureFormat, ViewerConfig,
    GBUFFER_INPUTS,
};
use nalgebra::Matrix4;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowBuilder};

use crate::error::ViewerResult;
use crate::gpu::{clip_space_correction, GpuContext, WgpuDevice};
use crate::program::{ProgramDesc, WgslProgram};

const COLOR_FORMAT: TextureFormat = TextureFormat::Rgb8;
const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24;

/// Color, normal, depth
fn gbuffer_layout() -> [AttachmentDef; 3] {
    [
        AttachmentDef::color(COLOR_FORMAT),
        AttachmentDef::color(COLOR_FORMAT),
        AttachmentDef::depth(DEPTH_FORMAT),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ReloadMesh,
    ReloadShaders,
}

/// Keys act once per press; auto-repeat is filtered by the caller
pub fn key_action(code: KeyCode) -> Option<Action> {
    match code {
        KeyCode::Escape => Some(Action::Quit),
        KeyCode::Space => Some(Action::ReloadMesh),
        KeyCode::KeyS => Some(Action::ReloadShaders),
        _ => None,
    }
}

/// Translate window input into orbit camera input
pub fn pointer_event(event: &WindowEvent) -> Option<PointerEvent> {
    match event {
        WindowEvent::MouseInput {
            state,
            button: MouseButton::Left,
            ..
        } => Some(PointerEvent::Button {
            pressed: *state == ElementState::Pressed,
        }),
        WindowEvent::CursorMoved { position, .. } => Some(PointerEvent::Moved {
            x: position.x,
            y: position.y,
        }),
        WindowEvent::MouseWheel { delta, .. } => {
            let delta = match delta {
                MouseScrollDelta::LineDelta(_, y) => *y,
                MouseScrollDelta::PixelDelta(position) => position.y as f32 * 0.01,
            };
            Some(PointerEvent::Scroll { delta })
        }
        _ => None,
    }
}

pub struct ViewerApp {
    // GPU resources are declared before the context so they drop first
    mesh: Option<MeshBuffer<WgpuDevice>>,
    target: RenderTarget<WgpuDevice>,
    geometry_program: WgslProgram,
    post_program: WgslProgram,
    gpu: GpuContext,
    window: Arc<Window>,
    config: ViewerConfig,
    orbit: OrbitState,
    limits: OrbitLimits,
    projection: Projection,
    models: Vec<Matrix4<f32>>,
}

impl ViewerApp {
    pub fn new(window: Arc<Window>, config: ViewerConfig) -> ViewerResult<Self> {
        let mut gpu = GpuContext::new(window.clone())?;

        let (width, height) = config.target_size();
        let target = RenderTarget::new(&mut gpu.device, width, height, &gbuffer_layout())?;
        info!("render target {}x{} ready", width, height);

        let shaders = &config.shaders;
        let (geometry_program, result) = WgslProgram::new(
            &gpu.device,
            ProgramDesc::geometry(
                &shaders.geometry_vertex,
                &shaders.geometry_fragment,
                &[COLOR_FORMAT, COLOR_FORMAT],
                DEPTH_FORMAT,
            ),
        );
        if let Err(err) = result {
            error!("{}", err);
        }
        let (post_program, result) = WgslProgram::new(
            &gpu.device,
            ProgramDesc::edge_detect(&shaders.post_vertex, &shaders.post_fragment, gpu.surface_format()),
        );
        if let Err(err) = result {
            error!("{}", err);
        }

        let mut mesh = None;
        let model = &config.model;
        if let Err(err) = MeshBuffer::reload(&mut gpu.device, &model.path, &model.parse_options(), &mut mesh) {
            error!("{}", err);
        }

        Ok(Self {
            mesh,
            target,
            geometry_program,
            post_program,
            gpu,
            window,
            orbit: OrbitState::new(config.camera.orbit_camera()),
            limits: config.camera.orbit_limits(),
            projection: config.camera.projection(),
            models: config.render.instance_grid().model_matrices(),
            config,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Parse, index and upload the model again. The current mesh is only
    /// replaced once the new one is on the device.
    pub fn reload_mesh(&mut self) {
        let model = &self.config.model;
        match MeshBuffer::reload(&mut self.gpu.device, &model.path, &model.parse_options(), &mut self.mesh) {
            Ok(()) => {
                if let Some(buffer) = &self.mesh {
                    info!(
                        "reloaded {}: {} triangles in {} ranges",
                        model.path.display(),
                        buffer.index_count() / 3,
                        buffer.ranges().len()
                    );
                }
            }
            Err(err) => error!("mesh reload failed, keeping the current mesh: {}", err),
        }
    }

    pub fn reload_shaders(&mut self) {
        for program in [&self.geometry_program, &self.post_program] {
            if let Err(err) = program.reload() {
                error!("{} program reload failed: {}", program.label(), err);
            }
        }
    }

    fn handle_action(&mut self, action: Action, elwt: &EventLoopWindowTarget<()>) {
        match action {
            Action::Quit => elwt.exit(),
            Action::ReloadMesh => self.reload_mesh(),
            Action::ReloadShaders => self.reload_shaders(),
        }
    }

    fn window_event(&mut self, event: WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        if let Some(pointer) = pointer_event(&event) {
            self.orbit = self.orbit.apply(pointer, &self.limits);
            return;
        }

        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(action) = key_action(code) {
                        self.handle_action(action, elwt);
                    }
                }
            }
            WindowEvent::Resized(size) => self.gpu.resize(size.width, size.height),
            WindowEvent::RedrawRequested => match self.render() {
                Ok(()) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    let (width, height) = self.gpu.size();
                    self.gpu.resize(width, height);
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    error!("surface out of memory");
                    elwt.exit();
                }
                Err(err) => warn!("frame skipped: {}", err),
            },
            _ => {}
        }
    }

    /// Geometry pass into the G-buffer, then the edge pass onto the window
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let frame = self.gpu.surface.get_current_texture()?;
        let surface_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let render = &self.config.render;
        let camera = &self.orbit.camera;
        let aspect = self.target.width() as f32 / self.target.height() as f32;
        let view = camera.view_matrix();
        let projection = clip_space_correction() * self.projection.matrix(aspect, camera.distance);
        let device = &mut self.gpu.device;

        match &self.mesh {
            Some(mesh) => {
                let scene = SceneView {
                    view: &view,
                    projection: &projection,
                    models: &self.models,
                };
                geometry_pass(
                    device,
                    &self.target,
                    &self.geometry_program,
                    mesh,
                    &scene,
                    render.clear_color,
                );
            }
            None => {
                self.target.bind(device);
                device.clear(ClearValues::color_and_depth(render.clear_color));
                self.target.unbind(device);
            }
        }

        post_process_pass(
            device,
            &self.target,
            &self.post_program,
            &GBUFFER_INPUTS,
            &[("edgeThreshold", render.edge_threshold)],
            render.post_clear_color,
        );

        device.submit(&surface_view);
        frame.present();
        Ok(())
    }
}

/// Open the window and run until it is closed
pub fn run(config: ViewerConfig) -> ViewerResult<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window.title.clone())
            .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
            .with_resizable(false)
            .build(&event_loop)?,
    );

    let mut app = ViewerApp::new(window, config)?;
    info!("drag to orbit, scroll to zoom, space reloads the mesh, S reloads shaders, Esc quits");

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == app.window().id() => {
            app.window_event(event, elwt);
        }
        Event::AboutToWait => app.window().request_redraw(),
        _ => {}
    })?;
    Ok(())
}
