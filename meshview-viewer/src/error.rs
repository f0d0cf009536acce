//! Errors that stop the viewer from starting or running.

use meshview_core::{ConfigError, FrameBufferError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible graphics adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface does not support any texture format")]
    NoSurfaceFormat,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    FrameBuffer(#[from] FrameBufferError),
}

pub type ViewerResult<T> = Result<T, ViewerError>;
