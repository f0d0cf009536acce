//! Error types for mesh loading, render targets and shading programs.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Attribute pool a face corner indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributePool {
    Position,
    TexCoord,
    Normal,
}

impl fmt::Display for AttributePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributePool::Position => "position",
            AttributePool::TexCoord => "texture coordinate",
            AttributePool::Normal => "normal",
        };
        f.write_str(name)
    }
}

/// Failure while loading a geometry or material file.
///
/// A load either produces a complete mesh or one of these; callers keep
/// whatever they had loaded before.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: {message}", path.display())]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{pool} index {index} out of range (pool holds {len})")]
    Index {
        pool: AttributePool,
        index: i64,
        len: usize,
    },
}

pub type LoadResult<T> = Result<T, LoadError>;

/// A render target that failed its completeness check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("frame buffer incomplete: {reason}")]
pub struct FrameBufferError {
    pub reason: String,
}

impl FrameBufferError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Shading program failures. These are reported, never fatal: the previously
/// compiled program stays in use.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to read shader source {}: {source}", path.display())]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error compiling {stage} shader:\n{message}")]
    Compile { stage: String, message: String },
    #[error("error linking program:\n{message}")]
    Link { message: String },
}
