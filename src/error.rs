use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A texture or other asset could not be read or decoded.
    #[error("failed to load asset {}: {source}", path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write image {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Decoded asset has a shape the renderer cannot use.
    #[error("invalid asset {}: {reason}", path.display())]
    InvalidAsset { path: PathBuf, reason: String },

    /// Shader module or pipeline failed validation.
    #[error("shader `{name}` failed to build: {message}")]
    Shader { name: &'static str, message: String },

    #[error("no suitable GPU adapter found")]
    Adapter,

    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("failed to read back render target: {0}")]
    Readback(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
