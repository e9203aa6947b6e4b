use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn an image file into a pixel buffer.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file could not be opened or read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The codec rejected the file contents.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Neither the content nor the extension maps to a known image kind.
    #[error("unsupported image type: {}", .0.display())]
    Unsupported(PathBuf),
}

/// Failure to hand a pixel buffer to the graphics device.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("pixel buffer is empty")]
    EmptyBuffer,

    #[error("texture {width}x{height} exceeds device limit {limit}")]
    TooLarge { width: u32, height: u32, limit: u32 },

    #[error("graphics device unavailable: {0}")]
    Device(String),
}

/// Library error type for viewer operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}
