pub mod colour;
pub mod config;
pub mod error;
pub mod gpu;
pub mod navigation;
pub mod picture;
pub mod session;
pub mod texture;
pub mod texture_pool;
pub mod view;

pub use error::{DecodeError, Error, UploadError};
