//! Seam between decoded pixel buffers and the graphics device.

mod wgpu_uploader;

use std::collections::HashMap;

pub use wgpu_uploader::WgpuUploader;

use crate::error::UploadError;
use crate::texture::{PixelBuffer, PixelFormat, TextureId};

/// Copies pixel buffers into GPU textures.
///
/// Implementations are driven only from the thread that owns the device.
pub trait TextureUploader {
    /// Uploads `pixels`, reusing `existing` when the implementation can.
    fn upload(
        &mut self,
        existing: Option<TextureId>,
        pixels: &PixelBuffer,
    ) -> Result<TextureId, UploadError>;

    fn release(&mut self, id: TextureId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadedTexture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub bytes: usize,
}

/// Device-free uploader that only records what it was given.
#[derive(Debug, Default)]
pub struct HeadlessUploader {
    issued: u32,
    uploads: usize,
    textures: HashMap<TextureId, UploadedTexture>,
}

impl HeadlessUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TextureId) -> Option<&UploadedTexture> {
        self.textures.get(&id)
    }

    /// Live textures.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Total `upload` calls that succeeded, including re-uploads.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }
}

impl TextureUploader for HeadlessUploader {
    fn upload(
        &mut self,
        existing: Option<TextureId>,
        pixels: &PixelBuffer,
    ) -> Result<TextureId, UploadError> {
        if pixels.data.is_empty() {
            return Err(UploadError::EmptyBuffer);
        }
        let id = match existing.filter(|id| self.textures.contains_key(id)) {
            Some(id) => id,
            None => {
                self.issued += 1;
                TextureId::new(self.issued)
                    .ok_or_else(|| UploadError::Device("texture ids exhausted".into()))?
            }
        };
        self.textures.insert(
            id,
            UploadedTexture {
                width: pixels.width,
                height: pixels.height,
                format: pixels.format,
                bytes: pixels.data.len(),
            },
        );
        self.uploads += 1;
        Ok(id)
    }

    fn release(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }
}
