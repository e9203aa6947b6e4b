use std::fmt;
use std::num::NonZeroU32;
use std::path::Path;

use glam::Vec2;

use crate::colour::{ColorEncoding, ColorPrimaries};
use crate::error::Error;
use crate::gpu::TextureUploader;
use crate::texture::{TextureHandle, TextureId};

/// Stable identity of an image within a session, kept across undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(NonZeroU32);

impl ImageId {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out image ids in sequence. Owned by whoever owns the image list.
#[derive(Debug, Default)]
pub struct ImageIdAllocator {
    issued: u32,
}

impl ImageIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ImageId {
        let id = ImageId(NonZeroU32::MIN.saturating_add(self.issued));
        self.issued = self.issued.saturating_add(1);
        id
    }
}

/// A texture plus the colour metadata it should be displayed with.
#[derive(Debug)]
pub struct Image {
    texture: TextureHandle,
    id: ImageId,
    primaries: ColorPrimaries,
    encoding: ColorEncoding,
}

impl Image {
    pub fn new(texture: TextureHandle, id: ImageId) -> Self {
        Self {
            texture,
            id,
            primaries: ColorPrimaries::default(),
            encoding: ColorEncoding::default(),
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn texture(&self) -> &TextureHandle {
        &self.texture
    }

    pub fn file_name(&self) -> &str {
        self.texture.file_name()
    }

    pub fn path(&self) -> &Path {
        self.texture.path()
    }

    pub fn gpu_id(&self) -> Option<TextureId> {
        self.texture.gpu_id()
    }

    /// Pixel size, or 1x1 while the texture has not been decoded.
    pub fn size(&self) -> Vec2 {
        let (width, height) = self.texture.dimensions();
        Vec2::new(width as f32, height as f32).max(Vec2::ONE)
    }

    pub fn primaries(&self) -> ColorPrimaries {
        self.primaries
    }

    pub fn encoding(&self) -> ColorEncoding {
        self.encoding
    }

    pub fn set_primaries(&mut self, value: ColorPrimaries) {
        self.primaries = value;
    }

    pub fn set_encoding(&mut self, value: ColorEncoding) {
        self.encoding = value;
    }

    pub fn reload(&self, uploader: &mut dyn TextureUploader) -> Result<TextureId, Error> {
        self.texture.reload(uploader)
    }
}
