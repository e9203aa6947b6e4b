//! Decoded image files and their GPU-resident counterparts.
//!
//! Decoding and uploading are separate steps: `Texture::decode` produces an
//! owned [`PixelBuffer`] on any thread, and `Texture::upload` consumes that
//! buffer on the thread that owns the graphics device.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use half::f16;
use image::{DynamicImage, ImageFormat, ImageReader};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{DecodeError, Error, UploadError};
use crate::gpu::TextureUploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Bmp,
    Gif,
    Hdr,
    Tga,
    OpenExr,
    WebP,
}

impl ImageKind {
    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Hdr => Some(Self::Hdr),
            ImageFormat::Tga => Some(Self::Tga),
            ImageFormat::OpenExr => Some(Self::OpenExr),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    /// Sniffs the file header. Headerless formats such as TGA fall back to
    /// the file extension.
    pub fn detect(path: &Path) -> Option<Self> {
        let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
        reader.format().and_then(Self::from_format)
    }

    /// Radiance HDR and OpenEXR carry scene-referred floating point data.
    pub fn is_high_dynamic_range(self) -> bool {
        matches!(self, Self::Hdr | Self::OpenExr)
    }
}

pub fn is_supported(path: &Path) -> bool {
    ImageKind::detect(path).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Four 8-bit unsigned normalized channels.
    #[default]
    Rgba8Unorm,
    /// Four 16-bit half float channels.
    Rgba16Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8Unorm => 4,
            Self::Rgba16Float => 8,
        }
    }
}

/// CPU-side pixels of one decoded file, always expanded to four channels.
///
/// The buffer is move-only: a worker hands it to the upload queue by value
/// and it is dropped as soon as the GPU copy exists.
#[derive(Debug)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Channel count of the source file before RGBA expansion.
    pub channels: u8,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn bytes_per_row(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }
}

/// Decodes `path` into RGBA8, or RGBA half floats for HDR/EXR input.
pub fn decode_file(path: &Path) -> Result<PixelBuffer, DecodeError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let kind = reader
        .format()
        .and_then(ImageKind::from_format)
        .ok_or_else(|| DecodeError::Unsupported(path.to_path_buf()))?;
    let img = reader.decode()?;

    let channels = img.color().channel_count();
    let (width, height) = (img.width(), img.height());
    let (format, data) = if kind.is_high_dynamic_range() {
        (PixelFormat::Rgba16Float, into_rgba16f(img))
    } else {
        (PixelFormat::Rgba8Unorm, img.into_rgba8().into_raw())
    };

    Ok(PixelBuffer {
        width,
        height,
        channels,
        format,
        data,
    })
}

fn into_rgba16f(img: DynamicImage) -> Vec<u8> {
    let halves: Vec<f16> = img
        .into_rgba32f()
        .into_raw()
        .into_iter()
        .map(f16::from_f32)
        .collect();
    bytemuck::cast_slice(&halves).to_vec()
}

/// Opaque GPU texture name. There is no zero id; an absent id means the
/// texture is not renderable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(NonZeroU32);

impl TextureId {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureStatus {
    /// Waiting for a worker to decode it.
    #[default]
    Queued,
    /// Pixels decoded, waiting for the render thread.
    Decoded,
    /// Resident on the GPU.
    Ready,
    /// Decode or upload failed, or the request was dropped at shutdown.
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
struct TextureState {
    status: TextureStatus,
    width: u32,
    height: u32,
    channels: u8,
    format: PixelFormat,
    gpu_id: Option<TextureId>,
}

/// One image file: its decoded metadata and GPU id.
///
/// Identity is the file path. Instances are shared through
/// [`TextureHandle`]s, which keep an explicit owner count.
#[derive(Debug)]
pub struct Texture {
    path: PathBuf,
    name: String,
    owners: AtomicUsize,
    state: RwLock<TextureState>,
}

impl Texture {
    pub(crate) fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        Self {
            path,
            name,
            owners: AtomicUsize::new(0),
            state: RwLock::new(TextureState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TextureStatus {
        self.state.read().status
    }

    /// Width and height in pixels; 0x0 until decoded.
    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.state.read();
        (state.width, state.height)
    }

    pub fn channels(&self) -> u8 {
        self.state.read().channels
    }

    pub fn format(&self) -> PixelFormat {
        self.state.read().format
    }

    pub fn gpu_id(&self) -> Option<TextureId> {
        self.state.read().gpu_id
    }

    /// Raw GPU name with zero standing for "not uploaded".
    pub fn raw_id(&self) -> u32 {
        self.gpu_id().map_or(0, TextureId::get)
    }

    pub fn is_ready(&self) -> bool {
        self.status() == TextureStatus::Ready
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        matches!(
            self.status(),
            TextureStatus::Queued | TextureStatus::Decoded
        )
    }

    /// Number of live [`TextureHandle`]s.
    pub fn owner_count(&self) -> usize {
        self.owners.load(Ordering::Acquire)
    }

    pub fn is_referenced(&self) -> bool {
        self.owner_count() > 0
    }

    /// Decodes the file. Safe to call off the render thread; only metadata
    /// is written back to the shared texture.
    pub fn decode(&self) -> Result<PixelBuffer, DecodeError> {
        let pixels = decode_file(&self.path)?;
        let mut state = self.state.write();
        state.width = pixels.width;
        state.height = pixels.height;
        state.channels = pixels.channels;
        state.format = pixels.format;
        if state.status != TextureStatus::Ready {
            state.status = TextureStatus::Decoded;
        }
        Ok(pixels)
    }

    /// Copies `pixels` to the GPU and frees them. Must run on the thread
    /// that owns the graphics device.
    pub fn upload(
        &self,
        pixels: PixelBuffer,
        uploader: &mut dyn TextureUploader,
    ) -> Result<TextureId, UploadError> {
        let existing = self.gpu_id();
        let id = uploader.upload(existing, &pixels)?;
        if let Some(old) = existing.filter(|old| *old != id) {
            uploader.release(old);
        }

        let mut state = self.state.write();
        state.status = TextureStatus::Ready;
        state.width = pixels.width;
        state.height = pixels.height;
        state.channels = pixels.channels;
        state.format = pixels.format;
        state.gpu_id = Some(id);
        Ok(id)
    }

    /// Re-reads the file from disk and replaces the GPU copy.
    pub fn reload(&self, uploader: &mut dyn TextureUploader) -> Result<TextureId, Error> {
        let pixels = self.decode()?;
        let id = self.upload(pixels, uploader)?;
        debug!(path = %self.path.display(), id = %id, "texture reloaded");
        Ok(id)
    }

    /// Frees the GPU copy, if any.
    pub fn release(&self, uploader: &mut dyn TextureUploader) {
        if let Some(id) = self.state.write().gpu_id.take() {
            uploader.release(id);
        }
    }

    pub(crate) fn mark_queued(&self) {
        self.state.write().status = TextureStatus::Queued;
    }

    pub(crate) fn mark_failed(&self) {
        let mut state = self.state.write();
        if state.status != TextureStatus::Ready {
            state.status = TextureStatus::Failed;
        }
    }
}

/// Counted shared ownership of a [`Texture`].
///
/// The pool registry holds textures without a handle, so a texture whose
/// owner count is zero is referenced by nothing but the registry.
pub struct TextureHandle(Arc<Texture>);

impl TextureHandle {
    pub(crate) fn new(texture: Arc<Texture>) -> Self {
        texture.owners.fetch_add(1, Ordering::AcqRel);
        Self(texture)
    }

    /// Whether both handles point at the same texture instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Clone for TextureHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.0))
    }
}

impl Drop for TextureHandle {
    fn drop(&mut self) {
        self.0.owners.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Deref for TextureHandle {
    type Target = Texture;

    fn deref(&self) -> &Texture {
        &self.0
    }
}

impl fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextureHandle").field(&self.0.path).finish()
    }
}
