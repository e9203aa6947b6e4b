use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::TextureUploader;
use crate::error::UploadError;
use crate::texture::{PixelBuffer, PixelFormat, TextureId};

/// Uploads pixel buffers into sampled `wgpu` textures.
pub struct WgpuUploader {
    device: wgpu::Device,
    queue: wgpu::Queue,
    textures: HashMap<TextureId, wgpu::Texture>,
    issued: u32,
}

impl WgpuUploader {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            textures: HashMap::new(),
            issued: 0,
        }
    }

    /// Opens a device without a presentation surface.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texture-upload-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to acquire GPU device")?;

        info!(adapter = %adapter.get_info().name, "headless GPU device ready");
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&id)
    }

    fn allocate_id(&mut self) -> Result<TextureId, UploadError> {
        self.issued += 1;
        TextureId::new(self.issued).ok_or_else(|| UploadError::Device("texture ids exhausted".into()))
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        // Color decoding is left to the present shader, so no sRGB view.
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

impl TextureUploader for WgpuUploader {
    fn upload(
        &mut self,
        existing: Option<TextureId>,
        pixels: &PixelBuffer,
    ) -> Result<TextureId, UploadError> {
        if pixels.data.is_empty() {
            return Err(UploadError::EmptyBuffer);
        }
        let limit = self.device.limits().max_texture_dimension_2d;
        if pixels.width > limit || pixels.height > limit {
            return Err(UploadError::TooLarge {
                width: pixels.width,
                height: pixels.height,
                limit,
            });
        }

        let size = wgpu::Extent3d {
            width: pixels.width,
            height: pixels.height,
            depth_or_array_layers: 1,
        };
        let format = texture_format(pixels.format);

        let reusable = existing.filter(|id| {
            self.textures
                .get(id)
                .is_some_and(|tex| tex.size() == size && tex.format() == format)
        });
        let id = match reusable {
            Some(id) => id,
            None => {
                let tex = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("image"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                let id = match existing {
                    Some(id) => id,
                    None => self.allocate_id()?,
                };
                if let Some(old) = self.textures.insert(id, tex) {
                    old.destroy();
                }
                id
            }
        };

        let tex = self
            .textures
            .get(&id)
            .ok_or_else(|| UploadError::Device(format!("texture {id} vanished")))?;
        self.queue.write_texture(
            tex.as_image_copy(),
            &pixels.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pixels.bytes_per_row()),
                rows_per_image: Some(pixels.height),
            },
            size,
        );
        debug!(id = %id, width = pixels.width, height = pixels.height, ?format, "texture uploaded");
        Ok(id)
    }

    fn release(&mut self, id: TextureId) {
        if let Some(tex) = self.textures.remove(&id) {
            tex.destroy();
        }
    }
}
