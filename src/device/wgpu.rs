//! GPU device through `wgpu`.
//!
//! Dense textures become 2D or 3D textures. Sparse voxel data and grid index tables
//! become storage buffers, addressed by the shader through the index.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Device, DeviceHandle, DeviceInfo, GridLayout, MemoryDesc, MemoryKind};
use crate::errors::{CacheError, Result};
use crate::slot::ImageDataType;
use crate::sparse::SparseLayout;

enum Resource {
    Texture(wgpu::Texture),
    Buffer(wgpu::Buffer),
}

/// [`Device`] allocating `wgpu` textures and buffers.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: DeviceInfo,
    resources: Mutex<FxHashMap<u64, Resource>>,
    next_id: Mutex<u64>,
}

impl WgpuDevice {
    /// Opens the default adapter without a surface.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| CacheError::DeviceError(e.to_string()))?;

        let required_features =
            adapter.features() & wgpu::Features::TEXTURE_FORMAT_16BIT_NORM;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("texcache"),
            required_features,
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            ..Default::default()
        }))
        .map_err(|e| CacheError::DeviceError(e.to_string()))?;

        let info = DeviceInfo {
            name: adapter.get_info().name,
            supports_half_precision: true,
            supports_16bit_norm: required_features
                .contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM),
            host_pixels: false,
            sparse_layout: SparseLayout::Linear,
        };
        Ok(Self::from_device(device, queue, info))
    }

    /// Wraps an existing device, e.g. the renderer's own.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, info: DeviceInfo) -> Self {
        Self {
            device,
            queue,
            info,
            resources: Mutex::new(FxHashMap::default()),
            next_id: Mutex::new(0),
        }
    }

    /// The texture behind `handle`, if it names a dense texture.
    pub fn texture(&self, handle: DeviceHandle) -> Option<wgpu::Texture> {
        match self.resources.lock().get(&handle.0) {
            Some(Resource::Texture(texture)) => Some(texture.clone()),
            _ => None,
        }
    }

    /// The buffer behind `handle`, if it names sparse data or an index table.
    pub fn buffer(&self, handle: DeviceHandle) -> Option<wgpu::Buffer> {
        match self.resources.lock().get(&handle.0) {
            Some(Resource::Buffer(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }

    fn texture_format(data_type: ImageDataType) -> wgpu::TextureFormat {
        match data_type {
            ImageDataType::Float4 => wgpu::TextureFormat::Rgba32Float,
            ImageDataType::Byte4 => wgpu::TextureFormat::Rgba8Unorm,
            ImageDataType::Half4 => wgpu::TextureFormat::Rgba16Float,
            ImageDataType::Float => wgpu::TextureFormat::R32Float,
            ImageDataType::Byte => wgpu::TextureFormat::R8Unorm,
            ImageDataType::Half => wgpu::TextureFormat::R16Float,
            ImageDataType::Ushort4 => wgpu::TextureFormat::Rgba16Unorm,
            ImageDataType::Ushort => wgpu::TextureFormat::R16Unorm,
        }
    }

    fn create_texture(&self, desc: &MemoryDesc, data_type: ImageDataType) -> Option<Resource> {
        let format = Self::texture_format(data_type);
        if !self.device.features().contains(format.required_features()) {
            log::warn!("Texture format {format:?} not supported by '{}'", self.info.name);
            return None;
        }

        let limits = self.device.limits();
        let (dimension, max_dim) = if desc.dims.z <= 1 {
            (wgpu::TextureDimension::D2, limits.max_texture_dimension_2d)
        } else {
            (wgpu::TextureDimension::D3, limits.max_texture_dimension_3d)
        };
        if desc.dims.max_element() > max_dim || desc.dims.min_element() == 0 {
            return None;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.name),
            size: wgpu::Extent3d {
                width: desc.dims.x,
                height: desc.dims.y,
                depth_or_array_layers: desc.dims.z.max(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Some(Resource::Texture(texture))
    }

    fn create_buffer(&self, desc: &MemoryDesc) -> Option<Resource> {
        let size = aligned_size(desc.byte_size());
        if size > self.device.limits().max_buffer_size {
            return None;
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.name),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Some(Resource::Buffer(buffer))
    }
}

fn aligned_size(bytes: usize) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (bytes as u64).div_ceil(align).max(1) * align
}

impl Device for WgpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn alloc(&self, desc: &MemoryDesc) -> Option<DeviceHandle> {
        let resource = match desc.kind {
            MemoryKind::Texture {
                data_type,
                layout: GridLayout::Dense,
            } => self.create_texture(desc, data_type)?,
            MemoryKind::Texture { .. } | MemoryKind::GridIndex => self.create_buffer(desc)?,
        };

        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        self.resources.lock().insert(id, resource);
        Some(DeviceHandle(id))
    }

    fn upload(&self, handle: DeviceHandle, desc: &MemoryDesc, data: &[u8]) {
        let resources = self.resources.lock();
        match resources.get(&handle.0) {
            Some(Resource::Texture(texture)) => {
                let bytes_per_row = desc.dims.x * desc.element_size() as u32;
                self.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    data,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(bytes_per_row),
                        rows_per_image: Some(desc.dims.y),
                    },
                    texture.size(),
                );
            }
            Some(Resource::Buffer(buffer)) => {
                if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
                    self.queue.write_buffer(buffer, 0, data);
                } else {
                    let mut padded = data.to_vec();
                    padded.resize(aligned_size(data.len()) as usize, 0);
                    self.queue.write_buffer(buffer, 0, &padded);
                }
            }
            None => log::error!("Upload into freed allocation {handle} ('{}')", desc.name),
        }
    }

    fn free(&self, handle: DeviceHandle) {
        match self.resources.lock().remove(&handle.0) {
            Some(Resource::Texture(texture)) => texture.destroy(),
            Some(Resource::Buffer(buffer)) => buffer.destroy(),
            None => log::error!("Double free of device allocation {handle}"),
        }
    }
}
